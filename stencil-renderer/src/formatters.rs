//! Value formatters a group can register on its template handle as filters.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use heck::{ToKebabCase, ToLowerCamelCase, ToPascalCase, ToSnakeCase};
use serde_json::Value;
use stencil_core::ConfigError;

/// A built-in formatting rule, selected by name in group configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatterKind {
    Upper,
    Lower,
    Capitalize,
    SnakeCase,
    CamelCase,
    PascalCase,
    KebabCase,
    XmlEscape,
    StringLiteral,
}

impl FormatterKind {
    pub fn all() -> &'static [FormatterKind] {
        &[
            FormatterKind::Upper,
            FormatterKind::Lower,
            FormatterKind::Capitalize,
            FormatterKind::SnakeCase,
            FormatterKind::CamelCase,
            FormatterKind::PascalCase,
            FormatterKind::KebabCase,
            FormatterKind::XmlEscape,
            FormatterKind::StringLiteral,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            FormatterKind::Upper => "upper",
            FormatterKind::Lower => "lower",
            FormatterKind::Capitalize => "capitalize",
            FormatterKind::SnakeCase => "snake_case",
            FormatterKind::CamelCase => "camel_case",
            FormatterKind::PascalCase => "pascal_case",
            FormatterKind::KebabCase => "kebab_case",
            FormatterKind::XmlEscape => "xml_escape",
            FormatterKind::StringLiteral => "string_literal",
        }
    }

    /// Format `input` according to this rule.
    pub fn apply(&self, input: &str) -> String {
        match self {
            FormatterKind::Upper => input.to_uppercase(),
            FormatterKind::Lower => input.to_lowercase(),
            FormatterKind::Capitalize => capitalize(input),
            FormatterKind::SnakeCase => input.to_snake_case(),
            FormatterKind::KebabCase => input.to_kebab_case(),
            FormatterKind::PascalCase => input.to_pascal_case(),
            FormatterKind::CamelCase => input.to_lower_camel_case(),
            FormatterKind::XmlEscape => {
                let mut out = String::with_capacity(input.len());
                for c in input.chars() {
                    match c {
                        '&' => out.push_str("&amp;"),
                        '<' => out.push_str("&lt;"),
                        '>' => out.push_str("&gt;"),
                        '"' => out.push_str("&quot;"),
                        '\'' => out.push_str("&apos;"),
                        other => out.push(other),
                    }
                }
                out
            }
            FormatterKind::StringLiteral => {
                let mut out = String::with_capacity(input.len() + 2);
                out.push('"');
                for c in input.chars() {
                    match c {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\t' => out.push_str("\\t"),
                        other => out.push(other),
                    }
                }
                out.push('"');
                out
            }
        }
    }

    /// A Tera filter applying this rule to the string form of a value.
    pub fn filter(
        self,
    ) -> impl Fn(&Value, &HashMap<String, Value>) -> tera::Result<Value> + Send + Sync {
        move |value: &Value, _args: &HashMap<String, Value>| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            Ok(Value::String(self.apply(&text)))
        }
    }
}

impl fmt::Display for FormatterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FormatterKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        FormatterKind::all()
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigError::Invalid(format!("unknown formatter kind \"{s}\"")))
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(FormatterKind::SnakeCase, "orderLine item", "order_line_item")]
    #[case(FormatterKind::KebabCase, "OrderLine", "order-line")]
    #[case(FormatterKind::PascalCase, "order_line", "OrderLine")]
    #[case(FormatterKind::CamelCase, "Order-Line", "orderLine")]
    #[case(FormatterKind::Capitalize, "élan", "Élan")]
    #[case(FormatterKind::Upper, "abc", "ABC")]
    #[case(FormatterKind::XmlEscape, "<a & 'b'>", "&lt;a &amp; &apos;b&apos;&gt;")]
    #[case(FormatterKind::StringLiteral, "say \"hi\"\n", "\"say \\\"hi\\\"\\n\"")]
    fn formats(#[case] kind: FormatterKind, #[case] input: &str, #[case] expected: &str) {
        assert_eq!(kind.apply(input), expected);
    }

    #[test]
    fn kinds_parse_by_name() {
        assert_eq!("snake_case".parse::<FormatterKind>().expect("known"), FormatterKind::SnakeCase);
        assert!("shout".parse::<FormatterKind>().is_err());
    }

    #[test]
    fn filter_formats_non_string_values() {
        let f = FormatterKind::StringLiteral.filter();
        let out = f(&Value::from(42), &HashMap::new()).expect("filter");
        assert_eq!(out, Value::String("\"42\"".to_string()));
    }
}
