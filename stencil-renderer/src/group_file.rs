//! Parser for group text: a sequence of named template definitions.
//!
//! ```text
//! // comments run to end of line
//! struct(name) ::= <<
//! pub struct {{ name }};
//! >>
//!
//! greeting ::= "Hello, {{ who }}!"
//! ```
//!
//! A `<<` body drops one newline directly after `<<` and one directly before
//! `>>`. A quoted body understands `\"`, `\\`, `\n` and `\t`. The optional
//! parenthesised list after the name is documentation only.

use std::fmt;

/// One parsed definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDef {
    pub name: String,
    pub body: String,
    /// Number of lines in the group text that precede the first body line.
    pub body_line_offset: usize,
}

/// A syntax error in group text, with a 1-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl fmt::Display for GroupSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "--> {}:{} {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for GroupSyntaxError {}

/// Parse every definition in `text`. Duplicate names are an error.
pub fn parse(text: &str) -> Result<Vec<TemplateDef>, GroupSyntaxError> {
    let mut parser = Parser { text, pos: 0 };
    let mut defs: Vec<TemplateDef> = Vec::new();
    loop {
        parser.skip_trivia();
        if parser.at_end() {
            return Ok(defs);
        }
        let name_at = parser.pos;
        let def = parser.definition()?;
        if defs.iter().any(|d| d.name == def.name) {
            return Err(parser.error_at(
                name_at,
                format!("template \"{}\" is defined more than once", def.name),
            ));
        }
        defs.push(def);
    }
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn skip_trivia(&mut self) {
        loop {
            let trimmed = self.rest().trim_start();
            self.pos = self.text.len() - trimmed.len();
            if trimmed.starts_with("//") {
                let eol = trimmed.find('\n').map(|i| i + 1).unwrap_or(trimmed.len());
                self.pos += eol;
            } else {
                return;
            }
        }
    }

    fn skip_inline_space(&mut self) {
        let trimmed = self.rest().trim_start_matches([' ', '\t']);
        self.pos = self.text.len() - trimmed.len();
    }

    fn definition(&mut self) -> Result<TemplateDef, GroupSyntaxError> {
        let name = self.identifier()?;
        self.skip_inline_space();
        if self.rest().starts_with('(') {
            match self.rest().find(')') {
                Some(close) => self.pos += close + 1,
                None => return Err(self.error_at(self.pos, "unclosed parameter list")),
            }
            self.skip_inline_space();
        }
        if !self.rest().starts_with(crate::source::DEFINITION_MARKER) {
            return Err(self.error_at(self.pos, format!("expected `::=` after \"{name}\"")));
        }
        self.pos += crate::source::DEFINITION_MARKER.len();
        self.skip_inline_space();

        if self.rest().starts_with("<<") {
            self.pos += 2;
            self.block_body(name)
        } else if self.rest().starts_with('"') {
            self.pos += 1;
            self.quoted_body(name)
        } else {
            Err(self.error_at(self.pos, "expected `<<` or `\"` to start the template body"))
        }
    }

    fn identifier(&mut self) -> Result<String, GroupSyntaxError> {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|&(i, c)| {
                !(c.is_ascii_alphanumeric()
                    || c == '_'
                    || (i > 0 && matches!(c, '.' | '/' | '-')))
            })
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        if len == 0 || rest.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(self.error_at(self.pos, "expected a template name"));
        }
        self.pos += len;
        Ok(rest[..len].to_string())
    }

    fn block_body(&mut self, name: String) -> Result<TemplateDef, GroupSyntaxError> {
        let open = self.pos;
        let Some(close) = self.rest().find(">>") else {
            return Err(self.error_at(open, format!("unterminated `<<` body of \"{name}\"")));
        };
        let mut body = &self.rest()[..close];
        let mut start = open;
        if let Some(stripped) = body.strip_prefix("\r\n").or_else(|| body.strip_prefix('\n')) {
            start += body.len() - stripped.len();
            body = stripped;
        }
        let body = body
            .strip_suffix("\r\n")
            .or_else(|| body.strip_suffix('\n'))
            .unwrap_or(body);
        self.pos = open + close + 2;
        Ok(TemplateDef {
            name,
            body: body.to_string(),
            body_line_offset: self.line_of(start) - 1,
        })
    }

    fn quoted_body(&mut self, name: String) -> Result<TemplateDef, GroupSyntaxError> {
        let open = self.pos;
        let mut body = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos = open + i + 1;
                    return Ok(TemplateDef {
                        name,
                        body,
                        body_line_offset: self.line_of(open) - 1,
                    });
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => body.push('\n'),
                    Some((_, 't')) => body.push('\t'),
                    Some((_, '"')) => body.push('"'),
                    Some((_, '\\')) => body.push('\\'),
                    Some((j, other)) => {
                        return Err(self.error_at(open + j, format!("unknown escape `\\{other}`")))
                    }
                    None => break,
                },
                '\n' => {
                    return Err(self.error_at(open + i, "newline in quoted template body; use `<<` instead"))
                }
                other => body.push(other),
            }
        }
        Err(self.error_at(open, format!("unterminated quoted body of \"{name}\"")))
    }

    fn line_of(&self, pos: usize) -> usize {
        self.text[..pos].matches('\n').count() + 1
    }

    fn error_at(&self, pos: usize, message: impl Into<String>) -> GroupSyntaxError {
        let before = &self.text[..pos];
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        GroupSyntaxError {
            line: self.line_of(pos),
            column: before[line_start..].chars().count() + 1,
            message: message.into(),
        }
    }
}
