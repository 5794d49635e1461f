//! Attribute maps: YAML / JSON attribute data converted to JSON values with
//! string keys.
//!
//! `null` values are kept; when layered onto a template instance they remove
//! the attribute instead of setting it.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::AttributeError;

/// Attribute name → value.
pub type AttributeMap = Map<String, Value>;

/// Template name (or `"*"`) → attribute map.
pub type AttributesByTemplate = BTreeMap<String, AttributeMap>;

/// Name of the map applied to every template of a group.
pub const ALL_TEMPLATES: &str = "*";

/// Build a unit's attribute map from its structured and JSON forms.
///
/// JSON entries are applied over YAML entries with the same name.
pub fn parse_attributes(
    yaml: Option<&serde_yaml::Value>,
    json: Option<&str>,
    field: &str,
) -> Result<AttributeMap, AttributeError> {
    let mut map = match yaml {
        Some(value) => object_from_yaml(value, field)?,
        None => AttributeMap::new(),
    };
    if let Some(text) = json {
        for (k, v) in object_from_json(text, field)? {
            map.insert(k, v);
        }
    }
    Ok(map)
}

/// Build a group's per-template attribute maps from structured and JSON forms.
///
/// Each entry must be a map (or null, meaning "no attributes"). JSON maps
/// are merged over YAML maps of the same template name.
pub fn parse_attributes_by_template(
    yaml: Option<&serde_yaml::Value>,
    json: Option<&str>,
    field: &str,
) -> Result<AttributesByTemplate, AttributeError> {
    let mut out = AttributesByTemplate::new();
    let mut layers = Vec::new();
    if let Some(value) = yaml {
        layers.push(object_from_yaml(value, field)?);
    }
    if let Some(text) = json {
        layers.push(object_from_json(text, field)?);
    }
    for layer in layers {
        for (name, entry) in layer {
            let entry = match entry {
                Value::Object(m) => m,
                Value::Null => AttributeMap::new(),
                _ => {
                    return Err(AttributeError::NotAMap {
                        field: field.to_string(),
                        key: name,
                    })
                }
            };
            out.entry(name).or_default().extend(entry);
        }
    }
    Ok(out)
}

fn object_from_json(text: &str, field: &str) -> Result<AttributeMap, AttributeError> {
    let value: Value = serde_json::from_str(text).map_err(|source| AttributeError::Json {
        field: field.to_string(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(AttributeError::NotAnObject {
            field: field.to_string(),
        }),
    }
}

fn object_from_yaml(value: &serde_yaml::Value, field: &str) -> Result<AttributeMap, AttributeError> {
    match yaml_to_json(value, field)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(AttributeMap::new()),
        _ => Err(AttributeError::NotAnObject {
            field: field.to_string(),
        }),
    }
}

/// Convert a YAML value, rejecting non-string mapping keys at any depth.
pub fn yaml_to_json(value: &serde_yaml::Value, field: &str) -> Result<Value, AttributeError> {
    use serde_yaml::Value as Y;

    Ok(match value {
        Y::Null => Value::Null,
        Y::Bool(b) => Value::Bool(*b),
        Y::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| AttributeError::NonFiniteNumber {
                        field: field.to_string(),
                        value: n.to_string(),
                    })?
            }
        }
        Y::String(s) => Value::String(s.clone()),
        Y::Sequence(seq) => Value::Array(
            seq.iter()
                .map(|v| yaml_to_json(v, field))
                .collect::<Result<_, _>>()?,
        ),
        Y::Mapping(mapping) => {
            let mut map = AttributeMap::new();
            for (k, v) in mapping {
                let Y::String(key) = k else {
                    return Err(AttributeError::NonStringKey {
                        field: field.to_string(),
                        key: describe_key(k),
                    });
                };
                map.insert(key.clone(), yaml_to_json(v, field)?);
            }
            Value::Object(map)
        }
        Y::Tagged(tagged) => yaml_to_json(&tagged.value, field)?,
    })
}

fn describe_key(key: &serde_yaml::Value) -> String {
    match serde_yaml::to_string(key) {
        Ok(s) => s.trim_end().to_string(),
        Err(_) => format!("{key:?}"),
    }
}
