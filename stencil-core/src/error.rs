//! Error types for stencil-core.

use std::path::PathBuf;

use thiserror::Error;

/// Bad or missing configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure while reading the configuration.
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load; includes file path and line context from serde_yaml.
    #[error("failed to parse configuration at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The configuration file did not exist at the expected path.
    #[error("configuration not found at {path}")]
    NotFound { path: PathBuf },

    /// A required field was absent or blank.
    #[error("{entity} is missing required field `{field}`")]
    MissingField { entity: String, field: &'static str },

    /// The named character encoding is not supported.
    #[error("unsupported character encoding \"{0}\"")]
    UnknownEncoding(String),

    /// A byte-order mark was requested for an encoding that has none.
    #[error("no byte-order mark is defined for encoding {0}")]
    NoByteOrderMark(String),

    /// Any other invalid value.
    #[error("{0}")]
    Invalid(String),
}

/// Malformed attribute data.
#[derive(Debug, Error)]
pub enum AttributeError {
    /// The JSON text could not be parsed.
    #[error("invalid JSON in {field}: {source}")]
    Json {
        field: String,
        #[source]
        source: serde_json::Error,
    },

    /// The document is valid but not a JSON object / YAML mapping.
    #[error("{field} must be a map of attribute names to values")]
    NotAnObject { field: String },

    /// A nested entry that must be a map is something else.
    #[error("entry \"{key}\" in {field} must be a map of attribute names to values")]
    NotAMap { field: String, key: String },

    /// A key that is not a string.
    #[error("non-string key {key} in {field}")]
    NonStringKey { field: String, key: String },

    /// `.nan` or `.inf`, which have no JSON form.
    #[error("non-finite number {value} in {field}")]
    NonFiniteNumber { field: String, value: String },
}
