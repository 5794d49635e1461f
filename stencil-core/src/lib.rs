//! Stencil core library: configuration records, attribute maps, encodings, errors.
//!
//! Public API surface:
//! - [`types`]: newtypes and configuration records
//! - [`config`]: load a `stencil.yaml`
//! - [`attributes`]: attribute map parsing
//! - [`encoding`]: encodings and byte-order marks
//! - [`paths`]: lexical path normalisation
//! - [`error`]: [`ConfigError`], [`AttributeError`]

pub mod attributes;
pub mod config;
pub mod encoding;
pub mod error;
pub mod paths;
pub mod types;

pub use attributes::{AttributeMap, AttributesByTemplate, ALL_TEMPLATES};
pub use encoding::Encoding;
pub use error::{AttributeError, ConfigError};
pub use types::{
    GeneratedSources, GroupConfig, GroupId, RunConfig, TimeUnit, Timeout, UnitConfig, UnitId,
};
