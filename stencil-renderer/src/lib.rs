//! # stencil-renderer
//!
//! Template engine boundary plus a Tera-backed implementation.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stencil_core::Encoding;
//! use stencil_renderer::{CollectingSink, TemplateEngine, TemplateSource, TeraEngine, WriteOptions};
//!
//! fn greet() -> Result<String, Box<dyn std::error::Error>> {
//!     let sink = CollectingSink::new();
//!     let source = TemplateSource::Inline("greet ::= \"Hello, {{ who }}!\"".into());
//!     let handle = TeraEngine::new().load(&source, Encoding::Utf8, &sink)?;
//!     let mut out = Vec::new();
//!     if let Some(mut instance) = handle.instantiate("greet") {
//!         instance.add("who", "world".into());
//!         instance.write(&mut out, &sink, &WriteOptions::default())?;
//!     }
//!     Ok(String::from_utf8(out)?)
//! }
//! ```

pub mod diagnostic;
pub mod engine;
pub mod error;
pub mod formatters;
pub mod group_file;
pub mod source;
pub mod tera_engine;

pub use diagnostic::{CollectingSink, Diagnostic, DiagnosticKind, DiagnosticSink, SourceLocation};
pub use engine::{TemplateEngine, TemplateHandle, TemplateInstance, WriteOptions};
pub use error::RenderError;
pub use formatters::FormatterKind;
pub use source::TemplateSource;
pub use tera_engine::TeraEngine;
