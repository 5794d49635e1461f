//! Template engine boundary.
//!
//! The scheduler only talks to these traits. [`crate::TeraEngine`] is the
//! concrete implementation; tests substitute their own.
//!
//! A loaded [`TemplateHandle`] is not safe for concurrent use: callers must
//! serialise `set_listener` + `instantiate` themselves. Instances are private
//! to the caller and may be rendered without any lock.

use std::io::Write;
use std::sync::Arc;

use serde_json::Value;
use stencil_core::{AttributeMap, Encoding};

use crate::diagnostic::DiagnosticSink;
use crate::error::RenderError;
use crate::formatters::FormatterKind;
use crate::source::TemplateSource;

/// Loads template sources into handles.
pub trait TemplateEngine: Send + Sync {
    /// Load `source`, decoding files in `encoding`.
    ///
    /// Problems with individual definitions are reported to `sink` and do not
    /// make the call return `Err`.
    fn load(
        &self,
        source: &TemplateSource,
        encoding: Encoding,
        sink: &dyn DiagnosticSink,
    ) -> Result<Box<dyn TemplateHandle>, RenderError>;
}

/// A loaded group of named templates.
pub trait TemplateHandle: Send {
    /// Route diagnostics raised by subsequent calls to `sink`.
    fn set_listener(&mut self, sink: Arc<dyn DiagnosticSink>);

    /// A fresh instance of `name` with no attributes, or `None` (reported to
    /// the current listener) if no such template exists.
    fn instantiate(&self, name: &str) -> Option<Box<dyn TemplateInstance>>;

    /// Make `kind` available to this handle's templates as `name`.
    fn register_formatter(&mut self, name: &str, kind: FormatterKind) -> Result<(), RenderError>;

    /// Names of every template in the handle, sorted.
    fn template_names(&self) -> Vec<String>;

    /// Human-readable origin, for logs.
    fn describe(&self) -> String;
}

/// Output options for [`TemplateInstance::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// When false, leading indentation is stripped from every output line.
    pub auto_indent: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { auto_indent: true }
    }
}

/// One template bound to its own attribute values.
pub trait TemplateInstance: Send {
    fn name(&self) -> &str;

    /// Set attribute `name`, replacing any earlier value.
    fn add(&mut self, name: &str, value: Value);

    fn remove(&mut self, name: &str);

    fn attributes(&self) -> &AttributeMap;

    /// Render to `out`, reporting diagnostics to `sink`.
    fn write(
        &self,
        out: &mut dyn Write,
        sink: &dyn DiagnosticSink,
        options: &WriteOptions,
    ) -> Result<(), RenderError>;
}
