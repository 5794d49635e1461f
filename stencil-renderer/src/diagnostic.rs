//! Diagnostics reported by the template engine during load and render.

use std::fmt;
use std::path::PathBuf;

use parking_lot::Mutex;

/// Classification of an engine diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A template definition did not parse or compile.
    Compile,
    /// Rendering raised an error.
    Runtime,
    /// A template referenced an attribute that was not supplied.
    MissingAttribute,
    /// A template source file could not be read or decoded.
    Io,
    /// Anything else the engine reports.
    Internal,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::Compile => "compile error",
            DiagnosticKind::Runtime => "render error",
            DiagnosticKind::MissingAttribute => "missing attribute",
            DiagnosticKind::Io => "template io error",
            DiagnosticKind::Internal => "internal error",
        };
        f.write_str(s)
    }
}

/// Where a diagnostic's line references point.
///
/// `line_offset` is the number of lines in `path` that precede the template
/// body the engine's line numbers are relative to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub path: PathBuf,
    pub line_offset: usize,
}

/// A `(kind, message, cause)` record delivered through a [`DiagnosticSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub cause: Option<String>,
    pub location: Option<SourceLocation>,
    /// Extra context attached by enrichment (e.g. the offending source line).
    pub context: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
            location: None,
            context: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn at(mut self, path: impl Into<PathBuf>, line_offset: usize) -> Self {
        self.location = Some(SourceLocation {
            path: path.into(),
            line_offset,
        });
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " (in {})", location.path.display())?;
        }
        if let Some(context) = &self.context {
            write!(f, "\n    {context}")?;
        }
        if let Some(cause) = &self.cause {
            write!(f, "\n    caused by: {cause}")?;
        }
        Ok(())
    }
}

/// Receives diagnostics from the engine.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

impl<F> DiagnosticSink for F
where
    F: Fn(Diagnostic) + Send + Sync,
{
    fn report(&self, diagnostic: Diagnostic) {
        self(diagnostic)
    }
}

/// Sink that keeps every diagnostic it receives.
#[derive(Debug, Default)]
pub struct CollectingSink {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything reported so far.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.lock().is_empty()
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.lock().push(diagnostic);
    }
}
