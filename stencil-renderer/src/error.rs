//! Error types for stencil-renderer.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from template loading and rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Tera template engine error.
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// Filesystem error while loading templates.
    #[error("template io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing rendered output failed (includes cancellation of the writer).
    #[error("failed to write rendered output: {0}")]
    Write(#[source] std::io::Error),

    /// Rendering stopped; the cause was reported as a diagnostic.
    #[error("rendering of template '{template}' failed")]
    Failed { template: String },

    /// A formatter cannot be registered under this name.
    #[error("invalid formatter name \"{0}\"")]
    InvalidFormatterName(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io {
        path: path.into(),
        source,
    }
}
