//! Error types for stencil-scheduler.

use std::path::PathBuf;

use thiserror::Error;

use stencil_core::{AttributeError, ConfigError, GroupId};
use stencil_renderer::RenderError;

/// All errors that can arise while initializing or running a render plan.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Bad configuration value.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed attribute data.
    #[error("attribute error: {0}")]
    Attribute(#[from] AttributeError),

    /// A referenced group or template does not exist.
    #[error("{what} \"{name}\" not found")]
    NotFound { what: &'static str, name: String },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An error returned by the template engine.
    #[error("template engine error: {0}")]
    Engine(#[from] RenderError),

    /// Rendering completed but the engine reported errors, or a bound unit failed.
    #[error("{entity} failed: {message}")]
    Render { entity: String, message: String },

    /// A task did not complete within its timeout.
    #[error("{entity} timed out after {timeout}")]
    Timeout { entity: String, timeout: String },

    /// A task was cancelled before it completed.
    #[error("{entity} was cancelled")]
    Cancelled { entity: String },

    /// A task panicked.
    #[error("{entity} panicked: {message}")]
    Panicked { entity: String, message: String },

    /// One or more entities failed to initialize; each was already logged.
    #[error("initialization failed ({} error(s)): {}", .failures.len(), .failures.join("; "))]
    Initialization { failures: Vec<String> },

    /// One or more groups failed; each failure was already logged.
    #[error("render failed for group(s): {}", join_ids(.failed_groups))]
    RunFailed { failed_groups: Vec<GroupId> },
}

fn join_ids(ids: &[GroupId]) -> String {
    ids.iter().map(|id| id.0.as_str()).collect::<Vec<_>>().join(", ")
}

/// Convenience constructor for [`SchedulerError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SchedulerError {
    SchedulerError::Io {
        path: path.into(),
        source,
    }
}
