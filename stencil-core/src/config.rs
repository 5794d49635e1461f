//! Loading a [`RunConfig`] from a YAML document.
//!
//! Relative `base_dir` values resolve against the directory holding the
//! config file; an absent `base_dir` *is* that directory. After
//! [`load_at`] returns, `base_dir` is always `Some` and absolute.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::types::RunConfig;

/// File name looked up when no explicit config path is given.
pub const DEFAULT_CONFIG_FILE: &str = "stencil.yaml";

/// Default group source directory, relative to the base directory.
pub const DEFAULT_TEMPLATE_SRC_DIR: &str = "src/main/templates";

/// Default encoding when neither the run nor an entity names one.
pub const DEFAULT_ENCODING: &str = "UTF-8";

/// Load and parse the configuration at `path`.
///
/// Returns `ConfigError::NotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(path: &Path) -> Result<RunConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config_dir = absolute(path.parent().unwrap_or_else(|| Path::new(".")))?;
    parse_str(&contents, path, &config_dir)
}

/// Parse `contents` as a run configuration whose relative paths resolve
/// against `config_dir`. `path` is only used for error messages.
pub fn parse_str(contents: &str, path: &Path, config_dir: &Path) -> Result<RunConfig, ConfigError> {
    let mut config: RunConfig = serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.base_dir = Some(match config.base_dir.take() {
        Some(dir) if dir.is_absolute() => dir,
        Some(dir) => config_dir.join(dir),
        None => config_dir.to_path_buf(),
    });
    Ok(config)
}

fn absolute(path: &Path) -> Result<PathBuf, ConfigError> {
    let path = if path.as_os_str().is_empty() {
        Path::new(".")
    } else {
        path
    };
    std::path::absolute(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
