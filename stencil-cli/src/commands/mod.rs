pub mod check;
pub mod render;

use std::path::{Path, PathBuf};

use stencil_core::config::DEFAULT_CONFIG_FILE;

/// `--config`, or `stencil.yaml` in the current directory.
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Source-root hook for `render`.
pub fn announce_source_root(dir: &Path) {
    println!("+ source root: {}", dir.display());
}
