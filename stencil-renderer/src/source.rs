//! Template source classification.
//!
//! | Source string                     | Variant                       |
//! |-----------------------------------|-------------------------------|
//! | contains `::=`                    | [`TemplateSource::Inline`]    |
//! | path ending in `.tgroup`          | [`TemplateSource::File`]      |
//! | any other path                    | [`TemplateSource::Directory`] |
//!
//! Relative paths resolve against the template source directory.

use std::fmt;
use std::path::{Path, PathBuf};

use stencil_core::{paths, ConfigError};

/// Marker that identifies inline group text.
pub const DEFINITION_MARKER: &str = "::=";

/// Extension of a single-file template group.
pub const GROUP_FILE_EXTENSION: &str = "tgroup";

/// Extension of one-template-per-file sources inside a directory.
pub const TEMPLATE_FILE_EXTENSION: &str = "tera";

/// A resolved, concrete template source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// Group text holding one or more `name ::= ...` definitions.
    Inline(String),
    /// A `.tgroup` file in the inline format.
    File(PathBuf),
    /// A directory of `.tera` and `.tgroup` files.
    Directory(PathBuf),
}

impl TemplateSource {
    /// Classify `source` and resolve any path against `src_dir`.
    ///
    /// File and directory sources must exist with the right file type.
    pub fn classify(source: &str, src_dir: &Path) -> Result<Self, ConfigError> {
        if source.trim().is_empty() {
            return Err(ConfigError::Invalid("source is blank".to_string()));
        }
        if source.contains(DEFINITION_MARKER) {
            return Ok(TemplateSource::Inline(source.to_string()));
        }

        let raw = Path::new(source.trim());
        let path = paths::normalize(&if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            src_dir.join(raw)
        });

        let is_group_file = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(GROUP_FILE_EXTENSION));
        let meta = std::fs::metadata(&path).map_err(|e| {
            ConfigError::Invalid(format!("invalid source \"{source}\" ({}: {e})", path.display()))
        })?;

        if is_group_file {
            if !meta.is_file() {
                return Err(ConfigError::Invalid(format!(
                    "invalid source \"{source}\" ({} is not a file)",
                    path.display()
                )));
            }
            Ok(TemplateSource::File(path))
        } else {
            if !meta.is_dir() {
                return Err(ConfigError::Invalid(format!(
                    "invalid source \"{source}\" ({} is not a directory)",
                    path.display()
                )));
            }
            Ok(TemplateSource::Directory(path))
        }
    }

    /// Short variant name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            TemplateSource::Inline(_) => "inline group",
            TemplateSource::File(_) => "group file",
            TemplateSource::Directory(_) => "group directory",
        }
    }
}

impl fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateSource::Inline(text) => {
                write!(f, "inline group ({} bytes)", text.len())
            }
            TemplateSource::File(path) => write!(f, "group file {}", path.display()),
            TemplateSource::Directory(path) => write!(f, "group directory {}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn marker_means_inline() {
        let src = TemplateSource::classify("a ::= \"x\"", Path::new("/nowhere")).expect("inline");
        assert!(matches!(src, TemplateSource::Inline(_)));
    }

    #[test]
    fn tgroup_file_resolves_against_src_dir() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("models.tgroup"), "a ::= \"x\"").expect("write");
        let src = TemplateSource::classify("models.tgroup", dir.path()).expect("file");
        assert_eq!(src, TemplateSource::File(dir.path().join("models.tgroup")));
    }

    #[test]
    fn dot_is_the_src_dir_itself() {
        let dir = TempDir::new().expect("tempdir");
        let src = TemplateSource::classify(".", dir.path()).expect("dir");
        assert_eq!(src, TemplateSource::Directory(dir.path().to_path_buf()));
    }

    #[test]
    fn missing_path_is_invalid() {
        let dir = TempDir::new().expect("tempdir");
        let err = TemplateSource::classify("gone", dir.path()).unwrap_err();
        assert!(err.to_string().contains("invalid source \"gone\""));
    }

    #[test]
    fn directory_with_group_extension_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::create_dir(dir.path().join("odd.tgroup")).expect("mkdir");
        let err = TemplateSource::classify("odd.tgroup", dir.path()).unwrap_err();
        assert!(err.to_string().contains("is not a file"));
    }

    #[test]
    fn blank_source_is_invalid() {
        assert!(TemplateSource::classify("   ", Path::new("/")).is_err());
    }
}
