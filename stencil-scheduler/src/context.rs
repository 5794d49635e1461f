//! Run-wide services shared by every group and unit.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use regex::Regex;

use stencil_core::config::{DEFAULT_ENCODING, DEFAULT_TEMPLATE_SRC_DIR};
use stencil_core::{paths, ConfigError, Encoding, RunConfig};
use stencil_renderer::{Diagnostic, TemplateSource};

/// Leading path segments that keep a generated-source target out of the
/// generated-output directory.
const ESCAPE_PREFIXES: &[&str] = &["src", "target"];

static LINE_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--> (\d+):(\d+)").expect("valid regex"));

/// Called when generated output first lands under the generated-output root.
pub trait SourceRootHook: Send + Sync {
    fn register_source_root(&self, dir: &Path);
}

impl<F> SourceRootHook for F
where
    F: Fn(&Path) + Send + Sync,
{
    fn register_source_root(&self, dir: &Path) {
        self(dir)
    }
}

/// Hook that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSourceRoot;

impl SourceRootHook for LogSourceRoot {
    fn register_source_root(&self, dir: &Path) {
        tracing::info!(dir = %dir.display(), "registered generated source root");
    }
}

pub struct RenderContext {
    base_dir: PathBuf,
    template_src_dir: PathBuf,
    default_encoding: Encoding,
    generated_rel: PathBuf,
    generated_dir: PathBuf,
    generated_extension: String,
    root_registered: AtomicBool,
    hook: Arc<dyn SourceRootHook>,
}

impl RenderContext {
    pub fn new(config: &RunConfig, hook: Arc<dyn SourceRootHook>) -> Result<Self, ConfigError> {
        let base_dir = config
            .base_dir
            .as_deref()
            .map(paths::normalize)
            .ok_or_else(|| ConfigError::MissingField {
                entity: "run configuration".to_string(),
                field: "base_dir",
            })?;
        let template_src_dir = paths::normalize(&base_dir.join(
            config
                .template_src_dir
                .as_deref()
                .unwrap_or(Path::new(DEFAULT_TEMPLATE_SRC_DIR)),
        ));
        let default_encoding =
            Encoding::for_name(config.source_encoding.as_deref().unwrap_or(DEFAULT_ENCODING))?;
        let generated_rel = config.generated_sources.dir.clone();
        let generated_dir = paths::normalize(&base_dir.join(&generated_rel));

        Ok(Self {
            base_dir,
            template_src_dir,
            default_encoding,
            generated_rel,
            generated_dir,
            generated_extension: config.generated_sources.extension.clone(),
            root_registered: AtomicBool::new(false),
            hook,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn template_src_dir(&self) -> &Path {
        &self.template_src_dir
    }

    pub fn default_encoding(&self) -> Encoding {
        self.default_encoding
    }

    pub fn generated_dir(&self) -> &Path {
        &self.generated_dir
    }

    /// The named encoding, or the run default when absent or blank.
    pub fn resolve_encoding(&self, explicit: Option<&str>) -> Result<Encoding, ConfigError> {
        match explicit.map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => Encoding::for_name(&name.to_ascii_uppercase()),
            None => Ok(self.default_encoding),
        }
    }

    /// Classify a group source relative to the template source directory.
    pub fn resolve_source(&self, source: &str) -> Result<TemplateSource, ConfigError> {
        TemplateSource::classify(source, &self.template_src_dir)
    }

    /// Absolute, normalised output path for `target`.
    ///
    /// Relative generated-source targets land under the generated-output
    /// directory unless they already start with it or with `.`, `src` or
    /// `target`. Every other relative target lands under the base directory.
    pub fn resolve_output_path(&self, target: &str) -> PathBuf {
        let path = Path::new(target);
        if path.is_absolute() {
            return paths::normalize(path);
        }
        let escaped = path.starts_with(&self.generated_rel)
            || match path.components().next() {
                Some(Component::CurDir) => true,
                Some(Component::Normal(first)) => {
                    first.to_str().is_some_and(|f| ESCAPE_PREFIXES.contains(&f))
                }
                _ => false,
            };
        if self.has_generated_extension(path) && !escaped {
            paths::normalize(&self.generated_dir.join(path))
        } else {
            paths::normalize(&self.base_dir.join(path))
        }
    }

    /// True for files under the generated-output root with the generated extension.
    pub fn is_generated_source(&self, path: &Path) -> bool {
        path.starts_with(&self.generated_dir) && self.has_generated_extension(path)
    }

    fn has_generated_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == self.generated_extension)
    }

    /// Invoke the source-root hook; only the first call in a run does so.
    ///
    /// Returns whether this call performed the registration.
    pub fn register_generated_output_root(&self) -> bool {
        if self
            .root_registered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.hook.register_source_root(&self.generated_dir);
        true
    }

    pub fn generated_output_root_registered(&self) -> bool {
        self.root_registered.load(Ordering::Acquire)
    }

    /// Attach the referenced source line to `diagnostic`, if it names one.
    ///
    /// Never fails: problems are logged and the diagnostic returned as is.
    pub fn enrich_diagnostic(&self, mut diagnostic: Diagnostic, encoding: Encoding) -> Diagnostic {
        let Some(location) = diagnostic.location.as_ref() else {
            return diagnostic;
        };
        let Some(reported) = LINE_REFERENCE
            .captures(&diagnostic.message)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok())
        else {
            return diagnostic;
        };

        let line = reported + location.line_offset;
        match read_line(&location.path, line, encoding) {
            Ok(Some(text)) => {
                diagnostic.context = Some(format!("line {line}: {}", text.trim_end()));
            }
            Ok(None) => {
                tracing::warn!(
                    path = %location.path.display(),
                    line,
                    "diagnostic refers past the end of its source"
                );
            }
            Err(e) => {
                tracing::warn!(
                    path = %location.path.display(),
                    error = %e,
                    "could not read source for diagnostic context"
                );
            }
        }
        diagnostic
    }
}

fn read_line(path: &Path, line: usize, encoding: Encoding) -> std::io::Result<Option<String>> {
    if line == 0 {
        return Ok(None);
    }
    let text = encoding.decode(&std::fs::read(path)?)?;
    Ok(text.lines().nth(line - 1).map(str::to_string))
}
