//! Configuration record types for a render run.
//!
//! Required fields are `Option` so a document with gaps still loads; the
//! scheduler's initialization phase reports every missing value instead of
//! stopping at the first serde error.
//! All types are serializable/deserializable via serde + serde_yaml.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed identifier for a template group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for GroupId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A strongly-typed identifier for a render unit (one output file).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub String);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for UnitId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UnitId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

/// Unit of a [`Timeout`] duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    #[default]
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeUnit::Nanoseconds => "nanoseconds",
            TimeUnit::Microseconds => "microseconds",
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        };
        f.write_str(s)
    }
}

/// A per-operation deadline, expressed as a count of [`TimeUnit`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeout {
    pub duration: u64,
    #[serde(default)]
    pub unit: TimeUnit,
}

impl Timeout {
    pub fn new(duration: u64, unit: TimeUnit) -> Self {
        Self { duration, unit }
    }

    /// Convert to a [`Duration`], saturating on overflow.
    pub fn as_duration(&self) -> Duration {
        let n = self.duration;
        match self.unit {
            TimeUnit::Nanoseconds => Duration::from_nanos(n),
            TimeUnit::Microseconds => Duration::from_micros(n),
            TimeUnit::Milliseconds => Duration::from_millis(n),
            TimeUnit::Seconds => Duration::from_secs(n),
            TimeUnit::Minutes => Duration::from_secs(n.saturating_mul(60)),
            TimeUnit::Hours => Duration::from_secs(n.saturating_mul(60 * 60)),
            TimeUnit::Days => Duration::from_secs(n.saturating_mul(24 * 60 * 60)),
        }
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.duration, self.unit)
    }
}

// ---------------------------------------------------------------------------
// Run configuration
// ---------------------------------------------------------------------------

/// Where generated compilable sources are routed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSources {
    /// Directory, relative to the base directory, that receives generated sources.
    #[serde(default = "GeneratedSources::default_dir")]
    pub dir: PathBuf,
    /// File extension (without the dot) marking a generated source file.
    #[serde(default = "GeneratedSources::default_extension")]
    pub extension: String,
}

impl GeneratedSources {
    fn default_dir() -> PathBuf {
        PathBuf::from("target").join("generated-sources").join("rust")
    }

    fn default_extension() -> String {
        "rs".to_string()
    }
}

impl Default for GeneratedSources {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
            extension: Self::default_extension(),
        }
    }
}

/// Root of a `stencil.yaml` document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// Base directory for relative targets; defaults to the config file's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
    /// Base directory for group sources; relative values are rooted at `base_dir`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_src_dir: Option<PathBuf>,
    /// Default encoding for template sources and rendered targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_encoding: Option<String>,
    /// Stop at the first failed group or unit.
    #[serde(default)]
    pub fail_fast: bool,
    /// Run groups on all available cores instead of one worker.
    #[serde(default)]
    pub render_groups_concurrently: bool,
    #[serde(default)]
    pub generated_sources: GeneratedSources,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub templates: Vec<UnitConfig>,
}

/// Configuration of one template group.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupConfig {
    pub id: Option<GroupId>,
    /// Inline group text (contains `::=`), a `.tgroup` file, or a directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default)]
    pub fail_fast: bool,
    /// Render this group's units on all available cores instead of one worker.
    #[serde(default)]
    pub render_concurrently: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Timeout>,
    /// Attribute maps keyed by template name, or `"*"` for every template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes_by_template: Option<serde_yaml::Value>,
    /// JSON-text form of `attributes_by_template`, applied over it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_attributes_by_template: Option<String>,
    /// Filter name → formatter kind, registered on this group's handle only.
    #[serde(default)]
    pub formatters: BTreeMap<String, String>,
}

/// Configuration of one render unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitConfig {
    pub id: Option<UnitId>,
    pub group_id: Option<GroupId>,
    /// Template name inside the group.
    pub name: Option<String>,
    /// Output path; relative paths are routed by the output path policy.
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<serde_yaml::Value>,
    /// JSON-text attributes, applied over `attributes`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_attributes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_encoding: Option<String>,
    /// Downgrade missing-attribute diagnostics to warnings.
    #[serde(default)]
    pub allow_missing_attributes: bool,
    /// Prefix the output with the encoding's byte-order mark.
    #[serde(default)]
    pub with_bom: bool,
    #[serde(default = "default_true")]
    pub auto_indent: bool,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Timeout>,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            id: None,
            group_id: None,
            name: None,
            target: None,
            attributes: None,
            json_attributes: None,
            target_encoding: None,
            allow_missing_attributes: false,
            with_bom: false,
            auto_indent: true,
            fail_fast: false,
            timeout: None,
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
