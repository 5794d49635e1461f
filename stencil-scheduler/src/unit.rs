//! Render unit: one template of one group written to one output file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use stencil_core::attributes::parse_attributes;
use stencil_core::{AttributeMap, ConfigError, Encoding, GroupId, Timeout, UnitConfig, UnitId};
use stencil_renderer::{Diagnostic, DiagnosticKind, DiagnosticSink, WriteOptions};

use crate::context::RenderContext;
use crate::error::{io_err, SchedulerError};
use crate::flag::FailureFlag;
use crate::group::Group;
use crate::pool::CancelToken;
use crate::writer;

/// Where a unit is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Pending,
    Rendered,
    Failed,
}

pub struct RenderUnit {
    id: UnitId,
    group_id: GroupId,
    template: String,
    output: PathBuf,
    encoding: Encoding,
    bom: Option<&'static [u8]>,
    /// Encoding of the group's template files, for diagnostic enrichment.
    source_encoding: Encoding,
    attributes: AttributeMap,
    allow_missing_attributes: bool,
    auto_indent: bool,
    fail_fast: bool,
    timeout: Option<Timeout>,
    failed: FailureFlag,
    /// First failure observed for this unit, as reported.
    error: Mutex<Option<String>>,
    started: AtomicBool,
    completed: AtomicBool,
}

impl RenderUnit {
    /// Validate `config` and resolve everything that does not need the engine.
    ///
    /// Creates the output's parent directory if it is missing.
    pub fn initialize(
        config: &UnitConfig,
        group: &Group,
        context: &RenderContext,
    ) -> Result<Self, SchedulerError> {
        let id = config
            .id
            .clone()
            .filter(|id| !id.0.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField {
                entity: "template".to_string(),
                field: "id",
            })?;
        let entity = format!("template \"{id}\"");
        let template = required(config.name.as_deref(), &entity, "name")?;
        let target = required(config.target.as_deref(), &entity, "target")?;

        let attributes = parse_attributes(
            config.attributes.as_ref(),
            config.json_attributes.as_deref(),
            &format!("attributes of {entity}"),
        )?;

        let encoding = context.resolve_encoding(config.target_encoding.as_deref())?;
        let bom = if config.with_bom {
            Some(encoding.require_bom()?)
        } else {
            None
        };

        let output = context.resolve_output_path(target);
        if let Some(parent) = output.parent() {
            ensure_directory(parent)?;
        }

        Ok(Self {
            id,
            group_id: group.id().clone(),
            template: template.to_string(),
            output,
            encoding,
            bom,
            source_encoding: group.encoding(),
            attributes,
            allow_missing_attributes: config.allow_missing_attributes,
            auto_indent: config.auto_indent,
            fail_fast: config.fail_fast || group.fail_fast(),
            timeout: config.timeout,
            failed: FailureFlag::new(),
            error: Mutex::new(None),
            started: AtomicBool::new(false),
            completed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &UnitId {
        &self.id
    }

    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn has_bom(&self) -> bool {
        self.bom.is_some()
    }

    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    pub fn timeout(&self) -> Option<Timeout> {
        self.timeout
    }

    pub fn has_failed(&self) -> bool {
        self.failed.is_set()
    }

    /// Why the unit failed, if it did.
    pub fn error(&self) -> Option<String> {
        self.error.lock().clone()
    }

    /// Mark the unit failed with `error`. The first recorded error is kept.
    pub(crate) fn record_failure(&self, error: &SchedulerError) {
        self.failed.mark();
        self.error.lock().get_or_insert_with(|| error.to_string());
    }

    pub fn status(&self) -> UnitStatus {
        if self.failed.is_set() {
            UnitStatus::Failed
        } else if self.completed.load(Ordering::Acquire) {
            UnitStatus::Rendered
        } else {
            UnitStatus::Pending
        }
    }

    /// Identifies the unit in logs and errors.
    pub fn label(&self) -> String {
        format!(
            "template \"{}\" of group \"{}\" ('{}' -> {})",
            self.id,
            self.group_id,
            self.template,
            self.output.display()
        )
    }

    /// Render once. A second call fails without touching the output.
    pub fn execute(
        &self,
        group: &Group,
        context: &Arc<RenderContext>,
        token: &CancelToken,
    ) -> Result<(), SchedulerError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(SchedulerError::Render {
                entity: self.label(),
                message: "already executed".to_string(),
            });
        }
        let result = self.render(group, context, token);
        match &result {
            Ok(()) => {
                self.completed.store(true, Ordering::Release);
                tracing::info!(
                    template = %self.id,
                    group = %self.group_id,
                    target = %self.output.display(),
                    "rendered"
                );
            }
            // interrupted by its token: left pending unless the caller records why
            Err(SchedulerError::Cancelled { .. }) => {}
            Err(e) => self.record_failure(e),
        }
        result
    }

    fn render(
        &self,
        group: &Group,
        context: &Arc<RenderContext>,
        token: &CancelToken,
    ) -> Result<(), SchedulerError> {
        let listener = Arc::new(UnitListener {
            unit: self.id.clone(),
            group: self.group_id.clone(),
            template: self.template.clone(),
            target: self.output.clone(),
            allow_missing_attributes: self.allow_missing_attributes,
            source_encoding: self.source_encoding,
            context: Arc::clone(context),
            failed: self.failed.clone(),
        });
        let instance = group.template_handle(&self.template, &self.attributes, listener.clone())?;

        let options = WriteOptions {
            auto_indent: self.auto_indent,
        };
        writer::write_atomically(&self.output, self.encoding, self.bom, token, |out| {
            instance
                .write(out, listener.as_ref(), &options)
                .map_err(|e| {
                    if token.is_cancelled() {
                        SchedulerError::Cancelled {
                            entity: self.label(),
                        }
                    } else {
                        SchedulerError::Engine(e)
                    }
                })?;
            // reported errors discard the output even when write returned Ok
            if self.failed.is_set() {
                return Err(SchedulerError::Render {
                    entity: self.label(),
                    message: "the template engine reported errors".to_string(),
                });
            }
            Ok(())
        })?;

        if context.is_generated_source(&self.output) && !token.is_cancelled() {
            context.register_generated_output_root();
        }
        Ok(())
    }
}

fn required<'a>(
    value: Option<&'a str>,
    entity: &str,
    field: &'static str,
) -> Result<&'a str, ConfigError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingField {
            entity: entity.to_string(),
            field,
        })
}

fn ensure_directory(dir: &Path) -> Result<(), SchedulerError> {
    match std::fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(io_err(
            dir,
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "exists and is not a directory"),
        )),
        Err(_) => std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e)),
    }
}

/// Receives diagnostics for one unit's instantiation and render.
struct UnitListener {
    unit: UnitId,
    group: GroupId,
    template: String,
    target: PathBuf,
    allow_missing_attributes: bool,
    source_encoding: Encoding,
    context: Arc<RenderContext>,
    failed: FailureFlag,
}

impl DiagnosticSink for UnitListener {
    fn report(&self, diagnostic: Diagnostic) {
        let diagnostic = self.context.enrich_diagnostic(diagnostic, self.source_encoding);
        if diagnostic.kind == DiagnosticKind::MissingAttribute && self.allow_missing_attributes {
            tracing::warn!(
                template = %self.unit,
                group = %self.group,
                name = %self.template,
                target = %self.target.display(),
                "{diagnostic}"
            );
            return;
        }
        self.failed.mark();
        tracing::error!(
            template = %self.unit,
            group = %self.group,
            name = %self.template,
            target = %self.target.display(),
            "{diagnostic}"
        );
    }
}
