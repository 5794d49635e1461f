//! Render group: one template source shared by the units bound to it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use stencil_core::attributes::{parse_attributes_by_template, ALL_TEMPLATES};
use stencil_core::{
    AttributeMap, AttributesByTemplate, ConfigError, Encoding, GroupConfig, GroupId, Timeout,
};
use stencil_renderer::{
    Diagnostic, DiagnosticSink, FormatterKind, TemplateEngine, TemplateHandle, TemplateInstance,
    TemplateSource,
};

use crate::context::RenderContext;
use crate::error::SchedulerError;
use crate::fanout::{self, TaskSpec};
use crate::flag::FailureFlag;
use crate::pool::{CancelToken, WorkerPool};
use crate::unit::RenderUnit;

/// Source used when a group names none.
pub const DEFAULT_SOURCE: &str = ".";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Pending,
    Rendered,
    Failed,
}

pub struct Group {
    id: GroupId,
    source: TemplateSource,
    encoding: Encoding,
    fail_fast: bool,
    render_concurrently: bool,
    timeout: Option<Timeout>,
    attributes_by_template: AttributesByTemplate,
    formatters: Vec<(String, FormatterKind)>,
    units: Vec<Arc<RenderUnit>>,
    /// Loaded template source. The lock serialises listener swap and
    /// instantiation; rendering happens outside it.
    handle: Mutex<Option<Box<dyn TemplateHandle>>>,
    failed: FailureFlag,
    started: AtomicBool,
    completed: AtomicBool,
}

impl Group {
    /// Validate `config` and resolve its source and encoding.
    ///
    /// `run_fail_fast` is inherited: a group is fail-fast if either it or
    /// the run says so.
    pub fn initialize(
        config: &GroupConfig,
        run_fail_fast: bool,
        context: &RenderContext,
    ) -> Result<Self, SchedulerError> {
        let id = config
            .id
            .clone()
            .filter(|id| !id.0.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField {
                entity: "group".to_string(),
                field: "id",
            })?;
        let entity = format!("group \"{id}\"");

        let source = config.source.as_deref().unwrap_or(DEFAULT_SOURCE);
        if source.trim().is_empty() {
            return Err(ConfigError::MissingField {
                entity,
                field: "source",
            }
            .into());
        }
        let encoding = context.resolve_encoding(config.encoding.as_deref())?;
        let source = context.resolve_source(source)?;

        let attributes_by_template = parse_attributes_by_template(
            config.attributes_by_template.as_ref(),
            config.json_attributes_by_template.as_deref(),
            &format!("attributes_by_template of {entity}"),
        )?;

        let formatters = config
            .formatters
            .iter()
            .map(|(name, kind)| Ok((name.clone(), kind.parse::<FormatterKind>()?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            id,
            source,
            encoding,
            fail_fast: config.fail_fast || run_fail_fast,
            render_concurrently: config.render_concurrently,
            timeout: config.timeout,
            attributes_by_template,
            formatters,
            units: Vec::new(),
            handle: Mutex::new(None),
            failed: FailureFlag::new(),
            started: AtomicBool::new(false),
            completed: AtomicBool::new(false),
        })
    }

    /// Attach a unit. Only valid during initialization.
    pub(crate) fn bind(&mut self, unit: Arc<RenderUnit>) {
        self.units.push(unit);
    }

    pub fn id(&self) -> &GroupId {
        &self.id
    }

    pub fn source(&self) -> &TemplateSource {
        &self.source
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    pub fn render_concurrently(&self) -> bool {
        self.render_concurrently
    }

    pub fn timeout(&self) -> Option<Timeout> {
        self.timeout
    }

    pub fn units(&self) -> &[Arc<RenderUnit>] {
        &self.units
    }

    pub fn has_failed(&self) -> bool {
        self.failed.is_set()
    }

    pub(crate) fn mark_failed(&self) {
        self.failed.mark();
    }

    pub fn status(&self) -> GroupStatus {
        if self.failed.is_set() {
            GroupStatus::Failed
        } else if self.completed.load(Ordering::Acquire) {
            GroupStatus::Rendered
        } else {
            GroupStatus::Pending
        }
    }

    pub fn label(&self) -> String {
        format!("group \"{}\" ({})", self.id, self.source)
    }

    /// Load the template source, then render every bound unit.
    ///
    /// Units are walked in binding order; a fail-fast unit failure cancels
    /// the rest. The group fails if loading reported anything or any unit
    /// failed.
    pub fn execute(
        self: &Arc<Self>,
        engine: &dyn TemplateEngine,
        context: &Arc<RenderContext>,
        token: &CancelToken,
    ) -> Result<(), SchedulerError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(SchedulerError::Render {
                entity: self.label(),
                message: "already executed".to_string(),
            });
        }
        let result = self.load(engine, context).and_then(|()| self.render_units(context, token));
        // instances already handed out keep their own copy of the templates
        self.handle.lock().take();

        match &result {
            Ok(()) => {
                self.completed.store(true, Ordering::Release);
                tracing::info!(group = %self.id, templates = self.units.len(), "group rendered");
            }
            Err(_) => self.failed.mark(),
        }
        result
    }

    fn load(&self, engine: &dyn TemplateEngine, context: &Arc<RenderContext>) -> Result<(), SchedulerError> {
        let listener = GroupListener {
            group: self.id.clone(),
            encoding: self.encoding,
            context: Arc::clone(context),
            failed: self.failed.clone(),
        };
        let mut handle = engine.load(&self.source, self.encoding, &listener)?;
        if self.failed.is_set() {
            return Err(SchedulerError::Render {
                entity: self.label(),
                message: "failed to fully load the template source".to_string(),
            });
        }
        for (name, kind) in &self.formatters {
            handle.register_formatter(name, *kind)?;
        }
        tracing::debug!(
            group = %self.id,
            source = %handle.describe(),
            templates = handle.template_names().len(),
            "loaded template source"
        );
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    fn render_units(
        self: &Arc<Self>,
        context: &Arc<RenderContext>,
        token: &CancelToken,
    ) -> Result<(), SchedulerError> {
        let pool = WorkerPool::sized_for(&format!("stencil-{}", self.id), self.render_concurrently)?;
        let jobs: Vec<_> = self
            .units
            .iter()
            .map(|unit| {
                let spec = TaskSpec {
                    label: unit.label(),
                    timeout: unit.timeout().map(|t| t.as_duration()),
                    fail_fast: unit.fail_fast(),
                };
                let unit = Arc::clone(unit);
                let group = Arc::clone(self);
                let context = Arc::clone(context);
                (spec, move |token: &CancelToken| unit.execute(&group, &context, token))
            })
            .collect();

        let results = fanout::run_in_order(pool, token, jobs);
        let (mut failed, mut cancelled) = (0, 0);
        for (unit, result) in self.units.iter().zip(&results) {
            match result {
                Ok(()) => {}
                // never finished; reported as not run
                Err(SchedulerError::Cancelled { .. }) => cancelled += 1,
                Err(e) => {
                    unit.record_failure(e);
                    failed += 1;
                }
            }
        }
        if failed + cancelled > 0 {
            let mut message = format!("{failed} of {} template(s) failed", self.units.len());
            if cancelled > 0 {
                message.push_str(&format!(", {cancelled} not run"));
            }
            return Err(SchedulerError::Render {
                entity: self.label(),
                message,
            });
        }
        Ok(())
    }

    /// A fresh instance of `name` with the layered attributes applied.
    ///
    /// Layers, lowest first: the group's `*` map, the group's map for
    /// `name`, then `attributes`. A null value removes the attribute.
    /// `listener` receives the diagnostics of instantiation and of every
    /// later render of the instance.
    pub fn template_handle(
        &self,
        name: &str,
        attributes: &AttributeMap,
        listener: Arc<dyn DiagnosticSink>,
    ) -> Result<Box<dyn TemplateInstance>, SchedulerError> {
        let mut guard = self.handle.lock();
        let handle = guard.as_mut().ok_or_else(|| SchedulerError::Render {
            entity: self.label(),
            message: "template source is not loaded".to_string(),
        })?;
        handle.set_listener(listener);
        let mut instance = handle
            .instantiate(name)
            .ok_or_else(|| SchedulerError::NotFound {
                what: "template",
                name: name.to_string(),
            })?;

        apply_layer(instance.as_mut(), self.attributes_by_template.get(ALL_TEMPLATES));
        apply_layer(instance.as_mut(), self.attributes_by_template.get(name));
        apply_layer(instance.as_mut(), Some(attributes));
        Ok(instance)
    }
}

fn apply_layer(instance: &mut dyn TemplateInstance, layer: Option<&AttributeMap>) {
    for (key, value) in layer.into_iter().flatten() {
        if value.is_null() {
            instance.remove(key);
        } else {
            instance.add(key, value.clone());
        }
    }
}

/// Receives diagnostics while the group's source is loading.
struct GroupListener {
    group: GroupId,
    encoding: Encoding,
    context: Arc<RenderContext>,
    failed: FailureFlag,
}

impl DiagnosticSink for GroupListener {
    fn report(&self, diagnostic: Diagnostic) {
        let diagnostic = self.context.enrich_diagnostic(diagnostic, self.encoding);
        self.failed.mark();
        tracing::error!(group = %self.group, "{diagnostic}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LogSourceRoot;
    use serde_json::json;
    use std::path::Path;
    use stencil_core::RunConfig;
    use stencil_renderer::{CollectingSink, TeraEngine};
    use tempfile::TempDir;

    fn context(base: &Path) -> Arc<RenderContext> {
        let config = RunConfig {
            base_dir: Some(base.to_path_buf()),
            ..RunConfig::default()
        };
        Arc::new(RenderContext::new(&config, Arc::new(LogSourceRoot)).unwrap())
    }

    fn loaded_group(dir: &TempDir, layers: serde_json::Value) -> Group {
        let config = GroupConfig {
            id: Some(GroupId("g".into())),
            source: Some("greet ::= \"{{ a | default(value='-') }} {{ b | default(value='-') }} {{ c | default(value='-') }}\"".into()),
            json_attributes_by_template: Some(layers.to_string()),
            ..GroupConfig::default()
        };
        let ctx = context(dir.path());
        let group = Group::initialize(&config, false, &ctx).unwrap();
        group.load(&TeraEngine::new(), &ctx).unwrap();
        group
    }

    fn render(instance: &dyn TemplateInstance) -> String {
        let mut out = Vec::new();
        instance
            .write(&mut out, &CollectingSink::new(), &Default::default())
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn attribute_layers_apply_lowest_first_and_null_removes() {
        let dir = TempDir::new().unwrap();
        let group = loaded_group(&dir, json!({ "*": { "a": 1 }, "greet": { "b": 2 } }));
        let unit_attrs = json!({ "a": null, "c": 3 });
        let unit_attrs = unit_attrs.as_object().unwrap();

        let instance = group
            .template_handle("greet", unit_attrs, Arc::new(CollectingSink::new()))
            .unwrap();
        let keys: Vec<_> = instance.attributes().keys().cloned().collect();
        assert_eq!(keys, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(render(instance.as_ref()), "- 2 3");
    }

    #[test]
    fn unknown_template_is_not_found() {
        let dir = TempDir::new().unwrap();
        let group = loaded_group(&dir, json!({}));
        let err = group
            .template_handle("nope", &AttributeMap::new(), Arc::new(CollectingSink::new()))
            .err()
            .unwrap();
        assert!(matches!(err, SchedulerError::NotFound { what: "template", .. }));
    }

    #[test]
    fn blank_source_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = GroupConfig {
            id: Some(GroupId("g".into())),
            source: Some("   ".into()),
            ..GroupConfig::default()
        };
        let err = Group::initialize(&config, false, &context(dir.path())).err().unwrap();
        assert!(matches!(
            err,
            SchedulerError::Config(ConfigError::MissingField { field: "source", .. })
        ));
    }

    #[test]
    fn fail_fast_is_inherited_from_the_run() {
        let dir = TempDir::new().unwrap();
        let config = GroupConfig {
            id: Some(GroupId("g".into())),
            ..GroupConfig::default()
        };
        let group = Group::initialize(&config, true, &context(dir.path())).unwrap();
        assert!(group.fail_fast());
    }
}
