//! Initialization phase: validate the configuration and build the registries.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stencil_core::{ConfigError, GroupId, RunConfig, UnitConfig, UnitId};
use stencil_renderer::TemplateEngine;

use crate::context::RenderContext;
use crate::error::SchedulerError;
use crate::group::Group;
use crate::orchestrator::{Orchestrator, RunReport};
use crate::pool::CancelToken;
use crate::unit::RenderUnit;

/// Fully initialized groups and units, ready to run.
///
/// The registries are filled during [`RenderPlan::initialize`] and read-only
/// afterwards.
pub struct RenderPlan {
    context: Arc<RenderContext>,
    groups: Vec<Arc<Group>>,
    groups_by_id: BTreeMap<GroupId, usize>,
    units_by_id: BTreeMap<UnitId, Arc<RenderUnit>>,
    units_by_output: BTreeMap<PathBuf, UnitId>,
    render_groups_concurrently: bool,
}

impl RenderPlan {
    /// Initialize every group, then every unit.
    ///
    /// Each failure is logged and collected. With `fail_fast` the first one
    /// aborts; otherwise all entities are tried and the failures reported
    /// together. Nothing is rendered from a plan that failed to initialize.
    pub fn initialize(config: &RunConfig, context: Arc<RenderContext>) -> Result<Self, SchedulerError> {
        let mut failures = Vec::new();
        let mut fail = |entity: String, error: SchedulerError| -> Result<(), SchedulerError> {
            tracing::error!(entity = %entity, error = %error, "initialization failed");
            failures.push(format!("{entity}: {error}"));
            if config.fail_fast {
                Err(SchedulerError::Initialization {
                    failures: failures.clone(),
                })
            } else {
                Ok(())
            }
        };

        let mut groups: Vec<Group> = Vec::with_capacity(config.groups.len());
        let mut groups_by_id = BTreeMap::new();
        for (index, group_config) in config.groups.iter().enumerate() {
            let entity = match &group_config.id {
                Some(id) => format!("group \"{id}\""),
                None => format!("groups[{index}]"),
            };
            let group = Group::initialize(group_config, config.fail_fast, &context).and_then(|g| {
                if groups_by_id.contains_key(g.id()) {
                    Err(ConfigError::Invalid(format!("duplicate group id \"{}\"", g.id())).into())
                } else {
                    Ok(g)
                }
            });
            match group {
                Ok(group) => {
                    tracing::debug!(group = %group.id(), source = %group.source(), "initialized group");
                    groups_by_id.insert(group.id().clone(), groups.len());
                    groups.push(group);
                }
                Err(e) => fail(entity, e)?,
            }
        }

        let mut units_by_id = BTreeMap::new();
        let mut units_by_output: BTreeMap<PathBuf, UnitId> = BTreeMap::new();
        for (index, unit_config) in config.templates.iter().enumerate() {
            let entity = match &unit_config.id {
                Some(id) => format!("template \"{id}\""),
                None => format!("templates[{index}]"),
            };
            let unit = initialize_unit(
                unit_config,
                &entity,
                &groups,
                &groups_by_id,
                &context,
                &units_by_id,
                &units_by_output,
            );
            match unit {
                Ok((slot, unit)) => {
                    tracing::debug!(
                        template = %unit.id(),
                        group = %unit.group_id(),
                        target = %unit.output().display(),
                        "initialized template"
                    );
                    let unit = Arc::new(unit);
                    units_by_output.insert(unit.output().to_path_buf(), unit.id().clone());
                    units_by_id.insert(unit.id().clone(), Arc::clone(&unit));
                    groups[slot].bind(unit);
                }
                Err(e) => fail(entity, e)?,
            }
        }

        if !failures.is_empty() {
            return Err(SchedulerError::Initialization { failures });
        }
        Ok(Self {
            context,
            groups: groups.into_iter().map(Arc::new).collect(),
            groups_by_id,
            units_by_id,
            units_by_output,
            render_groups_concurrently: config.render_groups_concurrently,
        })
    }

    pub fn context(&self) -> &Arc<RenderContext> {
        &self.context
    }

    /// Groups in configuration order.
    pub fn groups(&self) -> &[Arc<Group>] {
        &self.groups
    }

    pub fn group(&self, id: &GroupId) -> Option<&Arc<Group>> {
        self.groups_by_id.get(id).map(|&i| &self.groups[i])
    }

    pub fn unit(&self, id: &UnitId) -> Option<&Arc<RenderUnit>> {
        self.units_by_id.get(id)
    }

    /// The unit that writes `output`, if any.
    pub fn unit_for_output(&self, output: &Path) -> Option<&Arc<RenderUnit>> {
        self.units_by_output.get(output).and_then(|id| self.unit(id))
    }

    /// Units in group order, then configuration order within each group.
    pub fn units(&self) -> impl Iterator<Item = &Arc<RenderUnit>> {
        self.groups.iter().flat_map(|g| g.units())
    }

    pub fn unit_count(&self) -> usize {
        self.units_by_id.len()
    }

    /// Render every group with `engine`.
    pub fn run(&self, engine: Arc<dyn TemplateEngine>, token: &CancelToken) -> Result<RunReport, SchedulerError> {
        Orchestrator::new(engine, Arc::clone(&self.context))
            .concurrent(self.render_groups_concurrently)
            .run(&self.groups, token)
    }
}

/// Returns the unit and the index of its group.
fn initialize_unit(
    config: &UnitConfig,
    entity: &str,
    groups: &[Group],
    groups_by_id: &BTreeMap<GroupId, usize>,
    context: &RenderContext,
    units_by_id: &BTreeMap<UnitId, Arc<RenderUnit>>,
    units_by_output: &BTreeMap<PathBuf, UnitId>,
) -> Result<(usize, RenderUnit), SchedulerError> {
    let group_id = config
        .group_id
        .as_ref()
        .filter(|id| !id.0.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingField {
            entity: entity.to_string(),
            field: "group_id",
        })?;
    let &slot = groups_by_id
        .get(group_id)
        .ok_or_else(|| SchedulerError::NotFound {
            what: "group",
            name: group_id.0.clone(),
        })?;

    let unit = RenderUnit::initialize(config, &groups[slot], context)?;
    if units_by_id.contains_key(unit.id()) {
        return Err(ConfigError::Invalid(format!("duplicate template id \"{}\"", unit.id())).into());
    }
    if let Some(other) = units_by_output.get(unit.output()) {
        return Err(ConfigError::Invalid(format!(
            "target {} is already written by template \"{other}\"",
            unit.output().display()
        ))
        .into());
    }
    Ok((slot, unit))
}
