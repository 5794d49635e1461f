//! Shared render pipeline entrypoint used by the CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use stencil_core::{config, RunConfig};
use stencil_renderer::TemplateEngine;

use crate::context::{RenderContext, SourceRootHook};
use crate::error::{io_err, SchedulerError};
use crate::orchestrator::RunReport;
use crate::plan::RenderPlan;
use crate::pool::CancelToken;

/// Command-line overrides layered over the loaded configuration.
///
/// Flags only ever switch behaviour on; they never turn off what the file
/// enables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub fail_fast: bool,
    pub concurrent: bool,
    pub base_dir: Option<PathBuf>,
}

impl RunOptions {
    pub fn apply(&self, config: &mut RunConfig) -> Result<(), SchedulerError> {
        config.fail_fast |= self.fail_fast;
        config.render_groups_concurrently |= self.concurrent;
        if let Some(dir) = &self.base_dir {
            config.base_dir = Some(std::path::absolute(dir).map_err(|e| io_err(dir, e))?);
        }
        Ok(())
    }
}

/// Load `config_path`, apply `options` and initialize a plan.
pub fn prepare(
    config_path: &Path,
    options: &RunOptions,
    hook: Arc<dyn SourceRootHook>,
) -> Result<RenderPlan, SchedulerError> {
    let mut config = config::load_at(config_path)?;
    options.apply(&mut config)?;
    prepare_config(&config, hook)
}

/// Initialize a plan from an already loaded configuration.
pub fn prepare_config(config: &RunConfig, hook: Arc<dyn SourceRootHook>) -> Result<RenderPlan, SchedulerError> {
    let context = Arc::new(RenderContext::new(config, hook)?);
    let plan = RenderPlan::initialize(config, context)?;
    tracing::info!(
        groups = plan.groups().len(),
        templates = plan.unit_count(),
        base_dir = %plan.context().base_dir().display(),
        "initialized render plan"
    );
    Ok(plan)
}

/// Load, initialize and render in one call.
///
/// Returns the report even when groups failed; use
/// [`RunReport::into_result`] to turn failures into an error.
pub fn render(
    config_path: &Path,
    options: &RunOptions,
    hook: Arc<dyn SourceRootHook>,
    engine: Arc<dyn TemplateEngine>,
) -> Result<RunReport, SchedulerError> {
    let plan = prepare(config_path, options, hook)?;
    plan.run(engine, &CancelToken::new())
}

/// [`render`] for an in-memory configuration.
pub fn render_config(
    config: &RunConfig,
    hook: Arc<dyn SourceRootHook>,
    engine: Arc<dyn TemplateEngine>,
) -> Result<RunReport, SchedulerError> {
    let plan = prepare_config(config, hook)?;
    plan.run(engine, &CancelToken::new())
}
