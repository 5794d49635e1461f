//! Top level of the two-level fan-out: groups across a worker pool.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use stencil_core::{GroupId, UnitId};
use stencil_renderer::TemplateEngine;

use crate::context::RenderContext;
use crate::error::SchedulerError;
use crate::fanout::{self, TaskSpec};
use crate::group::{Group, GroupStatus};
use crate::pool::{CancelToken, WorkerPool};
use crate::unit::UnitStatus;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub id: UnitId,
    pub template: String,
    pub output: PathBuf,
    pub status: UnitStatus,
    /// Why the unit failed, if it did.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub id: GroupId,
    pub status: GroupStatus,
    /// Why the group failed, if it did.
    pub error: Option<String>,
    pub units: Vec<UnitReport>,
}

/// Outcome of one run, in configuration order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub groups: Vec<GroupReport>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.groups.iter().all(|g| g.status == GroupStatus::Rendered)
    }

    pub fn failed_groups(&self) -> Vec<GroupId> {
        self.groups
            .iter()
            .filter(|g| g.status != GroupStatus::Rendered)
            .map(|g| g.id.clone())
            .collect()
    }

    /// Count of units in each state: `(rendered, failed, pending)`.
    pub fn unit_counts(&self) -> (usize, usize, usize) {
        let mut counts = (0, 0, 0);
        for unit in self.groups.iter().flat_map(|g| &g.units) {
            match unit.status {
                UnitStatus::Rendered => counts.0 += 1,
                UnitStatus::Failed => counts.1 += 1,
                UnitStatus::Pending => counts.2 += 1,
            }
        }
        counts
    }

    /// `Err(RunFailed)` naming every group that did not render.
    pub fn into_result(self) -> Result<Self, SchedulerError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(SchedulerError::RunFailed {
                failed_groups: self.failed_groups(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    engine: Arc<dyn TemplateEngine>,
    context: Arc<RenderContext>,
    concurrent: bool,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn TemplateEngine>, context: Arc<RenderContext>) -> Self {
        Self {
            engine,
            context,
            concurrent: false,
        }
    }

    /// Render groups on a pool sized to the available cores instead of one
    /// worker.
    pub fn concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    /// Run every group and report on all of them.
    ///
    /// Groups are walked in order. A failing fail-fast group cancels the
    /// groups after it. Only pool creation makes this return `Err`; group
    /// failures are in the report.
    pub fn run(&self, groups: &[Arc<Group>], token: &CancelToken) -> Result<RunReport, SchedulerError> {
        let pool = WorkerPool::sized_for("stencil-groups", self.concurrent)?;
        tracing::debug!(groups = groups.len(), workers = pool.size(), "rendering groups");

        let jobs: Vec<_> = groups
            .iter()
            .map(|group| {
                let spec = TaskSpec {
                    label: group.label(),
                    timeout: group.timeout().map(|t| t.as_duration()),
                    fail_fast: group.fail_fast(),
                };
                let group = Arc::clone(group);
                let engine = Arc::clone(&self.engine);
                let context = Arc::clone(&self.context);
                (spec, move |token: &CancelToken| {
                    group.execute(engine.as_ref(), &context, token)
                })
            })
            .collect();

        let results = fanout::run_in_order(pool, token, jobs);
        let report = groups
            .iter()
            .zip(results)
            .map(|(group, result)| {
                let error = result.err().map(|e| {
                    group.mark_failed();
                    e.to_string()
                });
                GroupReport {
                    id: group.id().clone(),
                    status: group.status(),
                    error,
                    units: group
                        .units()
                        .iter()
                        .map(|u| UnitReport {
                            id: u.id().clone(),
                            template: u.template().to_string(),
                            output: u.output().to_path_buf(),
                            status: u.status(),
                            error: u.error(),
                        })
                        .collect(),
                }
            })
            .collect();

        Ok(RunReport { groups: report })
    }
}
