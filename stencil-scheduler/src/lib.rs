//! # stencil-scheduler
//!
//! Two-level concurrent render scheduler.
//!
//! A [`RenderPlan`] is built from a [`stencil_core::RunConfig`] in one
//! initialization pass, then [`RenderPlan::run`] renders its groups on one
//! worker pool and each group's units on another. Output files are published
//! atomically; a failed render leaves the previous file in place.
//!
//! Call [`pipeline::render`] to do all of it from a config file.

pub mod context;
pub mod error;
pub mod fanout;
pub mod flag;
pub mod group;
pub mod orchestrator;
pub mod pipeline;
pub mod plan;
pub mod pool;
pub mod unit;
pub mod writer;

pub use context::{LogSourceRoot, RenderContext, SourceRootHook};
pub use error::SchedulerError;
pub use flag::FailureFlag;
pub use group::{Group, GroupStatus};
pub use orchestrator::{GroupReport, Orchestrator, RunReport, UnitReport};
pub use pipeline::{prepare, prepare_config, render, render_config, RunOptions};
pub use plan::RenderPlan;
pub use pool::{CancelToken, WorkerPool};
pub use unit::{RenderUnit, UnitStatus};
