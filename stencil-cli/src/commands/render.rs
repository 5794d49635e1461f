//! `stencil render`: run the full pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use stencil_renderer::TeraEngine;
use stencil_scheduler::{pipeline, GroupStatus, RunOptions, RunReport, UnitStatus};

use super::{announce_source_root, config_path};

/// Arguments for `stencil render`.
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Configuration file (default: ./stencil.yaml).
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Stop at the first failing group or template.
    #[arg(long)]
    pub fail_fast: bool,

    /// Render groups on all available cores.
    #[arg(long)]
    pub concurrent: bool,

    /// Base directory for relative targets (default: the config file's directory).
    #[arg(long)]
    pub base_dir: Option<PathBuf>,
}

impl RenderArgs {
    pub fn run(self) -> Result<()> {
        let path = config_path(self.config);
        tracing::debug!(config = %path.display(), "using configuration");
        let options = RunOptions {
            fail_fast: self.fail_fast,
            concurrent: self.concurrent,
            base_dir: self.base_dir,
        };

        let report = pipeline::render(
            &path,
            &options,
            Arc::new(announce_source_root),
            Arc::new(TeraEngine::new()),
        )
        .with_context(|| format!("render failed for {}", path.display()))?;

        print_summary(&report);
        report.into_result().context("render failed")?;
        Ok(())
    }
}

fn print_summary(report: &RunReport) {
    for group in &report.groups {
        match group.status {
            GroupStatus::Rendered => {
                println!("{} group '{}'", "✓".green(), group.id);
            }
            _ => {
                let reason = group.error.as_deref().unwrap_or("failed");
                println!("{} group '{}': {}", "✗".red(), group.id, reason);
            }
        }
        for unit in &group.units {
            let marker = match unit.status {
                UnitStatus::Rendered => "✎".normal(),
                UnitStatus::Failed => "✗".red(),
                UnitStatus::Pending => "·".bright_black(),
            };
            match &unit.error {
                Some(reason) => {
                    println!("  {marker}  {} ({}): {reason}", unit.output.display(), unit.id)
                }
                None => println!("  {marker}  {} ({})", unit.output.display(), unit.id),
            }
        }
    }

    let (rendered, failed, pending) = report.unit_counts();
    let summary = format!("{rendered} rendered, {failed} failed, {pending} not run");
    if report.is_success() {
        println!("{}", summary.bold());
    } else {
        println!("{}", summary.red().bold());
    }
}
