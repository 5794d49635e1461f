//! `stencil check`: initialize only, then list what would be rendered.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use stencil_scheduler::{pipeline, LogSourceRoot, RenderPlan, RunOptions};

use super::config_path;

/// Arguments for `stencil check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Configuration file (default: ./stencil.yaml).
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Base directory for relative targets (default: the config file's directory).
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let path = config_path(self.config);
        tracing::debug!(config = %path.display(), "using configuration");
        let options = RunOptions {
            base_dir: self.base_dir,
            ..RunOptions::default()
        };
        let plan = pipeline::prepare(&path, &options, Arc::new(LogSourceRoot))
            .with_context(|| format!("check failed for {}", path.display()))?;

        let rows = rows(&plan);
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize check JSON")?
            );
            return Ok(());
        }

        println!(
            "Stencil v{} | {} groups | {} templates",
            env!("CARGO_PKG_VERSION"),
            plan.groups().len(),
            plan.unit_count(),
        );
        if rows.is_empty() {
            println!("No templates configured.");
            return Ok(());
        }
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

#[derive(Debug, Serialize, Tabled)]
struct UnitRow {
    #[tabled(rename = "group")]
    group: String,
    #[tabled(rename = "template")]
    id: String,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "target")]
    target: String,
    #[tabled(rename = "encoding")]
    encoding: String,
}

fn rows(plan: &RenderPlan) -> Vec<UnitRow> {
    plan.units()
        .map(|unit| UnitRow {
            group: unit.group_id().to_string(),
            id: unit.id().to_string(),
            name: unit.template().to_string(),
            target: unit.output().display().to_string(),
            encoding: if unit.has_bom() {
                format!("{} (BOM)", unit.encoding().name())
            } else {
                unit.encoding().name().to_string()
            },
        })
        .collect()
}
