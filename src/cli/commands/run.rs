//! `convergent run`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use super::{build_engine, load_config, spawn_progress_printer};
use crate::adapters::Scenario;
use crate::cli::output::{issue_status_cell, output, status_cell, table, truncate, CommandOutput};
use crate::domain::models::{ConvergenceResult, ReviewMode};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Scenario file (YAML)
    #[arg(short, long)]
    pub scenario: PathBuf,

    /// Seed for methodology sampling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Review mode: audit, phase-review or custom:<name>
    #[arg(short, long)]
    pub mode: Option<ReviewMode>,

    /// Upper bound on total passes
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Consecutive distinct clean passes needed to converge
    #[arg(long)]
    pub required_clean_passes: Option<u32>,

    /// Directory for checkpoints; checkpointing is off without it
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,
}

/// Result of a run, rendered as a summary plus pass and issue tables.
#[derive(Debug, Serialize)]
pub struct RunOutput {
    #[serde(flatten)]
    pub result: ConvergenceResult,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let result = &self.result;
        let state = &result.final_state;

        let mut summary = table(["Run", "Status", "Passes", "Streak", "Issues fixed", "Reason"]);
        summary.add_row(vec![
            comfy_table::Cell::new(state.run_id.to_string()),
            status_cell(result.status),
            comfy_table::Cell::new(format!("{}/{}", result.total_passes(), state.max_iterations)),
            comfy_table::Cell::new(format!(
                "{}/{}",
                result.clean_pass_count, state.required_clean_passes
            )),
            comfy_table::Cell::new(format!("{}/{}", result.issues_fixed, result.issues.len())),
            comfy_table::Cell::new(
                state
                    .termination
                    .as_ref()
                    .map_or_else(|| "-".to_string(), ToString::to_string),
            ),
        ]);

        let mut passes = table(["Pass", "Methodology", "Clean", "Issues", "Streak", "Revision"]);
        for pass in &result.passes {
            passes.add_row(vec![
                pass.pass_number.to_string(),
                pass.methodology.to_string(),
                if pass.is_clean { "yes" } else { "no" }.to_string(),
                pass.issue_ids.len().to_string(),
                pass.streak_after.to_string(),
                pass.subject_revision.to_string(),
            ]);
        }

        let mut lines = vec![summary.to_string(), passes.to_string()];

        if !result.issues.is_empty() {
            let mut issues = table(["Pass", "Type", "Severity", "Status", "Attempts", "Description"]);
            for issue in &result.issues {
                issues.add_row(vec![
                    comfy_table::Cell::new(issue.pass_number),
                    comfy_table::Cell::new(&issue.issue_type),
                    comfy_table::Cell::new(format!("{:?}", issue.severity).to_lowercase()),
                    issue_status_cell(issue.status),
                    comfy_table::Cell::new(issue.fix_attempts),
                    comfy_table::Cell::new(truncate(&issue.description, 50)),
                ]);
            }
            lines.push(issues.to_string());
        }

        let counters = &result.counters;
        lines.push(format!(
            "pivots: {}  strategy switches: {}  checkpoints: {}  execution errors: {}  unverified clean passes: {}",
            counters.loop_pivots,
            counters.strategy_switches,
            counters.checkpoints,
            counters.execution_errors,
            counters.unverified_clean_passes,
        ));
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>, json_mode: bool) -> Result<()> {
    let mut config = load_config(config_path.as_deref())?.engine;
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }
    if let Some(required) = args.required_clean_passes {
        config.required_clean_passes = required;
    }

    let scenario = Scenario::from_file(&args.scenario)
        .await
        .with_context(|| format!("Failed to load scenario {}", args.scenario.display()))?;
    let engine = build_engine(&scenario, &config, args.checkpoint_dir.as_deref())?;

    let printer = (!json_mode).then(|| spawn_progress_printer(&engine));
    let result = engine.run(&config).await.context("Run could not start")?;
    if let Some(printer) = printer {
        // The printer stops at the terminal event.
        let _ = printer.await;
    }

    output(&RunOutput { result }, json_mode);
    Ok(())
}
