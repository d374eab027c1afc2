//! `convergent resume`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::run::RunOutput;
use super::{build_engine, load_config, spawn_progress_printer};
use crate::adapters::{FileContextChunker, Scenario};
use crate::cli::output::output;

#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Checkpoint file written by a previous run
    #[arg(long)]
    pub checkpoint: PathBuf,

    /// Scenario file (YAML) providing the collaborators
    #[arg(short, long)]
    pub scenario: PathBuf,

    /// Upper bound on total passes, counted from the start of the run
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Directory for further checkpoints; defaults to the checkpoint's own
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,
}

pub async fn execute(args: ResumeArgs, config_path: Option<PathBuf>, json_mode: bool) -> Result<()> {
    let checkpoint = FileContextChunker::read_file(&args.checkpoint)
        .await
        .with_context(|| format!("Failed to read checkpoint {}", args.checkpoint.display()))?;

    let mut config = load_config(config_path.as_deref())?.engine;
    config.mode = checkpoint.state.mode.clone();
    config.required_clean_passes = checkpoint.state.required_clean_passes;
    config.max_iterations = args
        .max_iterations
        .unwrap_or(checkpoint.state.max_iterations);

    let scenario = Scenario::from_file(&args.scenario)
        .await
        .with_context(|| format!("Failed to load scenario {}", args.scenario.display()))?;
    let checkpoint_dir = args
        .checkpoint_dir
        .or_else(|| args.checkpoint.parent().map(PathBuf::from));
    let engine = build_engine(&scenario, &config, checkpoint_dir.as_deref())?;

    let printer = (!json_mode).then(|| spawn_progress_printer(&engine));
    let result = engine
        .resume(checkpoint, &config)
        .await
        .context("Checkpoint cannot be resumed")?;
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    output(&RunOutput { result }, json_mode);
    Ok(())
}
