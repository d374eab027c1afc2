//! Command implementations.

pub mod config;
pub mod methodologies;
pub mod resume;
pub mod run;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;

use crate::adapters::{FileContextChunker, InMemoryKnowledgeStore, Scenario};
use crate::domain::models::{Config, ConvergenceEvent, RunConfig};
use crate::infrastructure::config::ConfigLoader;
use crate::services::ConvergenceEngine;

/// Effective configuration: `path` when given, the project hierarchy otherwise.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Wire an engine from a scenario's scripted collaborators.
pub fn build_engine(
    scenario: &Scenario,
    config: &RunConfig,
    checkpoint_dir: Option<&Path>,
) -> Result<ConvergenceEngine> {
    let registry = scenario
        .registry(&config.mode)
        .context("Failed to build methodology registry")?;
    let subject = scenario.subject();

    let mut engine = ConvergenceEngine::new(
        Arc::new(registry),
        subject.clone(),
        scenario.fix_applier(subject),
        scenario.loop_detector(config.remediation.max_fix_attempts),
    )
    .with_knowledge_store(Arc::new(InMemoryKnowledgeStore::new()));

    if let Some(dir) = checkpoint_dir {
        engine = engine.with_context_chunker(Arc::new(FileContextChunker::new(
            dir,
            config.context.checkpoint_threshold_percent,
        )));
    }
    if let Some(verifier) = scenario.verifier() {
        engine = engine.with_evidence_verifier(verifier);
    }
    Ok(engine)
}

/// Print one line per progress event to stderr until the run ends.
pub fn spawn_progress_printer(engine: &ConvergenceEngine) -> JoinHandle<()> {
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            let terminal = event.is_terminal();
            eprintln!("{}", describe(&event));
            if terminal {
                break;
            }
        }
    })
}

fn describe(event: &ConvergenceEvent) -> String {
    match event {
        ConvergenceEvent::PassStarted { pass_number, methodology, .. } => {
            format!("pass {pass_number}: {methodology} ...")
        }
        ConvergenceEvent::PassCompleted {
            pass_number,
            is_clean,
            issues_found,
            clean_pass_count,
            ..
        } => {
            let verdict = if *is_clean { "clean" } else { "dirty" };
            format!(
                "pass {pass_number}: {verdict} ({issues_found} issue(s), streak {clean_pass_count})"
            )
        }
        ConvergenceEvent::IssuePivoted { issue_id, fix_attempts, .. } => {
            format!("issue {issue_id} abandoned after {fix_attempts} attempt(s)")
        }
        ConvergenceEvent::CheckpointTaken { location, context_usage_percent, .. } => {
            format!("checkpoint at {context_usage_percent:.1}% context -> {location}")
        }
        ConvergenceEvent::Converged { total_passes, .. } => {
            format!("converged after {total_passes} pass(es)")
        }
        ConvergenceEvent::Timeout { reason, .. } => format!("timeout: {reason}"),
        ConvergenceEvent::Aborted { reason, .. } => format!("aborted: {reason}"),
    }
}
