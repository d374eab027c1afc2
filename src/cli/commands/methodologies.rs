//! `convergent methodologies`

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::output::{output, table, CommandOutput};
use crate::domain::models::{builtin_catalog, ReviewMode};

#[derive(Args, Debug)]
pub struct MethodologiesArgs {
    /// Only list this mode's catalog
    #[arg(short, long)]
    pub mode: Option<ReviewMode>,
}

#[derive(Debug, Serialize)]
pub struct MethodologyRow {
    pub mode: ReviewMode,
    pub id: String,
    pub focus: String,
}

#[derive(Debug, Serialize)]
pub struct MethodologiesOutput {
    pub methodologies: Vec<MethodologyRow>,
}

impl CommandOutput for MethodologiesOutput {
    fn to_human(&self) -> String {
        if self.methodologies.is_empty() {
            return "No built-in methodologies for this mode; register them in a scenario.".to_string();
        }
        let mut t = table(["Mode", "Methodology", "Focus"]);
        for row in &self.methodologies {
            t.add_row(vec![row.mode.to_string(), row.id.clone(), row.focus.clone()]);
        }
        t.to_string()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub fn collect(mode: Option<ReviewMode>) -> MethodologiesOutput {
    let modes = mode.map_or_else(|| vec![ReviewMode::Audit, ReviewMode::PhaseReview], |m| vec![m]);
    let methodologies = modes
        .iter()
        .flat_map(|mode| {
            builtin_catalog(mode).into_iter().map(move |d| MethodologyRow {
                mode: mode.clone(),
                id: d.id.to_string(),
                focus: d.focus,
            })
        })
        .collect();
    MethodologiesOutput { methodologies }
}

pub async fn execute(args: MethodologiesArgs, json_mode: bool) -> Result<()> {
    output(&collect(args.mode), json_mode);
    Ok(())
}
