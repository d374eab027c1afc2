//! Terminal run outputs and resumable checkpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConvergenceState, ConvergenceStatus, Issue, IssueStatus, PassRecord};

/// Monitoring counters accumulated over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    /// Issues abandoned after the loop detector (or the attempt ceiling) pivoted.
    pub loop_pivots: u32,
    /// `Continue` decisions that handed out an alternate strategy.
    pub strategy_switches: u32,
    pub checkpoints: u32,
    /// Sub-checks that crashed or timed out.
    pub execution_errors: u32,
    /// Clean passes rejected by the evidence gate.
    pub unverified_clean_passes: u32,
}

/// Everything needed to continue a run from an inter-pass boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub state: ConvergenceState,
    pub passes: Vec<PassRecord>,
    pub issues: Vec<Issue>,
    pub counters: RunCounters,
    /// Context usage at the time of the checkpoint, in tokens.
    pub context_tokens: u64,
    pub taken_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Final report of a run. Produced once, at termination.
///
/// Always carries the full pass history and issue log, whatever the status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceResult {
    pub converged: bool,
    pub status: ConvergenceStatus,
    pub passes: Vec<PassRecord>,
    pub issues: Vec<Issue>,
    pub issues_fixed: usize,
    pub clean_pass_count: u32,
    pub counters: RunCounters,
    /// Final state, serializable for a later resume.
    pub final_state: ConvergenceState,
}

impl ConvergenceResult {
    pub fn new(
        state: ConvergenceState,
        passes: Vec<PassRecord>,
        issues: Vec<Issue>,
        counters: RunCounters,
    ) -> Self {
        let issues_fixed = issues
            .iter()
            .filter(|i| i.status == IssueStatus::Fixed)
            .count();
        Self {
            converged: state.status == ConvergenceStatus::Converged,
            status: state.status,
            clean_pass_count: state.clean_pass_count,
            passes,
            issues,
            issues_fixed,
            counters,
            final_state: state,
        }
    }

    pub fn total_passes(&self) -> u32 {
        self.final_state.total_passes
    }

    /// Issues still open or abandoned at the end of the run.
    pub fn unresolved(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.status != IssueStatus::Fixed)
    }
}
