//! Passes: one application of one methodology to a subject snapshot.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Issue, MethodologyId};

/// Executor/model tier a pass runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorTier {
    Fast,
    #[default]
    Standard,
    Deep,
}

impl fmt::Display for ExecutorTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fast => "fast",
            Self::Standard => "standard",
            Self::Deep => "deep",
        };
        f.write_str(s)
    }
}

/// Per-pass information handed to every sub-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassContext {
    pub pass_number: u32,
    pub tier: ExecutorTier,
    /// The pass starts from cleared working context.
    pub fresh_context: bool,
}

/// Read-only view of the subject taken between passes.
///
/// Cheap to clone; sub-checks running in parallel share the same artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectSnapshot {
    /// Caller's reference to the subject (path, URL, document id).
    pub reference: String,
    /// Monotonic revision, bumped by the owner whenever a fix lands.
    pub revision: u64,
    /// Artifact name → content.
    pub artifacts: Arc<BTreeMap<String, String>>,
    pub taken_at: DateTime<Utc>,
}

impl SubjectSnapshot {
    pub fn new(reference: impl Into<String>, revision: u64, artifacts: BTreeMap<String, String>) -> Self {
        Self {
            reference: reference.into(),
            revision,
            artifacts: Arc::new(artifacts),
            taken_at: Utc::now(),
        }
    }

    pub fn artifact(&self, name: &str) -> Option<&str> {
        self.artifacts.get(name).map(String::as_str)
    }
}

/// Aggregated verdict of one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassResult {
    /// True when every sub-check came back clean.
    pub is_clean: bool,
    /// Union of all sub-check issues, including synthetic execution errors.
    pub issues: Vec<Issue>,
    /// Context consumed by the pass, in tokens.
    pub context_tokens: u64,
    /// Names of the sub-checks that ran.
    pub sub_checks: Vec<String>,
}

impl PassResult {
    pub fn clean() -> Self {
        Self {
            is_clean: true,
            ..Self::default()
        }
    }

    pub fn with_issues(issues: Vec<Issue>) -> Self {
        Self {
            is_clean: issues.is_empty(),
            issues,
            ..Self::default()
        }
    }
}

/// Outcome of the optional evidence gate for a clean pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    /// Confidence in the claim "pass N is clean", 0.0..=1.0.
    pub confidence: f64,
    /// The verifier wants proof before the claim is trusted.
    pub proof_required: bool,
    /// The claim met the configured confidence threshold.
    pub accepted: bool,
}

/// Append-only record of a completed pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassRecord {
    pub pass_number: u32,
    pub methodology: MethodologyId,
    pub timestamp: DateTime<Utc>,
    pub is_clean: bool,
    /// Ids of the issues this pass found, in the run's issue log.
    pub issue_ids: Vec<uuid::Uuid>,
    pub tier: ExecutorTier,
    pub subject_revision: u64,
    /// Clean streak length after this pass was applied.
    pub streak_after: u32,
    pub verification: Option<Verification>,
}
