//! Loop detection port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::DomainResult;

/// What to do with an issue that keeps failing remediation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum LoopDecision {
    /// Try once more with the given strategy.
    Continue { alternate_strategy: String },
    /// Abandon the issue and move on to the next pass.
    Pivot,
    /// Stop the run; a human has to look at this issue.
    Escalate,
}

/// Decides how to proceed after repeated remediation failures.
#[async_trait]
pub trait LoopDetector: Send + Sync {
    async fn decide(&self, issue_id: Uuid, consecutive_failures: u32) -> DomainResult<LoopDecision>;
}
