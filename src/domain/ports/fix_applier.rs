//! Fix applier port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::Issue;

/// Result of one remediation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixOutcome {
    Fixed {
        /// What was done, for the knowledge store.
        resolution: String,
    },
    Failed {
        reason: String,
    },
}

impl FixOutcome {
    pub const fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed { .. })
    }
}

/// Applies a fix for one issue to the subject. `issue.strategy` carries the
/// alternate strategy when the loop detector handed one out, and
/// `issue.suggested_fix` any known fix from the knowledge store.
///
/// An `Err` counts as a failed attempt.
#[async_trait]
pub trait FixApplier: Send + Sync {
    async fn apply(&self, issue: &Issue, subject_reference: &str) -> DomainResult<FixOutcome>;
}
