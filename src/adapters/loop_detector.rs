//! Threshold loop detector.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::ports::{LoopDecision, LoopDetector};

/// What to do once every alternate strategy has been tried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhenExhausted {
    #[default]
    Pivot,
    Escalate,
}

/// Hands out alternate strategies in order, one per consultation, then
/// pivots or escalates.
///
/// Decisions depend only on the failure count, so the detector is stateless
/// and can be shared across issues.
#[derive(Debug, Clone)]
pub struct ThresholdLoopDetector {
    first_consultation: u32,
    alternates: Vec<String>,
    when_exhausted: WhenExhausted,
}

impl ThresholdLoopDetector {
    /// `first_consultation` is the failure count at which the remediation
    /// loop first asks (its `max_fix_attempts`).
    pub fn new(first_consultation: u32, alternates: Vec<String>, when_exhausted: WhenExhausted) -> Self {
        Self {
            first_consultation: first_consultation.max(1),
            alternates,
            when_exhausted,
        }
    }
}

#[async_trait]
impl LoopDetector for ThresholdLoopDetector {
    async fn decide(&self, issue_id: Uuid, consecutive_failures: u32) -> DomainResult<LoopDecision> {
        let index = consecutive_failures.saturating_sub(self.first_consultation) as usize;
        let decision = match self.alternates.get(index) {
            Some(strategy) => LoopDecision::Continue {
                alternate_strategy: strategy.clone(),
            },
            None => match self.when_exhausted {
                WhenExhausted::Pivot => LoopDecision::Pivot,
                WhenExhausted::Escalate => LoopDecision::Escalate,
            },
        };
        tracing::debug!(%issue_id, consecutive_failures, ?decision, "loop detector decision");
        Ok(decision)
    }
}
