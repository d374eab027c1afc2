//! Progress events emitted by the engine.
//!
//! Callers that want live status subscribe to the engine's broadcast channel
//! instead of waiting for the terminal [`ConvergenceResult`](super::ConvergenceResult).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{MethodologyId, TerminationReason};

/// A convergence progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConvergenceEvent {
    /// A methodology was sampled and is about to run.
    PassStarted {
        run_id: Uuid,
        pass_number: u32,
        methodology: MethodologyId,
        timestamp: DateTime<Utc>,
    },

    /// A pass finished and its remediation, if any, has been applied.
    PassCompleted {
        run_id: Uuid,
        pass_number: u32,
        methodology: MethodologyId,
        is_clean: bool,
        issues_found: usize,
        clean_pass_count: u32,
        timestamp: DateTime<Utc>,
    },

    /// An issue was abandoned after a pivot.
    IssuePivoted {
        run_id: Uuid,
        issue_id: Uuid,
        fix_attempts: u32,
    },

    /// State was persisted at an inter-pass boundary.
    CheckpointTaken {
        run_id: Uuid,
        after_pass: u32,
        context_usage_percent: f64,
        location: String,
    },

    Converged {
        run_id: Uuid,
        total_passes: u32,
        timestamp: DateTime<Utc>,
    },

    Timeout {
        run_id: Uuid,
        total_passes: u32,
        reason: TerminationReason,
        timestamp: DateTime<Utc>,
    },

    Aborted {
        run_id: Uuid,
        total_passes: u32,
        reason: TerminationReason,
        timestamp: DateTime<Utc>,
    },
}

impl ConvergenceEvent {
    /// Stable name of the event, as used in logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PassStarted { .. } => "pass-started",
            Self::PassCompleted { .. } => "pass-completed",
            Self::IssuePivoted { .. } => "issue-pivoted",
            Self::CheckpointTaken { .. } => "checkpoint-taken",
            Self::Converged { .. } => "converged",
            Self::Timeout { .. } => "timeout",
            Self::Aborted { .. } => "aborted",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Converged { .. } | Self::Timeout { .. } | Self::Aborted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let event = ConvergenceEvent::PassStarted {
            run_id: Uuid::nil(),
            pass_number: 1,
            methodology: MethodologyId::new("security"),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "pass_started");
        assert_eq!(json["methodology"], "security");
        assert_eq!(event.name(), "pass-started");
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_terminal_events() {
        let event = ConvergenceEvent::Timeout {
            run_id: Uuid::nil(),
            total_passes: 10,
            reason: TerminationReason::MaxIterations,
            timestamp: Utc::now(),
        };
        assert!(event.is_terminal());
    }
}
