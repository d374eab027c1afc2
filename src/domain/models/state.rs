//! Convergence state machine.
//!
//! `running → converged | timeout | aborted`. The state is mutated once per
//! pass and frozen once it reaches a terminal status.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{MethodologyId, ReviewMode};
use crate::domain::errors::{DomainError, DomainResult};

pub const DEFAULT_REQUIRED_CLEAN_PASSES: u32 = 3;
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceStatus {
    Running,
    Converged,
    /// Ran out of budget while still finding issues.
    Timeout,
    /// Stuck on an issue or an invariant broke; needs a human.
    Aborted,
}

impl ConvergenceStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for ConvergenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Converged => "converged",
            Self::Timeout => "timeout",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Why a run left the `running` status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TerminationReason {
    /// The clean streak reached the quorum.
    Quorum,
    /// `total_passes` reached `max_iterations`.
    MaxIterations,
    /// The wall-clock bound elapsed between passes.
    Deadline,
    /// The loop detector escalated an unresolved issue.
    Escalated { issue_id: Uuid },
    /// A sampler or state-machine invariant broke.
    InvariantViolated { detail: String },
    /// A snapshot of the subject could not be taken.
    SubjectUnavailable { detail: String },
}

/// Mutable convergence bookkeeping for one run. Serializable so a run can
/// be checkpointed and resumed without re-deriving history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceState {
    pub run_id: Uuid,
    pub mode: ReviewMode,
    /// Methodology ids eligible for sampling in this run.
    pub pool: Vec<MethodologyId>,
    /// Methodologies used by the current clean streak.
    pub used_in_sequence: BTreeSet<MethodologyId>,
    pub clean_pass_count: u32,
    pub total_passes: u32,
    pub required_clean_passes: u32,
    pub max_iterations: u32,
    pub status: ConvergenceStatus,
    pub termination: Option<TerminationReason>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quorum => f.write_str("clean-pass quorum reached"),
            Self::MaxIterations => f.write_str("max iterations reached"),
            Self::Deadline => f.write_str("wall-clock deadline reached"),
            Self::Escalated { issue_id } => write!(f, "issue {issue_id} escalated"),
            Self::InvariantViolated { detail } => write!(f, "invariant violated: {detail}"),
            Self::SubjectUnavailable { detail } => write!(f, "subject unavailable: {detail}"),
        }
    }
}

impl ConvergenceState {
    /// Create a running state. The pool must already satisfy
    /// `|pool| >= required_clean_passes`.
    pub fn new(
        mode: ReviewMode,
        pool: Vec<MethodologyId>,
        required_clean_passes: u32,
        max_iterations: u32,
    ) -> DomainResult<Self> {
        if required_clean_passes == 0 {
            return Err(DomainError::InvalidConfig(
                "required_clean_passes must be at least 1".to_string(),
            ));
        }
        if pool.len() < required_clean_passes as usize {
            return Err(DomainError::UndersizedPool {
                mode,
                available: pool.len(),
                required: required_clean_passes,
            });
        }
        let now = Utc::now();
        Ok(Self {
            run_id: Uuid::new_v4(),
            mode,
            pool,
            used_in_sequence: BTreeSet::new(),
            clean_pass_count: 0,
            total_passes: 0,
            required_clean_passes,
            max_iterations,
            status: ConvergenceStatus::Running,
            termination: None,
            started_at: now,
            updated_at: now,
        })
    }

    pub fn is_running(&self) -> bool {
        self.status == ConvergenceStatus::Running
    }

    /// Number of the pass that would run next.
    pub fn next_pass_number(&self) -> u32 {
        self.total_passes + 1
    }

    /// Apply the verdict of one pass.
    ///
    /// A clean pass extends the streak with a methodology not yet in it and
    /// converges once the quorum is reached. Any other pass resets the streak.
    /// The iteration bound is enforced separately by
    /// [`enforce_iteration_bound`](Self::enforce_iteration_bound), after
    /// remediation of the pass has finished.
    pub fn apply_pass(&mut self, methodology: &MethodologyId, is_clean: bool) -> DomainResult<ConvergenceStatus> {
        if !self.is_running() {
            return Err(DomainError::InvariantViolation(format!(
                "pass applied to a {} run",
                self.status
            )));
        }
        if !self.pool.contains(methodology) {
            return Err(DomainError::InvariantViolation(format!(
                "methodology {methodology} is not in the run's pool"
            )));
        }

        if is_clean && self.used_in_sequence.contains(methodology) {
            return Err(DomainError::InvariantViolation(format!(
                "methodology {methodology} reused within one clean streak"
            )));
        }

        self.total_passes += 1;
        self.updated_at = Utc::now();

        if is_clean {
            self.used_in_sequence.insert(methodology.clone());
            self.clean_pass_count += 1;
            if self.clean_pass_count >= self.required_clean_passes {
                self.terminate(ConvergenceStatus::Converged, TerminationReason::Quorum);
            }
        } else {
            self.reset_streak();
        }

        self.check_streak_invariant()?;
        Ok(self.status)
    }

    /// Move to `timeout` if the pass budget is spent and the run is still going.
    pub fn enforce_iteration_bound(&mut self) -> ConvergenceStatus {
        if self.is_running() && self.total_passes >= self.max_iterations {
            self.terminate(ConvergenceStatus::Timeout, TerminationReason::MaxIterations);
        }
        self.status
    }

    /// Wall-clock bound elapsed between passes.
    pub fn expire_deadline(&mut self) {
        if self.is_running() {
            self.terminate(ConvergenceStatus::Timeout, TerminationReason::Deadline);
        }
    }

    /// The remediation loop escalated `issue_id` to a human.
    pub fn escalate(&mut self, issue_id: Uuid) {
        if self.is_running() {
            self.terminate(
                ConvergenceStatus::Aborted,
                TerminationReason::Escalated { issue_id },
            );
        }
    }

    /// The run cannot continue for a reason outside remediation.
    pub fn abort(&mut self, reason: TerminationReason) {
        if self.is_running() {
            self.terminate(ConvergenceStatus::Aborted, reason);
        }
    }

    /// Put a non-converged checkpointed state back into `running`, optionally
    /// with a larger pass budget.
    pub fn reopen(&mut self, max_iterations: Option<u32>) -> DomainResult<()> {
        if self.status == ConvergenceStatus::Converged {
            return Err(DomainError::InvalidResume {
                run_id: self.run_id.to_string(),
                reason: "run already converged".to_string(),
            });
        }
        self.check_streak_invariant()?;
        if let Some(max) = max_iterations {
            self.max_iterations = max;
        }
        if self.total_passes >= self.max_iterations {
            return Err(DomainError::InvalidResume {
                run_id: self.run_id.to_string(),
                reason: format!(
                    "pass budget spent ({} of {}); raise max_iterations to resume",
                    self.total_passes, self.max_iterations
                ),
            });
        }
        self.status = ConvergenceStatus::Running;
        self.termination = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn reset_streak(&mut self) {
        self.used_in_sequence.clear();
        self.clean_pass_count = 0;
    }

    fn terminate(&mut self, status: ConvergenceStatus, reason: TerminationReason) {
        self.status = status;
        self.termination = Some(reason);
        self.updated_at = Utc::now();
    }

    fn check_streak_invariant(&self) -> DomainResult<()> {
        if self.clean_pass_count as usize != self.used_in_sequence.len() {
            return Err(DomainError::InvariantViolation(format!(
                "clean_pass_count {} does not match {} methodologies in the streak",
                self.clean_pass_count,
                self.used_in_sequence.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(ids: &[&str]) -> Vec<MethodologyId> {
        ids.iter().map(|id| MethodologyId::new(*id)).collect()
    }

    fn state(required: u32, max: u32) -> ConvergenceState {
        ConvergenceState::new(
            ReviewMode::Audit,
            pool(&["a", "b", "c", "d", "e"]),
            required,
            max,
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_undersized_pool() {
        let err = ConvergenceState::new(ReviewMode::Audit, pool(&["a", "b"]), 3, 10).unwrap_err();
        assert!(matches!(
            err,
            DomainError::UndersizedPool {
                available: 2,
                required: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_new_rejects_zero_quorum() {
        let err = ConvergenceState::new(ReviewMode::Audit, pool(&["a"]), 0, 10).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_clean_passes_converge_at_quorum() {
        let mut s = state(3, 10);
        assert_eq!(s.apply_pass(&"a".into(), true).unwrap(), ConvergenceStatus::Running);
        assert_eq!(s.apply_pass(&"b".into(), true).unwrap(), ConvergenceStatus::Running);
        assert_eq!(s.apply_pass(&"c".into(), true).unwrap(), ConvergenceStatus::Converged);
        assert_eq!(s.termination, Some(TerminationReason::Quorum));
        assert_eq!(s.clean_pass_count, 3);
        assert_eq!(s.total_passes, 3);
    }

    #[test]
    fn test_dirty_pass_resets_streak() {
        let mut s = state(3, 10);
        s.apply_pass(&"a".into(), true).unwrap();
        s.apply_pass(&"b".into(), true).unwrap();
        s.apply_pass(&"c".into(), false).unwrap();
        assert_eq!(s.clean_pass_count, 0);
        assert!(s.used_in_sequence.is_empty());
        assert!(s.is_running());
    }

    #[test]
    fn test_reuse_within_streak_is_invariant_violation() {
        let mut s = state(3, 10);
        s.apply_pass(&"a".into(), true).unwrap();
        let err = s.apply_pass(&"a".into(), true).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn test_rejected_reuse_leaves_counters_untouched() {
        let mut s = state(3, 10);
        s.apply_pass(&"a".into(), true).unwrap();
        assert!(s.apply_pass(&"a".into(), true).is_err());
        assert_eq!(s.total_passes, 1);
        assert_eq!(s.clean_pass_count, 1);
        assert_eq!(s.used_in_sequence.len(), 1);
        s.check_streak_invariant().unwrap();
    }

    #[test]
    fn test_reuse_after_reset_is_allowed() {
        let mut s = state(3, 10);
        s.apply_pass(&"a".into(), true).unwrap();
        s.apply_pass(&"b".into(), false).unwrap();
        s.apply_pass(&"a".into(), true).unwrap();
        assert_eq!(s.clean_pass_count, 1);
    }

    #[test]
    fn test_unknown_methodology_rejected() {
        let mut s = state(3, 10);
        assert!(s.apply_pass(&"zz".into(), true).is_err());
        assert_eq!(s.total_passes, 0);
    }

    #[test]
    fn test_iteration_bound_times_out() {
        let mut s = state(3, 2);
        s.apply_pass(&"a".into(), false).unwrap();
        assert_eq!(s.enforce_iteration_bound(), ConvergenceStatus::Running);
        s.apply_pass(&"b".into(), false).unwrap();
        assert_eq!(s.enforce_iteration_bound(), ConvergenceStatus::Timeout);
        assert_eq!(s.termination, Some(TerminationReason::MaxIterations));
        assert!(s.apply_pass(&"c".into(), true).is_err());
    }

    #[test]
    fn test_convergence_on_last_pass_beats_timeout() {
        let mut s = state(1, 1);
        s.apply_pass(&"a".into(), true).unwrap();
        assert_eq!(s.enforce_iteration_bound(), ConvergenceStatus::Converged);
    }

    #[test]
    fn test_terminal_status_is_frozen() {
        let mut s = state(3, 10);
        let issue = Uuid::new_v4();
        s.escalate(issue);
        s.expire_deadline();
        assert_eq!(s.status, ConvergenceStatus::Aborted);
        assert_eq!(s.termination, Some(TerminationReason::Escalated { issue_id: issue }));
    }

    #[test]
    fn test_abort_on_invariant() {
        let mut s = state(3, 10);
        s.abort(TerminationReason::InvariantViolated {
            detail: "sampler exhausted".into(),
        });
        assert_eq!(s.status, ConvergenceStatus::Aborted);
        assert!(s.apply_pass(&"a".into(), true).is_err());
    }

    #[test]
    fn test_reopen() {
        let mut s = state(3, 2);
        s.apply_pass(&"a".into(), false).unwrap();
        s.apply_pass(&"b".into(), false).unwrap();
        s.enforce_iteration_bound();
        assert!(s.reopen(None).is_err());
        s.reopen(Some(5)).unwrap();
        assert!(s.is_running());
        assert_eq!(s.termination, None);
        assert_eq!(s.max_iterations, 5);
    }

    #[test]
    fn test_reopen_converged_rejected() {
        let mut s = state(1, 5);
        s.apply_pass(&"a".into(), true).unwrap();
        assert!(matches!(
            s.reopen(Some(10)),
            Err(DomainError::InvalidResume { .. })
        ));
    }

    #[test]
    fn test_state_serde_round_trip_preserves_streak() {
        let mut s = state(3, 10);
        s.apply_pass(&"b".into(), true).unwrap();
        let json = serde_json::to_string(&s).unwrap();
        let back: ConvergenceState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
        assert!(json.contains("\"mode\":\"audit\""));
    }
}
