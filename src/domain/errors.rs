//! Domain errors for the convergence engine.

use thiserror::Error;

use super::models::{MethodologyId, ReviewMode};

/// Domain-level errors that can occur while configuring or driving a run.
///
/// Terminal run outcomes (`timeout`, `aborted`) are not errors: they are
/// reported through [`ConvergenceResult`](super::models::ConvergenceResult)
/// so the full pass history is always available to the caller.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Pool for mode {mode} has {available} methodologies, {required} distinct clean passes required")]
    UndersizedPool {
        mode: ReviewMode,
        available: usize,
        required: u32,
    },

    #[error("No methodologies registered for mode {0}")]
    EmptyPool(ReviewMode),

    #[error("Methodology not registered: {0}")]
    UnknownMethodology(MethodologyId),

    #[error("Methodology already registered: {0}")]
    DuplicateMethodology(MethodologyId),

    #[error("Sampler exhausted: every methodology in a pool of {pool_size} is already in the clean streak")]
    Exhaustion { pool_size: usize },

    #[error("Convergence invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot resume run {run_id}: {reason}")]
    InvalidResume { run_id: String, reason: String },

    #[error("Collaborator {collaborator} failed: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl DomainError {
    /// Shorthand for a failure reported by an external collaborator.
    pub fn collaborator(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator,
            message: message.into(),
        }
    }

    /// True for the configuration class of errors, which surface before any
    /// pass runs and are never retried.
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::UndersizedPool { .. }
                | Self::EmptyPool(_)
                | Self::UnknownMethodology(_)
                | Self::InvalidConfig(_)
        )
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
