//! Context/memory chunking port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::Checkpoint;

/// Decides when working context is full enough to checkpoint, and persists
/// checkpoints so a run can be resumed.
#[async_trait]
pub trait ContextChunker: Send + Sync {
    /// "Checkpoint now" signal for the given context usage (0..=100+).
    fn should_checkpoint(&self, usage_percent: f64) -> bool;

    /// Persist the checkpoint. Returns where it was stored.
    async fn persist(&self, checkpoint: &Checkpoint) -> DomainResult<String>;

    /// Load the most recent checkpoint of a run, if any.
    async fn load(&self, run_id: &str) -> DomainResult<Option<Checkpoint>>;
}
