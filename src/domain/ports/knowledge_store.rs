//! Pattern/knowledge store port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::Issue;

/// Accumulates issue resolutions across runs.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Known fix for a freshly discovered issue, if any.
    async fn suggest_fix(&self, issue: &Issue) -> DomainResult<Option<String>>;

    /// Record how an issue was resolved. Callers treat this as fire-and-forget.
    async fn record(&self, issue: &Issue, resolution: &str) -> DomainResult<()>;
}
