//! Subject port: the caller-owned artifact under review.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::SubjectSnapshot;

/// The artifact(s) under review. The engine only reads snapshots between
/// passes; changes happen through the fix applier.
#[async_trait]
pub trait Subject: Send + Sync {
    /// Caller's reference to the subject, handed to the fix applier.
    fn reference(&self) -> String;

    /// Take a fresh read-only snapshot.
    async fn snapshot(&self) -> DomainResult<SubjectSnapshot>;
}
