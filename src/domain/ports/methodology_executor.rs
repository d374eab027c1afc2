//! Methodology executor port.
//!
//! What a methodology checks is out of scope for the engine. A methodology
//! only exposes the independent sub-checks it decomposes into; the pass
//! executor runs them against a snapshot and aggregates the verdicts.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Finding, PassContext, SubjectSnapshot};

/// Findings of one sub-check plus the context it consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubCheckReport {
    pub findings: Vec<Finding>,
    /// Tokens of working context the check used.
    pub context_tokens: u64,
}

impl SubCheckReport {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn with_findings(findings: Vec<Finding>) -> Self {
        Self {
            findings,
            context_tokens: 0,
        }
    }

    #[must_use]
    pub const fn consuming(mut self, context_tokens: u64) -> Self {
        self.context_tokens = context_tokens;
        self
    }
}

/// One independent check within a methodology. Read-only against the
/// snapshot, so sub-checks of a pass may run concurrently.
#[async_trait]
pub trait SubCheck: Send + Sync {
    fn name(&self) -> &str;

    async fn check(
        &self,
        snapshot: &SubjectSnapshot,
        context: &PassContext,
    ) -> DomainResult<SubCheckReport>;
}

/// Executor capability attached to a registered methodology.
pub trait MethodologyExecutor: Send + Sync {
    /// The sub-checks making up this methodology. A methodology that does not
    /// decompose returns a single check.
    fn sub_checks(&self) -> Vec<Arc<dyn SubCheck>>;
}
