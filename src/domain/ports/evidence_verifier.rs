//! Evidence verifier port (optional clean-pass gate).

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::MethodologyId;

/// The claim "pass N is clean".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanPassClaim {
    pub run_id: Uuid,
    pub pass_number: u32,
    pub methodology: MethodologyId,
    pub subject_revision: u64,
}

/// Verifier answer for a claim.
#[derive(Debug, Clone, PartialEq)]
pub struct Evidence {
    /// 0.0..=1.0
    pub confidence: f64,
    pub proof_required: bool,
}

#[async_trait]
pub trait EvidenceVerifier: Send + Sync {
    async fn verify(&self, claim: &CleanPassClaim) -> DomainResult<Evidence>;
}
