//! Port trait definitions (Hexagonal Architecture)
//!
//! The engine consumes these collaborators; concrete implementations live in
//! `adapters` or are supplied by the caller:
//! - MethodologyExecutor / SubCheck: domain checklists run per pass
//! - Subject: the artifact under review
//! - FixApplier: applies remediation for one issue
//! - LoopDetector: continue / pivot / escalate after repeated fix failures
//! - ContextChunker: checkpoint trigger and checkpoint persistence
//! - EvidenceVerifier: optional confidence gate for clean passes
//! - KnowledgeStore: known-fix lookup and resolution capture

pub mod context_chunker;
pub mod evidence_verifier;
pub mod fix_applier;
pub mod knowledge_store;
pub mod loop_detector;
pub mod methodology_executor;
pub mod subject;

pub use context_chunker::ContextChunker;
pub use evidence_verifier::{CleanPassClaim, Evidence, EvidenceVerifier};
pub use fix_applier::{FixApplier, FixOutcome};
pub use knowledge_store::KnowledgeStore;
pub use loop_detector::{LoopDecision, LoopDetector};
pub use methodology_executor::{MethodologyExecutor, SubCheck, SubCheckReport};
pub use subject::Subject;
