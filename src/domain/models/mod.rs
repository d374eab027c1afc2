//! Domain models for the convergence engine.

pub mod config;
pub mod events;
pub mod issue;
pub mod methodology;
pub mod pass;
pub mod result;
pub mod state;

pub use config::{
    Config, ContextConfig, EvidenceConfig, LoggingConfig, RemediationConfig, RotationPolicy,
    RunConfig,
};
pub use events::ConvergenceEvent;
pub use issue::{Finding, Issue, IssueSeverity, IssueStatus, EXECUTION_ERROR};
pub use methodology::{
    builtin_catalog, Methodology, MethodologyDescriptor, MethodologyId, ReviewMode,
};
pub use pass::{
    ExecutorTier, PassContext, PassRecord, PassResult, SubjectSnapshot, Verification,
};
pub use result::{Checkpoint, ConvergenceResult, RunCounters};
pub use state::{
    ConvergenceState, ConvergenceStatus, TerminationReason, DEFAULT_MAX_ITERATIONS,
    DEFAULT_REQUIRED_CLEAN_PASSES,
};
