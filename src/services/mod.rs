//! Service layer: the engine components.
//!
//! - `MethodologyRegistry`: methodology pools per mode
//! - `Sampler`: distinct-within-streak random selection
//! - `PassExecutor`: sub-check fan-out/fan-in for one pass
//! - `RemediationLoop`: bounded fix attempts with loop detection
//! - `ConvergenceEngine`: the run controller sequencing all of the above

pub mod convergence_engine;
pub mod methodology_registry;
pub mod pass_executor;
pub mod remediation;
pub mod resource_locks;
pub mod sampler;

pub use convergence_engine::{validate_run_config, ConvergenceEngine};
pub use methodology_registry::MethodologyRegistry;
pub use pass_executor::PassExecutor;
pub use remediation::{IssueOutcome, RemediationLoop, RemediationReport};
pub use resource_locks::ResourceLocks;
pub use sampler::{select_methodology, RandomSource, RngSource, Sampler};
