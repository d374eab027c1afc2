//! Convergent - multi-methodology convergence engine
//!
//! Convergent reviews a subject (a code change, a document, a phase
//! deliverable) repeatedly, each pass with a methodology sampled from a pool,
//! fixing what every pass finds, until a run of consecutive clean passes
//! drawn from pairwise-distinct methodologies reaches the configured quorum.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, the convergence state machine, ports
//! - **Service Layer** (`services`): registry, sampler, pass executor,
//!   remediation loop and the engine that drives a run
//! - **Adapters** (`adapters`): default collaborators and scripted scenarios
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use convergent::adapters::Scenario;
//! use convergent::domain::models::RunConfig;
//! use convergent::services::ConvergenceEngine;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let scenario = Scenario::from_file("review.yaml").await?;
//!     let config = RunConfig::default();
//!     let subject = scenario.subject();
//!     let engine = ConvergenceEngine::new(
//!         Arc::new(scenario.registry(&config.mode)?),
//!         subject.clone(),
//!         scenario.fix_applier(subject),
//!         scenario.loop_detector(config.remediation.max_fix_attempts),
//!     );
//!     let result = engine.run(&config).await?;
//!     println!("{}", result.status);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Checkpoint, Config, ConvergenceEvent, ConvergenceResult, ConvergenceState, ConvergenceStatus,
    Issue, IssueStatus, MethodologyId, ReviewMode, RunConfig, TerminationReason,
};
pub use domain::ports::{
    ContextChunker, EvidenceVerifier, FixApplier, KnowledgeStore, LoopDetector,
    MethodologyExecutor, SubCheck, Subject,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ConvergenceEngine, MethodologyRegistry, Sampler};
