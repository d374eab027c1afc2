//! Common test utilities for integration tests
//!
//! Scripted collaborators and fixtures shared by the engine integration and
//! property tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use convergent::adapters::{
    FixScript, InMemorySubject, ScriptedFixApplier, ThresholdLoopDetector, WhenExhausted,
};
use convergent::domain::errors::{DomainError, DomainResult};
use convergent::domain::models::{
    Finding, IssueSeverity, Methodology, MethodologyDescriptor, MethodologyId, PassContext,
    ReviewMode, RunConfig, SubjectSnapshot,
};
use convergent::domain::ports::{
    CleanPassClaim, Evidence, EvidenceVerifier, FixApplier, LoopDetector, MethodologyExecutor,
    SubCheck, SubCheckReport, Subject,
};
use convergent::services::{ConvergenceEngine, MethodologyRegistry, RandomSource};

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn test_mode() -> ReviewMode {
    ReviewMode::Custom("test".to_string())
}

pub fn ids(names: &[&str]) -> Vec<MethodologyId> {
    names.iter().map(|n| MethodologyId::new(*n)).collect()
}

pub fn letters(n: usize) -> Vec<String> {
    (b'A'..).take(n).map(|c| char::from(c).to_string()).collect()
}

pub fn finding(issue_type: &str) -> Finding {
    Finding::new(issue_type, IssueSeverity::Medium, format!("{issue_type} detected"))
}

/// Run config for the test mode with the given quorum and pass budget.
pub fn config(required_clean_passes: u32, max_iterations: u32) -> RunConfig {
    RunConfig {
        mode: test_mode(),
        required_clean_passes,
        max_iterations,
        ..RunConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// Returns scripted candidate indices, then 0 forever.
#[derive(Debug, Default)]
pub struct ScriptedSource(VecDeque<usize>);

impl ScriptedSource {
    pub fn new(picks: impl IntoIterator<Item = usize>) -> Self {
        Self(picks.into_iter().collect())
    }
}

impl RandomSource for ScriptedSource {
    fn pick(&mut self, len: usize) -> usize {
        self.0.pop_front().unwrap_or(0).min(len - 1)
    }
}

// ---------------------------------------------------------------------------
// Methodology outcomes
// ---------------------------------------------------------------------------

/// Sub-check whose findings depend only on the pass number, so the outcome
/// of a pass is fixed whatever methodology the sampler picks.
#[derive(Debug, Default)]
pub struct PassOutcomes {
    by_pass: HashMap<u32, Vec<Finding>>,
    always_dirty: bool,
    fail_on: BTreeSet<u32>,
    tokens_per_pass: u64,
    delay: Option<Duration>,
}

impl PassOutcomes {
    /// Every pass is clean.
    pub fn clean() -> Self {
        Self::default()
    }

    /// Every pass reports one fresh finding.
    pub fn always_dirty() -> Self {
        Self {
            always_dirty: true,
            ..Self::default()
        }
    }

    /// Listed passes report `count` findings each; every other pass is clean.
    pub fn dirty_passes(passes: &[(u32, usize)]) -> Self {
        let by_pass = passes
            .iter()
            .map(|&(pass, count)| {
                let findings = (0..count).map(|i| finding(&format!("defect-{pass}-{i}"))).collect();
                (pass, findings)
            })
            .collect();
        Self {
            by_pass,
            ..Self::default()
        }
    }

    /// Exact findings per pass.
    pub fn with_findings(by_pass: HashMap<u32, Vec<Finding>>) -> Self {
        Self {
            by_pass,
            ..Self::default()
        }
    }

    /// The sub-check errors on these passes.
    #[must_use]
    pub fn failing_on(mut self, passes: &[u32]) -> Self {
        self.fail_on = passes.iter().copied().collect();
        self
    }

    #[must_use]
    pub fn consuming(mut self, tokens_per_pass: u64) -> Self {
        self.tokens_per_pass = tokens_per_pass;
        self
    }

    /// Each check sleeps this long (use with a paused clock).
    #[must_use]
    pub fn taking(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl SubCheck for PassOutcomes {
    fn name(&self) -> &str {
        "pass-outcomes"
    }

    async fn check(
        &self,
        _snapshot: &SubjectSnapshot,
        context: &PassContext,
    ) -> DomainResult<SubCheckReport> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on.contains(&context.pass_number) {
            return Err(DomainError::collaborator("sub-check", "analyzer crashed"));
        }
        let findings = if self.always_dirty {
            vec![finding(&format!("defect-{}", context.pass_number))]
        } else {
            self.by_pass.get(&context.pass_number).cloned().unwrap_or_default()
        };
        Ok(SubCheckReport::with_findings(findings).consuming(self.tokens_per_pass))
    }
}

/// Executor sharing one sub-check across every methodology.
pub struct SharedCheck(pub Arc<dyn SubCheck>);

impl MethodologyExecutor for SharedCheck {
    fn sub_checks(&self) -> Vec<Arc<dyn SubCheck>> {
        vec![self.0.clone()]
    }
}

/// Registry of `names` in the test mode, all running `check`.
pub fn registry(names: &[String], check: Arc<dyn SubCheck>) -> MethodologyRegistry {
    let mut registry = MethodologyRegistry::new();
    for name in names {
        let descriptor = MethodologyDescriptor::new(name.as_str(), format!("{name} review"), test_mode());
        registry
            .register(Methodology::new(descriptor, Arc::new(SharedCheck(check.clone()))))
            .unwrap();
    }
    registry
}

// ---------------------------------------------------------------------------
// Remediation collaborators
// ---------------------------------------------------------------------------

/// Fixes every issue on the first attempt.
pub fn fixes_everything() -> Arc<dyn FixApplier> {
    Arc::new(ScriptedFixApplier::new(FixScript::default()))
}

/// Never fixes issues of these types.
pub fn cannot_fix(types: &[&str]) -> Arc<dyn FixApplier> {
    Arc::new(ScriptedFixApplier::new(FixScript {
        unfixable: types.iter().map(ToString::to_string).collect(),
        ..FixScript::default()
    }))
}

pub fn escalating_detector() -> Arc<dyn LoopDetector> {
    Arc::new(ThresholdLoopDetector::new(3, Vec::new(), WhenExhausted::Escalate))
}

pub fn pivoting_detector() -> Arc<dyn LoopDetector> {
    Arc::new(ThresholdLoopDetector::new(3, Vec::new(), WhenExhausted::Pivot))
}

/// Verifier that doubts the listed passes and trusts every other one.
pub struct DoubtfulPasses(pub BTreeSet<u32>);

#[async_trait]
impl EvidenceVerifier for DoubtfulPasses {
    async fn verify(&self, claim: &CleanPassClaim) -> DomainResult<Evidence> {
        let confidence = if self.0.contains(&claim.pass_number) { 0.1 } else { 0.95 };
        Ok(Evidence {
            confidence,
            proof_required: false,
        })
    }
}

/// Subject whose snapshots always fail.
pub struct UnreachableSubject;

#[async_trait]
impl Subject for UnreachableSubject {
    fn reference(&self) -> String {
        "unreachable".to_string()
    }

    async fn snapshot(&self) -> DomainResult<SubjectSnapshot> {
        Err(DomainError::Io("connection refused".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Engines
// ---------------------------------------------------------------------------

/// Engine over `names` with every pass outcome decided by `outcomes`.
pub fn engine(
    names: &[String],
    outcomes: PassOutcomes,
    fix_applier: Arc<dyn FixApplier>,
    loop_detector: Arc<dyn LoopDetector>,
) -> ConvergenceEngine {
    ConvergenceEngine::new(
        Arc::new(registry(names, Arc::new(outcomes))),
        Arc::new(InMemorySubject::empty("subject-under-review")),
        fix_applier,
        loop_detector,
    )
}
