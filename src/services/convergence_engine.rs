//! Convergence engine (run controller).
//!
//! The `ConvergenceEngine` owns a run from start to terminal status:
//!
//! - **SAMPLE** -- pick a methodology not yet used by the clean streak.
//! - **EXECUTE** -- apply it to a fresh subject snapshot.
//! - **APPLY** -- feed the verdict to the state machine.
//! - **REMEDIATE** -- drive fixes for every issue the pass found.
//! - **RECORD** -- append the pass record, emit progress events.
//! - **BOUND** -- enforce `max_iterations`, checkpoint when context is full.
//!
//! Passes are strictly sequential: pass *k+1* snapshots the subject only
//! after all remediation from pass *k* has finished.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::methodology_registry::MethodologyRegistry;
use super::pass_executor::PassExecutor;
use super::remediation::RemediationLoop;
use super::sampler::Sampler;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Checkpoint, ConvergenceEvent, ConvergenceResult, ConvergenceState, ConvergenceStatus, Issue,
    PassContext, PassRecord, RunConfig, RunCounters, TerminationReason, Verification,
};
use crate::domain::ports::{
    CleanPassClaim, ContextChunker, EvidenceVerifier, FixApplier, KnowledgeStore, LoopDetector,
    Subject,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// RunLedger
// ---------------------------------------------------------------------------

/// Everything a run accumulates. Exclusively owned by the engine while the
/// run is in progress.
#[derive(Debug)]
struct RunLedger {
    state: ConvergenceState,
    passes: Vec<PassRecord>,
    issues: Vec<Issue>,
    counters: RunCounters,
    context_tokens: u64,
}

impl RunLedger {
    fn fresh(state: ConvergenceState) -> Self {
        Self {
            state,
            passes: Vec::new(),
            issues: Vec::new(),
            counters: RunCounters::default(),
            context_tokens: 0,
        }
    }

    fn from_checkpoint(checkpoint: Checkpoint) -> Self {
        Self {
            state: checkpoint.state,
            passes: checkpoint.passes,
            issues: checkpoint.issues,
            counters: checkpoint.counters,
            context_tokens: checkpoint.context_tokens,
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            state: self.state.clone(),
            passes: self.passes.clone(),
            issues: self.issues.clone(),
            counters: self.counters,
            context_tokens: self.context_tokens,
            taken_at: Utc::now(),
        }
    }

    fn into_result(self) -> ConvergenceResult {
        ConvergenceResult::new(self.state, self.passes, self.issues, self.counters)
    }
}

// ---------------------------------------------------------------------------
// ConvergenceEngine
// ---------------------------------------------------------------------------

/// Multi-methodology convergence engine.
///
/// Collaborators are injected at construction; the registry is shared but
/// never mutated by a run, so independent engines can run in parallel.
pub struct ConvergenceEngine {
    registry: Arc<MethodologyRegistry>,
    subject: Arc<dyn Subject>,
    fix_applier: Arc<dyn FixApplier>,
    loop_detector: Arc<dyn LoopDetector>,
    chunker: Option<Arc<dyn ContextChunker>>,
    verifier: Option<Arc<dyn EvidenceVerifier>>,
    knowledge: Option<Arc<dyn KnowledgeStore>>,
    events: broadcast::Sender<ConvergenceEvent>,
}

impl ConvergenceEngine {
    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    pub fn new(
        registry: Arc<MethodologyRegistry>,
        subject: Arc<dyn Subject>,
        fix_applier: Arc<dyn FixApplier>,
        loop_detector: Arc<dyn LoopDetector>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            registry,
            subject,
            fix_applier,
            loop_detector,
            chunker: None,
            verifier: None,
            knowledge: None,
            events,
        }
    }

    #[must_use]
    pub fn with_context_chunker(mut self, chunker: Arc<dyn ContextChunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    #[must_use]
    pub fn with_evidence_verifier(mut self, verifier: Arc<dyn EvidenceVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    #[must_use]
    pub fn with_knowledge_store(mut self, store: Arc<dyn KnowledgeStore>) -> Self {
        self.knowledge = Some(store);
        self
    }

    /// Live progress stream. Events sent before subscribing are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<ConvergenceEvent> {
        self.events.subscribe()
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Run to a terminal status with a sampler seeded from `config.seed`.
    ///
    /// Configuration errors (unknown mode, undersized pool) surface as `Err`
    /// before any pass runs. Every other outcome, including `timeout` and
    /// `aborted`, is reported through the returned result.
    pub async fn run(&self, config: &RunConfig) -> DomainResult<ConvergenceResult> {
        self.run_with_sampler(config, Sampler::from_seed_option(config.seed))
            .await
    }

    /// Same as [`run`](Self::run) with an injected sampler.
    #[tracing::instrument(skip_all, fields(mode = %config.mode))]
    pub async fn run_with_sampler(
        &self,
        config: &RunConfig,
        mut sampler: Sampler,
    ) -> DomainResult<ConvergenceResult> {
        validate_run_config(config)?;
        let pool = match &config.pool {
            Some(ids) => {
                self.registry
                    .restricted_pool(&config.mode, ids, config.required_clean_passes)?
            }
            None => self
                .registry
                .pool_for(&config.mode, config.required_clean_passes)?,
        };
        let state = ConvergenceState::new(
            config.mode.clone(),
            pool,
            config.required_clean_passes,
            config.max_iterations,
        )?;

        tracing::info!(
            run_id = %state.run_id,
            pool_size = state.pool.len(),
            required_clean_passes = state.required_clean_passes,
            max_iterations = state.max_iterations,
            "starting convergence run"
        );

        Ok(self.drive(RunLedger::fresh(state), config, &mut sampler).await)
    }

    /// Continue a checkpointed run.
    ///
    /// The checkpoint's counters, clean streak, pass history and issue log
    /// are restored as-is; `config` supplies the pass budget and every other
    /// run setting from here on. The quorum is fixed by the checkpoint and
    /// must match `config.required_clean_passes`.
    #[tracing::instrument(skip_all, fields(run_id = %checkpoint.state.run_id))]
    pub async fn resume(
        &self,
        checkpoint: Checkpoint,
        config: &RunConfig,
    ) -> DomainResult<ConvergenceResult> {
        validate_run_config(config)?;
        if config.required_clean_passes != checkpoint.state.required_clean_passes {
            return Err(DomainError::InvalidResume {
                run_id: checkpoint.state.run_id.to_string(),
                reason: format!(
                    "checkpoint requires {} clean passes but the run config asks for {}",
                    checkpoint.state.required_clean_passes, config.required_clean_passes
                ),
            });
        }
        let mut ledger = RunLedger::from_checkpoint(checkpoint);

        for id in &ledger.state.pool {
            if self.registry.get(id).is_none() {
                return Err(DomainError::UnknownMethodology(id.clone()));
            }
        }
        if ledger.state.pool.len() < ledger.state.required_clean_passes as usize {
            return Err(DomainError::UndersizedPool {
                mode: ledger.state.mode.clone(),
                available: ledger.state.pool.len(),
                required: ledger.state.required_clean_passes,
            });
        }
        ledger.state.reopen(Some(config.max_iterations))?;

        tracing::info!(
            total_passes = ledger.state.total_passes,
            clean_pass_count = ledger.state.clean_pass_count,
            issues = ledger.issues.len(),
            "resuming convergence run"
        );

        let mut sampler = Sampler::from_seed_option(config.seed);
        Ok(self.drive(ledger, config, &mut sampler).await)
    }

    // -----------------------------------------------------------------------
    // Run loop
    // -----------------------------------------------------------------------

    async fn drive(&self, mut ledger: RunLedger, config: &RunConfig, sampler: &mut Sampler) -> ConvergenceResult {
        let started = Instant::now();
        let deadline = config.wall_clock_timeout_secs.map(Duration::from_secs);
        let executor = PassExecutor::new(Duration::from_millis(config.sub_check_timeout_ms));
        let mut remediation = RemediationLoop::new(
            self.fix_applier.clone(),
            self.loop_detector.clone(),
            config.remediation.clone(),
        );
        if let Some(store) = &self.knowledge {
            remediation = remediation.with_knowledge_store(store.clone());
        }

        while ledger.state.is_running() {
            if deadline.is_some_and(|limit| started.elapsed() >= limit) {
                tracing::warn!(
                    elapsed_secs = started.elapsed().as_secs(),
                    "wall-clock bound reached between passes"
                );
                ledger.state.expire_deadline();
                break;
            }

            if let Err(err) = self
                .run_pass(&mut ledger, config, sampler, &executor, &remediation)
                .await
            {
                tracing::error!(error = %err, "pass could not complete; aborting run");
                let reason = match err {
                    DomainError::Collaborator { .. } => TerminationReason::SubjectUnavailable {
                        detail: err.to_string(),
                    },
                    other => TerminationReason::InvariantViolated {
                        detail: other.to_string(),
                    },
                };
                ledger.state.abort(reason);
            }
        }

        self.finish(ledger, config).await
    }

    /// One full pass: sample, execute, apply, remediate, record, bound.
    async fn run_pass(
        &self,
        ledger: &mut RunLedger,
        config: &RunConfig,
        sampler: &mut Sampler,
        executor: &PassExecutor,
        remediation: &RemediationLoop,
    ) -> DomainResult<()> {
        let methodology_id = sampler.next(&ledger.state.pool, &ledger.state.used_in_sequence)?;
        let methodology = self
            .registry
            .get(&methodology_id)
            .ok_or_else(|| DomainError::UnknownMethodology(methodology_id.clone()))?;
        let run_id = ledger.state.run_id;
        let pass_number = ledger.state.next_pass_number();

        self.emit(ConvergenceEvent::PassStarted {
            run_id,
            pass_number,
            methodology: methodology_id.clone(),
            timestamp: Utc::now(),
        });

        let snapshot = self
            .subject
            .snapshot()
            .await
            .map_err(|err| DomainError::collaborator("subject", err.to_string()))?;
        let context = PassContext {
            pass_number,
            tier: config.executor_tier,
            fresh_context: config.clear_context_between_passes,
        };
        let result = executor.execute(methodology, &snapshot, context).await;
        ledger.counters.execution_errors += count_u32(result.issues.iter().filter(|i| i.is_execution_error()).count());

        let mut counted_clean = result.is_clean;
        let mut verification = None;
        if result.is_clean {
            if let Some(verifier) = &self.verifier {
                let claim = CleanPassClaim {
                    run_id,
                    pass_number,
                    methodology: methodology_id.clone(),
                    subject_revision: snapshot.revision,
                };
                let checked = verify_claim(verifier.as_ref(), &claim, config.evidence.min_confidence).await;
                if !checked.accepted {
                    tracing::warn!(
                        pass_number,
                        confidence = checked.confidence,
                        "clean pass rejected by evidence gate"
                    );
                    counted_clean = false;
                    ledger.counters.unverified_clean_passes += 1;
                }
                verification = Some(checked);
            }
        }

        let mut found = result.issues;
        self.attach_known_fixes(&mut found).await;

        ledger.state.apply_pass(&methodology_id, counted_clean)?;

        if !found.is_empty() {
            let report = remediation.process(&mut found, &self.subject.reference()).await;
            ledger.counters.loop_pivots += count_u32(report.pivoted.len());
            ledger.counters.strategy_switches += report.strategy_switches;
            for issue_id in &report.pivoted {
                let fix_attempts = found
                    .iter()
                    .find(|i| i.id == *issue_id)
                    .map_or(0, |i| i.fix_attempts);
                self.emit(ConvergenceEvent::IssuePivoted {
                    run_id,
                    issue_id: *issue_id,
                    fix_attempts,
                });
            }
            if let Some(issue_id) = report.escalated {
                ledger.state.escalate(issue_id);
            }
        }

        let issues_found = found.len();
        ledger.passes.push(PassRecord {
            pass_number,
            methodology: methodology_id.clone(),
            timestamp: Utc::now(),
            is_clean: counted_clean,
            issue_ids: found.iter().map(|i| i.id).collect(),
            tier: config.executor_tier,
            subject_revision: snapshot.revision,
            streak_after: ledger.state.clean_pass_count,
            verification,
        });
        ledger.issues.extend(found);

        tracing::info!(
            pass_number,
            methodology = %methodology_id,
            is_clean = counted_clean,
            issues_found,
            clean_pass_count = ledger.state.clean_pass_count,
            "pass complete"
        );
        self.emit(ConvergenceEvent::PassCompleted {
            run_id,
            pass_number,
            methodology: methodology_id,
            is_clean: counted_clean,
            issues_found,
            clean_pass_count: ledger.state.clean_pass_count,
            timestamp: Utc::now(),
        });

        ledger.context_tokens += result.context_tokens;
        ledger.state.enforce_iteration_bound();
        if ledger.state.is_running() {
            self.maybe_checkpoint(ledger, config).await;
        }
        if config.clear_context_between_passes {
            ledger.context_tokens = 0;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Edges: knowledge, checkpoints, termination
    // -----------------------------------------------------------------------

    async fn attach_known_fixes(&self, issues: &mut [Issue]) {
        let Some(store) = &self.knowledge else {
            return;
        };
        for issue in issues.iter_mut() {
            match store.suggest_fix(issue).await {
                Ok(suggestion) => issue.suggested_fix = suggestion,
                Err(err) => {
                    tracing::warn!(issue_id = %issue.id, error = %err, "knowledge lookup failed");
                }
            }
        }
    }

    /// Checkpoint at the inter-pass boundary when the chunker asks for it.
    async fn maybe_checkpoint(&self, ledger: &mut RunLedger, config: &RunConfig) {
        let Some(chunker) = &self.chunker else {
            return;
        };
        let usage = usage_percent(ledger.context_tokens, config.context.window_tokens);
        if !chunker.should_checkpoint(usage) {
            return;
        }
        if self.persist(chunker.as_ref(), ledger, usage).await {
            ledger.context_tokens = 0;
        }
    }

    async fn persist(&self, chunker: &dyn ContextChunker, ledger: &mut RunLedger, usage: f64) -> bool {
        let checkpoint = ledger.checkpoint();
        match chunker.persist(&checkpoint).await {
            Ok(location) => {
                ledger.counters.checkpoints += 1;
                tracing::info!(
                    after_pass = ledger.state.total_passes,
                    usage_percent = usage,
                    %location,
                    "checkpoint taken"
                );
                self.emit(ConvergenceEvent::CheckpointTaken {
                    run_id: ledger.state.run_id,
                    after_pass: ledger.state.total_passes,
                    context_usage_percent: usage,
                    location,
                });
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "checkpoint failed");
                false
            }
        }
    }

    async fn finish(&self, mut ledger: RunLedger, config: &RunConfig) -> ConvergenceResult {
        let run_id = ledger.state.run_id;
        let total_passes = ledger.state.total_passes;
        let reason = ledger
            .state
            .termination
            .clone()
            .unwrap_or(TerminationReason::MaxIterations);

        match ledger.state.status {
            ConvergenceStatus::Converged => {
                tracing::info!(total_passes, "converged");
                self.emit(ConvergenceEvent::Converged {
                    run_id,
                    total_passes,
                    timestamp: Utc::now(),
                });
            }
            status @ (ConvergenceStatus::Timeout | ConvergenceStatus::Aborted) => {
                if let Some(chunker) = self.chunker.clone() {
                    let usage = usage_percent(ledger.context_tokens, config.context.window_tokens);
                    self.persist(chunker.as_ref(), &mut ledger, usage).await;
                }
                tracing::warn!(%status, ?reason, total_passes, "run ended without convergence");
                let event = if status == ConvergenceStatus::Timeout {
                    ConvergenceEvent::Timeout {
                        run_id,
                        total_passes,
                        reason,
                        timestamp: Utc::now(),
                    }
                } else {
                    ConvergenceEvent::Aborted {
                        run_id,
                        total_passes,
                        reason,
                        timestamp: Utc::now(),
                    }
                };
                self.emit(event);
            }
            ConvergenceStatus::Running => {
                tracing::error!("run loop exited while still running");
            }
        }

        ledger.into_result()
    }

    fn emit(&self, event: ConvergenceEvent) {
        tracing::trace!(event = event.name(), "emitting convergence event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Reject run settings under which the engine could not terminate sensibly.
pub fn validate_run_config(config: &RunConfig) -> DomainResult<()> {
    if config.required_clean_passes == 0 {
        return Err(DomainError::InvalidConfig(
            "required_clean_passes must be at least 1".to_string(),
        ));
    }
    if config.max_iterations < config.required_clean_passes {
        return Err(DomainError::InvalidConfig(format!(
            "max_iterations ({}) is below required_clean_passes ({})",
            config.max_iterations, config.required_clean_passes
        )));
    }
    if config.remediation.max_fix_attempts == 0 {
        return Err(DomainError::InvalidConfig(
            "remediation.max_fix_attempts must be at least 1".to_string(),
        ));
    }
    if config.remediation.max_total_attempts < config.remediation.max_fix_attempts {
        return Err(DomainError::InvalidConfig(format!(
            "remediation.max_total_attempts ({}) is below remediation.max_fix_attempts ({})",
            config.remediation.max_total_attempts, config.remediation.max_fix_attempts
        )));
    }
    if config.sub_check_timeout_ms == 0 {
        return Err(DomainError::InvalidConfig(
            "sub_check_timeout_ms must be positive".to_string(),
        ));
    }
    Ok(())
}

async fn verify_claim(verifier: &dyn EvidenceVerifier, claim: &CleanPassClaim, min_confidence: f64) -> Verification {
    match verifier.verify(claim).await {
        Ok(evidence) => Verification {
            accepted: evidence.confidence >= min_confidence,
            confidence: evidence.confidence,
            proof_required: evidence.proof_required,
        },
        Err(err) => {
            tracing::warn!(pass_number = claim.pass_number, error = %err, "evidence verifier failed");
            Verification {
                confidence: 0.0,
                proof_required: true,
                accepted: false,
            }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn usage_percent(tokens: u64, window: u64) -> f64 {
    if window == 0 {
        return 100.0;
    }
    tokens as f64 / window as f64 * 100.0
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{MethodologyId, ReviewMode};
    use crate::domain::ports::Evidence;
    use async_trait::async_trait;
    use uuid::Uuid;

    struct FixedConfidence(Option<f64>);

    #[async_trait]
    impl EvidenceVerifier for FixedConfidence {
        async fn verify(&self, _claim: &CleanPassClaim) -> DomainResult<Evidence> {
            self.0
                .map(|confidence| Evidence {
                    confidence,
                    proof_required: false,
                })
                .ok_or_else(|| DomainError::collaborator("verifier", "offline"))
        }
    }

    fn claim() -> CleanPassClaim {
        CleanPassClaim {
            run_id: Uuid::nil(),
            pass_number: 3,
            methodology: MethodologyId::new("security"),
            subject_revision: 1,
        }
    }

    #[test]
    fn test_validate_run_config() {
        assert!(validate_run_config(&RunConfig::default()).is_ok());

        let zero_quorum = RunConfig {
            required_clean_passes: 0,
            ..RunConfig::default()
        };
        assert!(matches!(
            validate_run_config(&zero_quorum),
            Err(DomainError::InvalidConfig(_))
        ));

        let short_budget = RunConfig {
            required_clean_passes: 5,
            max_iterations: 4,
            ..RunConfig::for_mode(ReviewMode::PhaseReview)
        };
        assert!(validate_run_config(&short_budget).is_err());

        let mut no_timeout = RunConfig::default();
        no_timeout.sub_check_timeout_ms = 0;
        assert!(validate_run_config(&no_timeout).is_err());
    }

    #[test]
    fn test_validate_run_config_attempt_ceiling() {
        let mut below_round = RunConfig::default();
        below_round.remediation.max_fix_attempts = 3;
        below_round.remediation.max_total_attempts = 2;
        assert!(matches!(
            validate_run_config(&below_round),
            Err(DomainError::InvalidConfig(_))
        ));

        let mut zero_total = RunConfig::default();
        zero_total.remediation.max_total_attempts = 0;
        assert!(matches!(
            validate_run_config(&zero_total),
            Err(DomainError::InvalidConfig(_))
        ));

        let mut equal = RunConfig::default();
        equal.remediation.max_fix_attempts = 3;
        equal.remediation.max_total_attempts = 3;
        assert!(validate_run_config(&equal).is_ok());
    }

    #[test]
    fn test_usage_percent() {
        assert!((usage_percent(50_000, 200_000) - 25.0).abs() < f64::EPSILON);
        assert!((usage_percent(1, 0) - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_verify_claim_applies_threshold() {
        let accepted = verify_claim(&FixedConfidence(Some(0.9)), &claim(), 0.8).await;
        assert!(accepted.accepted);

        let rejected = verify_claim(&FixedConfidence(Some(0.5)), &claim(), 0.8).await;
        assert!(!rejected.accepted);
        assert!((rejected.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_verifier_failure_rejects_claim() {
        let verification = verify_claim(&FixedConfidence(None), &claim(), 0.0).await;
        assert!(!verification.accepted);
        assert!(verification.proof_required);
    }
}
