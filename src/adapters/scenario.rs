//! Scripted scenarios.
//!
//! A scenario is a YAML document describing a subject and how every
//! collaborator behaves against it: which findings each methodology reports
//! on its n-th invocation, how many attempts each issue type needs before a
//! fix lands, what the loop detector answers and how confident the evidence
//! verifier is. It drives the CLI and the integration tests.
//!
//! ```yaml
//! subject:
//!   reference: payments-service
//!   artifacts:
//!     src/db.rs: "query(format!(...))"
//! methodologies:
//!   security:
//!     passes:
//!       - findings:
//!           - type: sql-injection
//!             severity: high
//!             description: string-built query
//!             resource: src/db.rs
//! fixes:
//!   failures:
//!     sql-injection: 1
//! ```

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::loop_detector::{ThresholdLoopDetector, WhenExhausted};
use super::memory_subject::InMemorySubject;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    builtin_catalog, Finding, Issue, Methodology, MethodologyDescriptor, MethodologyId,
    PassContext, ReviewMode, SubjectSnapshot,
};
use crate::domain::ports::{
    CleanPassClaim, Evidence, EvidenceVerifier, FixApplier, FixOutcome, MethodologyExecutor,
    SubCheck, SubCheckReport,
};
use crate::services::MethodologyRegistry;

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Scenario {
    pub subject: SubjectScript,

    /// Scripts keyed by methodology id. Registered methodologies without a
    /// script always come back clean.
    #[serde(default)]
    pub methodologies: BTreeMap<MethodologyId, MethodologyScript>,

    #[serde(default)]
    pub fixes: FixScript,

    #[serde(default)]
    pub loop_detector: LoopScript,

    /// Evidence gate behavior; no verifier is wired when absent.
    #[serde(default)]
    pub evidence: Option<EvidenceScript>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectScript {
    pub reference: String,
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodologyScript {
    /// Focus for methodologies outside the built-in catalog.
    #[serde(default)]
    pub focus: Option<String>,

    /// Outcome of the 1st, 2nd, ... invocation. Once exhausted, the
    /// methodology reports clean.
    #[serde(default)]
    pub passes: Vec<ScriptedPass>,

    /// Context tokens consumed by a pass that does not set its own.
    #[serde(default)]
    pub tokens_per_pass: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedPass {
    #[serde(default)]
    pub findings: Vec<Finding>,

    /// Make the sub-check fail with this message instead of reporting.
    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub tokens: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixScript {
    /// Failed attempts before a fix lands, for types not listed below.
    #[serde(default)]
    pub default_failures: u32,

    /// Failed attempts before a fix lands, by issue type.
    #[serde(default)]
    pub failures: BTreeMap<String, u32>,

    /// Issue types no attempt can fix.
    #[serde(default)]
    pub unfixable: BTreeSet<String>,
}

impl FixScript {
    fn failures_for(&self, issue_type: &str) -> Option<u32> {
        if self.unfixable.contains(issue_type) {
            return None;
        }
        Some(
            self.failures
                .get(issue_type)
                .copied()
                .unwrap_or(self.default_failures),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopScript {
    #[serde(default)]
    pub alternates: Vec<String>,
    #[serde(default)]
    pub when_exhausted: WhenExhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceScript {
    #[serde(default = "default_confidence")]
    pub default_confidence: f64,
    #[serde(default)]
    pub confidence: BTreeMap<MethodologyId, f64>,
    #[serde(default)]
    pub proof_required: bool,
}

const fn default_confidence() -> f64 {
    1.0
}

impl Scenario {
    pub fn from_yaml(yaml: &str) -> DomainResult<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|err| DomainError::Serialization(format!("invalid scenario: {err}")))
    }

    pub async fn from_file(path: impl AsRef<Path>) -> DomainResult<Self> {
        let path = path.as_ref();
        let yaml = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| DomainError::Io(format!("failed to read {}: {err}", path.display())))?;
        Self::from_yaml(&yaml)
    }

    pub fn subject(&self) -> Arc<InMemorySubject> {
        Arc::new(InMemorySubject::new(
            self.subject.reference.clone(),
            self.subject.artifacts.clone(),
        ))
    }

    /// Registry for `mode`: the built-in catalog plus any scripted
    /// methodology the catalog lacks, registered under `mode`.
    pub fn registry(&self, mode: &ReviewMode) -> DomainResult<MethodologyRegistry> {
        let mut registry =
            MethodologyRegistry::with_builtin(mode, |descriptor| self.executor_for(&descriptor.id))?;

        let catalog: BTreeSet<MethodologyId> =
            builtin_catalog(mode).into_iter().map(|d| d.id).collect();
        for (id, script) in &self.methodologies {
            if catalog.contains(id) {
                continue;
            }
            let focus = script
                .focus
                .clone()
                .unwrap_or_else(|| format!("scripted {id} review"));
            let descriptor = MethodologyDescriptor::new(id.clone(), focus, mode.clone());
            registry.register(Methodology::new(descriptor, self.executor_for(id)))?;
        }
        Ok(registry)
    }

    pub fn executor_for(&self, id: &MethodologyId) -> Arc<dyn MethodologyExecutor> {
        let script = self.methodologies.get(id).cloned().unwrap_or_default();
        Arc::new(ScriptedMethodology::new(id.as_str(), script))
    }

    /// Fix applier writing successful fixes back into `subject`.
    pub fn fix_applier(&self, subject: Arc<InMemorySubject>) -> Arc<ScriptedFixApplier> {
        Arc::new(ScriptedFixApplier::new(self.fixes.clone()).writing_to(subject))
    }

    pub fn loop_detector(&self, max_fix_attempts: u32) -> Arc<ThresholdLoopDetector> {
        Arc::new(ThresholdLoopDetector::new(
            max_fix_attempts,
            self.loop_detector.alternates.clone(),
            self.loop_detector.when_exhausted,
        ))
    }

    pub fn verifier(&self) -> Option<Arc<ScriptedVerifier>> {
        self.evidence
            .clone()
            .map(|script| Arc::new(ScriptedVerifier::new(script)))
    }
}

// ---------------------------------------------------------------------------
// Methodology executor
// ---------------------------------------------------------------------------

/// Methodology with a single scripted sub-check.
#[derive(Debug)]
pub struct ScriptedMethodology {
    check: Arc<ScriptedCheck>,
}

impl ScriptedMethodology {
    pub fn new(name: impl Into<String>, script: MethodologyScript) -> Self {
        Self {
            check: Arc::new(ScriptedCheck {
                name: name.into(),
                tokens_per_pass: script.tokens_per_pass,
                remaining: Mutex::new(script.passes.into()),
            }),
        }
    }
}

impl MethodologyExecutor for ScriptedMethodology {
    fn sub_checks(&self) -> Vec<Arc<dyn SubCheck>> {
        vec![self.check.clone()]
    }
}

#[derive(Debug)]
struct ScriptedCheck {
    name: String,
    tokens_per_pass: u64,
    remaining: Mutex<VecDeque<ScriptedPass>>,
}

#[async_trait]
impl SubCheck for ScriptedCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(
        &self,
        _snapshot: &SubjectSnapshot,
        _context: &PassContext,
    ) -> DomainResult<SubCheckReport> {
        let next = self.remaining.lock().await.pop_front().unwrap_or_default();
        if let Some(message) = next.error {
            return Err(DomainError::collaborator("sub-check", message));
        }
        let tokens = next.tokens.unwrap_or(self.tokens_per_pass);
        Ok(SubCheckReport::with_findings(next.findings).consuming(tokens))
    }
}

// ---------------------------------------------------------------------------
// Fix applier
// ---------------------------------------------------------------------------

/// Fails each issue a scripted number of times, then fixes it.
///
/// Relies on the attempt counter the remediation loop maintains on the
/// issue, so the applier itself keeps no per-issue state.
#[derive(Debug)]
pub struct ScriptedFixApplier {
    script: FixScript,
    subject: Option<Arc<InMemorySubject>>,
}

impl ScriptedFixApplier {
    pub fn new(script: FixScript) -> Self {
        Self {
            script,
            subject: None,
        }
    }

    #[must_use]
    pub fn writing_to(mut self, subject: Arc<InMemorySubject>) -> Self {
        self.subject = Some(subject);
        self
    }
}

#[async_trait]
impl FixApplier for ScriptedFixApplier {
    async fn apply(&self, issue: &Issue, subject_reference: &str) -> DomainResult<FixOutcome> {
        let Some(failures) = self.script.failures_for(&issue.issue_type) else {
            return Ok(FixOutcome::Failed {
                reason: format!("{} cannot be fixed in {subject_reference}", issue.issue_type),
            });
        };
        if issue.fix_attempts <= failures {
            return Ok(FixOutcome::Failed {
                reason: format!("attempt {} did not hold", issue.fix_attempts),
            });
        }

        let strategy = issue.strategy.as_deref().unwrap_or("direct");
        let resolution = issue
            .suggested_fix
            .clone()
            .unwrap_or_else(|| format!("{strategy} fix for {}", issue.issue_type));
        if let (Some(subject), Some(resource)) = (&self.subject, &issue.resource) {
            subject.put(resource.clone(), resolution.clone()).await;
        }
        Ok(FixOutcome::Fixed { resolution })
    }
}

// ---------------------------------------------------------------------------
// Evidence verifier
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ScriptedVerifier {
    script: EvidenceScript,
}

impl ScriptedVerifier {
    pub fn new(script: EvidenceScript) -> Self {
        Self { script }
    }
}

#[async_trait]
impl EvidenceVerifier for ScriptedVerifier {
    async fn verify(&self, claim: &CleanPassClaim) -> DomainResult<Evidence> {
        let confidence = self
            .script
            .confidence
            .get(&claim.methodology)
            .copied()
            .unwrap_or(self.script.default_confidence);
        Ok(Evidence {
            confidence,
            proof_required: self.script.proof_required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ExecutorTier, IssueSeverity};
    use crate::domain::ports::Subject;

    const SCENARIO: &str = r#"
subject:
  reference: payments-service
  artifacts:
    src/db.rs: "query(format!(...))"
methodologies:
  security:
    tokens_per_pass: 100
    passes:
      - findings:
          - type: sql-injection
            severity: high
            description: string-built query
            resource: src/db.rs
      - error: scanner crashed
  fuzzing:
    focus: randomized inputs
fixes:
  failures:
    sql-injection: 1
  unfixable: [flaky-test]
evidence:
  default_confidence: 0.9
  confidence:
    security: 0.2
"#;

    fn context() -> PassContext {
        PassContext {
            pass_number: 1,
            tier: ExecutorTier::Standard,
            fresh_context: false,
        }
    }

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::from_yaml(SCENARIO).unwrap();
        assert_eq!(scenario.subject.reference, "payments-service");
        assert_eq!(scenario.methodologies.len(), 2);
        assert_eq!(scenario.fixes.failures_for("sql-injection"), Some(1));
        assert_eq!(scenario.fixes.failures_for("flaky-test"), None);
        assert_eq!(scenario.fixes.failures_for("other"), Some(0));
        assert!(scenario.verifier().is_some());
    }

    #[test]
    fn test_omitted_sections_take_defaults() {
        let scenario = Scenario::from_yaml("subject:\n  reference: bare\n").unwrap();
        assert_eq!(scenario.loop_detector, LoopScript::default());
        assert_eq!(scenario.loop_detector.when_exhausted, WhenExhausted::Pivot);
        assert!(scenario.loop_detector.alternates.is_empty());
        assert!(scenario.methodologies.is_empty());
        assert!(scenario.verifier().is_none());
        assert_eq!(ExecutorTier::default(), ExecutorTier::Standard);
        assert_eq!(IssueSeverity::default(), IssueSeverity::Medium);
    }

    #[test]
    fn test_invalid_yaml_is_serialization_error() {
        let err = Scenario::from_yaml("subject: [").unwrap_err();
        assert!(matches!(err, DomainError::Serialization(_)));
    }

    #[test]
    fn test_registry_adds_scripted_methodologies_to_catalog() {
        let scenario = Scenario::from_yaml(SCENARIO).unwrap();
        let registry = scenario.registry(&ReviewMode::Audit).unwrap();
        // 7 built-in audit methodologies plus the scripted `fuzzing`.
        assert_eq!(registry.len(), 8);
        let fuzzing = registry.get(&MethodologyId::new("fuzzing")).unwrap();
        assert_eq!(fuzzing.focus(), "randomized inputs");
    }

    #[tokio::test]
    async fn test_scripted_check_replays_passes_then_goes_clean() {
        let scenario = Scenario::from_yaml(SCENARIO).unwrap();
        let subject = scenario.subject();
        let snapshot = subject.snapshot().await.unwrap();
        let executor = scenario.executor_for(&MethodologyId::new("security"));
        let check = executor.sub_checks().remove(0);

        let first = check.check(&snapshot, &context()).await.unwrap();
        assert_eq!(first.findings.len(), 1);
        assert_eq!(first.findings[0].severity, IssueSeverity::High);
        assert_eq!(first.context_tokens, 100);

        assert!(check.check(&snapshot, &context()).await.is_err());

        let third = check.check(&snapshot, &context()).await.unwrap();
        assert!(third.findings.is_empty());
    }

    #[tokio::test]
    async fn test_fix_applier_fails_then_fixes_and_writes_back() {
        let scenario = Scenario::from_yaml(SCENARIO).unwrap();
        let subject = scenario.subject();
        let applier = scenario.fix_applier(subject.clone());
        let mut issue = Issue::from_finding(
            Finding::new("sql-injection", IssueSeverity::High, "string-built query")
                .on_resource("src/db.rs"),
            1,
            MethodologyId::new("security"),
        );
        let revision = subject.revision().await;

        issue.fix_attempts = 1;
        assert!(!applier.apply(&issue, "payments-service").await.unwrap().is_fixed());

        issue.fix_attempts = 2;
        assert!(applier.apply(&issue, "payments-service").await.unwrap().is_fixed());
        assert_eq!(subject.revision().await, revision + 1);
    }

    #[tokio::test]
    async fn test_verifier_confidence_by_methodology() {
        let scenario = Scenario::from_yaml(SCENARIO).unwrap();
        let verifier = scenario.verifier().unwrap();
        let claim = |id: &str| CleanPassClaim {
            run_id: uuid::Uuid::nil(),
            pass_number: 1,
            methodology: MethodologyId::new(id),
            subject_revision: 1,
        };
        assert!((verifier.verify(&claim("security")).await.unwrap().confidence - 0.2).abs() < f64::EPSILON);
        assert!((verifier.verify(&claim("architecture")).await.unwrap().confidence - 0.9).abs() < f64::EPSILON);
    }
}
