//! Issue remediation loop.
//!
//! Drives fix attempts for the open issues of a pass. After
//! `max_fix_attempts` consecutive failures on an issue the loop detector
//! decides between another attempt with an alternate strategy, abandoning
//! the issue, or escalating the whole run. Issues on different resources are
//! remediated concurrently; issues on the same resource are serialized.

use std::sync::Arc;

use futures::future::join_all;
use uuid::Uuid;

use super::resource_locks::ResourceLocks;
use crate::domain::models::{Issue, IssueStatus, RemediationConfig};
use crate::domain::ports::{FixApplier, FixOutcome, KnowledgeStore, LoopDecision, LoopDetector};

/// How remediation of one issue ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueOutcome {
    Fixed,
    /// Abandoned; stays in the log as unresolved.
    Pivoted,
    /// Needs a human; the issue stays open.
    Escalated,
    /// Not open when remediation started.
    Skipped,
}

/// Summary of one remediation round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemediationReport {
    pub fixed: Vec<Uuid>,
    pub pivoted: Vec<Uuid>,
    /// First escalated issue, if any.
    pub escalated: Option<Uuid>,
    pub strategy_switches: u32,
}

impl RemediationReport {
    pub const fn is_escalated(&self) -> bool {
        self.escalated.is_some()
    }
}

pub struct RemediationLoop {
    fix_applier: Arc<dyn FixApplier>,
    loop_detector: Arc<dyn LoopDetector>,
    knowledge: Option<Arc<dyn KnowledgeStore>>,
    locks: ResourceLocks,
    config: RemediationConfig,
}

impl RemediationLoop {
    pub fn new(
        fix_applier: Arc<dyn FixApplier>,
        loop_detector: Arc<dyn LoopDetector>,
        config: RemediationConfig,
    ) -> Self {
        Self {
            fix_applier,
            loop_detector,
            knowledge: None,
            locks: ResourceLocks::new(),
            config,
        }
    }

    #[must_use]
    pub fn with_knowledge_store(mut self, store: Arc<dyn KnowledgeStore>) -> Self {
        self.knowledge = Some(store);
        self
    }

    /// Remediate every open issue in `issues`.
    ///
    /// Returns once all issues are fixed, abandoned or escalated, so the next
    /// pass always sees every fix from this one.
    pub async fn process(&self, issues: &mut [Issue], subject_reference: &str) -> RemediationReport {
        let outcomes = join_all(
            issues
                .iter_mut()
                .map(|issue| self.remediate(issue, subject_reference)),
        )
        .await;
        self.locks.prune();

        let mut report = RemediationReport::default();
        for (issue, (outcome, switches)) in issues.iter().zip(outcomes) {
            report.strategy_switches += switches;
            match outcome {
                IssueOutcome::Fixed => report.fixed.push(issue.id),
                IssueOutcome::Pivoted => report.pivoted.push(issue.id),
                IssueOutcome::Escalated => {
                    report.escalated.get_or_insert(issue.id);
                }
                IssueOutcome::Skipped => {}
            }
        }
        report
    }

    async fn remediate(&self, issue: &mut Issue, subject_reference: &str) -> (IssueOutcome, u32) {
        if !issue.is_open() {
            return (IssueOutcome::Skipped, 0);
        }
        let _guard = self.locks.acquire(&issue.lock_key()).await;

        let mut consecutive_failures = 0u32;
        let mut switches = 0u32;
        loop {
            if issue.fix_attempts >= self.config.max_total_attempts {
                tracing::warn!(
                    issue_id = %issue.id,
                    attempts = issue.fix_attempts,
                    "attempt ceiling reached; abandoning issue"
                );
                issue.status = IssueStatus::Abandoned;
                return (IssueOutcome::Pivoted, switches);
            }

            issue.fix_attempts += 1;
            match self.fix_applier.apply(issue, subject_reference).await {
                Ok(FixOutcome::Fixed { resolution }) => {
                    issue.status = IssueStatus::Fixed;
                    tracing::info!(
                        issue_id = %issue.id,
                        issue_type = %issue.issue_type,
                        attempts = issue.fix_attempts,
                        "issue fixed"
                    );
                    self.record_resolution(issue, &resolution).await;
                    return (IssueOutcome::Fixed, switches);
                }
                Ok(FixOutcome::Failed { reason }) => {
                    consecutive_failures += 1;
                    tracing::debug!(issue_id = %issue.id, attempt = issue.fix_attempts, %reason, "fix attempt failed");
                }
                Err(err) => {
                    consecutive_failures += 1;
                    tracing::warn!(issue_id = %issue.id, attempt = issue.fix_attempts, error = %err, "fix applier error");
                }
            }

            if consecutive_failures < self.config.max_fix_attempts {
                continue;
            }

            let decision = match self.loop_detector.decide(issue.id, consecutive_failures).await {
                Ok(decision) => decision,
                Err(err) => {
                    tracing::error!(issue_id = %issue.id, error = %err, "loop detector failed; escalating");
                    LoopDecision::Escalate
                }
            };
            match decision {
                LoopDecision::Continue { alternate_strategy } => {
                    tracing::info!(issue_id = %issue.id, strategy = %alternate_strategy, "retrying with alternate strategy");
                    issue.strategy = Some(alternate_strategy);
                    switches += 1;
                }
                LoopDecision::Pivot => {
                    tracing::warn!(issue_id = %issue.id, failures = consecutive_failures, "pivoting away from issue");
                    issue.status = IssueStatus::Abandoned;
                    return (IssueOutcome::Pivoted, switches);
                }
                LoopDecision::Escalate => {
                    tracing::error!(issue_id = %issue.id, failures = consecutive_failures, "issue escalated");
                    return (IssueOutcome::Escalated, switches);
                }
            }
        }
    }

    async fn record_resolution(&self, issue: &Issue, resolution: &str) {
        if let Some(store) = &self.knowledge {
            if let Err(err) = store.record(issue, resolution).await {
                tracing::warn!(issue_id = %issue.id, error = %err, "failed to record resolution");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::domain::errors::DomainResult;
    use crate::domain::models::{Finding, IssueSeverity, MethodologyId};

    /// Fails an issue (by description) the given number of times, then fixes it.
    struct CountingApplier {
        failures_before_fix: HashMap<String, u32>,
        seen: Mutex<Vec<Option<String>>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl CountingApplier {
        fn new(failures: &[(&str, u32)]) -> Self {
            Self {
                failures_before_fix: failures.iter().map(|(d, n)| ((*d).to_string(), *n)).collect(),
                seen: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FixApplier for CountingApplier {
        async fn apply(&self, issue: &Issue, _subject: &str) -> DomainResult<FixOutcome> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.seen.lock().unwrap().push(issue.strategy.clone());
            let needed = self.failures_before_fix.get(&issue.description).copied().unwrap_or(0);
            if issue.fix_attempts > needed {
                Ok(FixOutcome::Fixed {
                    resolution: "patched".to_string(),
                })
            } else {
                Ok(FixOutcome::Failed {
                    reason: "still broken".to_string(),
                })
            }
        }
    }

    struct FixedDecision(LoopDecision);

    #[async_trait]
    impl LoopDetector for FixedDecision {
        async fn decide(&self, _issue_id: Uuid, _failures: u32) -> DomainResult<LoopDecision> {
            Ok(self.0.clone())
        }
    }

    fn issue(description: &str, resource: Option<&str>) -> Issue {
        let mut finding = Finding::new("bug", IssueSeverity::Medium, description);
        finding.resource = resource.map(str::to_string);
        Issue::from_finding(finding, 1, MethodologyId::new("m"))
    }

    fn remediation(applier: Arc<CountingApplier>, decision: LoopDecision) -> RemediationLoop {
        RemediationLoop::new(applier, Arc::new(FixedDecision(decision)), RemediationConfig::default())
    }

    #[tokio::test]
    async fn test_fix_on_first_attempt() {
        let applier = Arc::new(CountingApplier::new(&[]));
        let mut issues = vec![issue("a", None)];
        let report = remediation(applier, LoopDecision::Pivot).process(&mut issues, "repo").await;
        assert_eq!(report.fixed.len(), 1);
        assert_eq!(issues[0].status, IssueStatus::Fixed);
        assert_eq!(issues[0].fix_attempts, 1);
    }

    #[tokio::test]
    async fn test_retries_before_consulting_detector() {
        let applier = Arc::new(CountingApplier::new(&[("a", 2)]));
        let mut issues = vec![issue("a", None)];
        let report = remediation(applier, LoopDecision::Escalate).process(&mut issues, "repo").await;
        assert_eq!(issues[0].status, IssueStatus::Fixed);
        assert_eq!(issues[0].fix_attempts, 3);
        assert!(!report.is_escalated());
    }

    #[tokio::test]
    async fn test_escalate_after_three_failures_leaves_issue_open() {
        let applier = Arc::new(CountingApplier::new(&[("a", 100)]));
        let mut issues = vec![issue("a", None)];
        let report = remediation(applier, LoopDecision::Escalate).process(&mut issues, "repo").await;
        assert_eq!(report.escalated, Some(issues[0].id));
        assert_eq!(issues[0].status, IssueStatus::Open);
        assert_eq!(issues[0].fix_attempts, 3);
    }

    #[tokio::test]
    async fn test_pivot_abandons_issue() {
        let applier = Arc::new(CountingApplier::new(&[("a", 100)]));
        let mut issues = vec![issue("a", None)];
        let report = remediation(applier, LoopDecision::Pivot).process(&mut issues, "repo").await;
        assert_eq!(report.pivoted, vec![issues[0].id]);
        assert_eq!(issues[0].status, IssueStatus::Abandoned);
    }

    #[tokio::test]
    async fn test_continue_uses_alternate_strategy() {
        let applier = Arc::new(CountingApplier::new(&[("a", 3)]));
        let mut issues = vec![issue("a", None)];
        let report = remediation(
            applier.clone(),
            LoopDecision::Continue {
                alternate_strategy: "rewrite module".to_string(),
            },
        )
        .process(&mut issues, "repo")
        .await;
        assert_eq!(issues[0].status, IssueStatus::Fixed);
        assert_eq!(issues[0].fix_attempts, 4);
        assert_eq!(report.strategy_switches, 1);
        let seen = applier.seen.lock().unwrap();
        assert_eq!(seen.last().unwrap().as_deref(), Some("rewrite module"));
    }

    #[tokio::test]
    async fn test_attempt_ceiling_pivots_endless_continue() {
        let applier = Arc::new(CountingApplier::new(&[("a", 100)]));
        let mut issues = vec![issue("a", None)];
        let report = remediation(
            applier,
            LoopDecision::Continue {
                alternate_strategy: "again".to_string(),
            },
        )
        .process(&mut issues, "repo")
        .await;
        assert_eq!(issues[0].status, IssueStatus::Abandoned);
        assert_eq!(issues[0].fix_attempts, RemediationConfig::default().max_total_attempts);
        assert_eq!(report.pivoted.len(), 1);
    }

    #[tokio::test]
    async fn test_same_resource_fixes_are_serialized() {
        let applier = Arc::new(CountingApplier::new(&[]));
        let mut issues = vec![
            issue("a", Some("src/lib.rs")),
            issue("b", Some("src/lib.rs")),
            issue("c", Some("src/lib.rs")),
        ];
        remediation(applier.clone(), LoopDecision::Pivot)
            .process(&mut issues, "repo")
            .await;
        assert_eq!(applier.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(issues.iter().all(|i| i.status == IssueStatus::Fixed));
    }

    #[tokio::test]
    async fn test_disjoint_resources_run_concurrently() {
        let applier = Arc::new(CountingApplier::new(&[]));
        let mut issues = vec![issue("a", Some("a.rs")), issue("b", Some("b.rs"))];
        remediation(applier.clone(), LoopDecision::Pivot)
            .process(&mut issues, "repo")
            .await;
        assert_eq!(applier.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_open_issues_are_skipped() {
        let applier = Arc::new(CountingApplier::new(&[]));
        let mut done = issue("a", None);
        done.status = IssueStatus::Fixed;
        let mut issues = vec![done];
        let report = remediation(applier.clone(), LoopDecision::Pivot)
            .process(&mut issues, "repo")
            .await;
        assert!(report.fixed.is_empty());
        assert!(applier.seen.lock().unwrap().is_empty());
    }
}
