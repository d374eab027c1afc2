//! Pass executor.
//!
//! Runs one methodology against a subject snapshot. The methodology's
//! sub-checks are fanned out concurrently and fanned back in:
//! `is_clean = all sub-checks clean`, `issues = union of sub-check issues`.
//! A sub-check that errors, panics or times out contributes a single
//! synthetic `ExecutionError` issue instead of failing the pass.

use std::time::{Duration, Instant};

use futures::future::join_all;

use crate::domain::models::{Issue, Methodology, PassContext, PassResult, SubjectSnapshot};

/// Executes passes with a per-sub-check timeout.
#[derive(Debug, Clone)]
pub struct PassExecutor {
    sub_check_timeout: Duration,
}

impl PassExecutor {
    pub const fn new(sub_check_timeout: Duration) -> Self {
        Self { sub_check_timeout }
    }

    /// Run every sub-check of `methodology` against `snapshot`.
    ///
    /// Purely observational: the subject is never touched.
    pub async fn execute(
        &self,
        methodology: &Methodology,
        snapshot: &SubjectSnapshot,
        context: PassContext,
    ) -> PassResult {
        let checks = methodology.executor.sub_checks();
        let started = Instant::now();

        let handles = checks.iter().map(|check| {
            let check = check.clone();
            let snapshot = snapshot.clone();
            let limit = self.sub_check_timeout;
            tokio::spawn(async move {
                tokio::time::timeout(limit, check.check(&snapshot, &context)).await
            })
        });
        let joined = join_all(handles).await;

        let mut result = PassResult::with_issues(Vec::new());
        for (check, outcome) in checks.iter().zip(joined) {
            let name = check.name().to_string();
            match outcome {
                Ok(Ok(Ok(report))) => {
                    tracing::debug!(
                        methodology = %methodology.id(),
                        sub_check = %name,
                        findings = report.findings.len(),
                        context_tokens = report.context_tokens,
                        "sub-check complete"
                    );
                    result.context_tokens += report.context_tokens;
                    result.issues.extend(report.findings.into_iter().map(|finding| {
                        Issue::from_finding(finding, context.pass_number, methodology.id().clone())
                    }));
                }
                Ok(Ok(Err(err))) => {
                    tracing::warn!(sub_check = %name, error = %err, "sub-check failed");
                    result.issues.push(Issue::execution_error(
                        &name,
                        err,
                        context.pass_number,
                        methodology.id().clone(),
                    ));
                }
                Ok(Err(_elapsed)) => {
                    tracing::warn!(
                        sub_check = %name,
                        timeout_ms = self.sub_check_timeout.as_millis() as u64,
                        "sub-check timed out"
                    );
                    result.issues.push(Issue::execution_error(
                        &name,
                        format!("timed out after {}ms", self.sub_check_timeout.as_millis()),
                        context.pass_number,
                        methodology.id().clone(),
                    ));
                }
                Err(join_err) => {
                    tracing::warn!(sub_check = %name, error = %join_err, "sub-check panicked");
                    result.issues.push(Issue::execution_error(
                        &name,
                        join_err,
                        context.pass_number,
                        methodology.id().clone(),
                    ));
                }
            }
            result.sub_checks.push(name);
        }

        result.is_clean = result.issues.is_empty();
        tracing::debug!(
            methodology = %methodology.id(),
            sub_checks = result.sub_checks.len(),
            issues = result.issues.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pass executed"
        );
        result
    }
}

impl Default for PassExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::domain::errors::{DomainError, DomainResult};
    use crate::domain::models::{ExecutorTier, Finding, IssueSeverity, MethodologyDescriptor, ReviewMode};
    use crate::domain::ports::{MethodologyExecutor, SubCheck, SubCheckReport};

    enum Behavior {
        Clean,
        Finds(usize),
        Fails,
        Panics,
        Hangs,
    }

    struct FakeCheck {
        name: String,
        behavior: Behavior,
    }

    #[async_trait]
    impl SubCheck for FakeCheck {
        fn name(&self) -> &str {
            &self.name
        }

        async fn check(&self, snapshot: &SubjectSnapshot, _context: &PassContext) -> DomainResult<SubCheckReport> {
            match self.behavior {
                Behavior::Clean => Ok(SubCheckReport::clean().consuming(100)),
                Behavior::Finds(n) => Ok(SubCheckReport::with_findings(
                    (0..n)
                        .map(|i| Finding::new("smell", IssueSeverity::Low, format!("{} #{i}", snapshot.reference)))
                        .collect(),
                )
                .consuming(50)),
                Behavior::Fails => Err(DomainError::collaborator("checklist", "crashed")),
                Behavior::Panics => panic!("checklist bug"),
                Behavior::Hangs => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(SubCheckReport::clean())
                }
            }
        }
    }

    struct FakeExecutor(Vec<Arc<dyn SubCheck>>);

    impl MethodologyExecutor for FakeExecutor {
        fn sub_checks(&self) -> Vec<Arc<dyn SubCheck>> {
            self.0.clone()
        }
    }

    fn methodology(behaviors: Vec<Behavior>) -> Methodology {
        let checks = behaviors
            .into_iter()
            .enumerate()
            .map(|(i, behavior)| {
                Arc::new(FakeCheck {
                    name: format!("check-{i}"),
                    behavior,
                }) as Arc<dyn SubCheck>
            })
            .collect();
        Methodology::new(
            MethodologyDescriptor::new("m", "test", ReviewMode::Audit),
            Arc::new(FakeExecutor(checks)),
        )
    }

    fn snapshot() -> SubjectSnapshot {
        SubjectSnapshot::new("repo", 1, BTreeMap::new())
    }

    fn context() -> PassContext {
        PassContext {
            pass_number: 2,
            tier: ExecutorTier::Standard,
            fresh_context: false,
        }
    }

    #[tokio::test]
    async fn test_all_clean_sub_checks_give_clean_pass() {
        let executor = PassExecutor::default();
        let result = executor
            .execute(&methodology(vec![Behavior::Clean, Behavior::Clean]), &snapshot(), context())
            .await;
        assert!(result.is_clean);
        assert_eq!(result.context_tokens, 200);
        assert_eq!(result.sub_checks, vec!["check-0", "check-1"]);
    }

    #[tokio::test]
    async fn test_issues_are_unioned() {
        let executor = PassExecutor::default();
        let result = executor
            .execute(
                &methodology(vec![Behavior::Finds(2), Behavior::Clean, Behavior::Finds(1)]),
                &snapshot(),
                context(),
            )
            .await;
        assert!(!result.is_clean);
        assert_eq!(result.issues.len(), 3);
        assert!(result.issues.iter().all(|i| i.pass_number == 2));
    }

    #[tokio::test]
    async fn test_failed_sub_check_becomes_execution_error() {
        let executor = PassExecutor::default();
        let result = executor
            .execute(&methodology(vec![Behavior::Fails, Behavior::Clean]), &snapshot(), context())
            .await;
        assert!(!result.is_clean);
        assert_eq!(result.issues.len(), 1);
        assert!(result.issues[0].is_execution_error());
    }

    #[tokio::test]
    async fn test_panicking_sub_check_becomes_execution_error() {
        let executor = PassExecutor::default();
        let result = executor
            .execute(&methodology(vec![Behavior::Panics, Behavior::Finds(1)]), &snapshot(), context())
            .await;
        assert_eq!(result.issues.len(), 2);
        assert_eq!(result.issues.iter().filter(|i| i.is_execution_error()).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_sub_check_becomes_execution_error() {
        let executor = PassExecutor::new(Duration::from_millis(50));
        let result = executor
            .execute(&methodology(vec![Behavior::Hangs]), &snapshot(), context())
            .await;
        assert_eq!(result.issues.len(), 1);
        assert!(result.issues[0].description.contains("timed out"));
    }

    #[tokio::test]
    async fn test_methodology_without_sub_checks_is_clean() {
        let result = PassExecutor::default()
            .execute(&methodology(vec![]), &snapshot(), context())
            .await;
        assert!(result.is_clean);
    }
}
