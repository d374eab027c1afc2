//! Issues reported by review passes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::MethodologyId;

/// Issue type used for sub-checks that crashed or timed out.
pub const EXECUTION_ERROR: &str = "ExecutionError";

/// How serious an issue is.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Remediation status of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    /// Not yet fixed; retried on failure.
    Open,
    /// Remediated successfully.
    Fixed,
    /// Given up on after a pivot. Stays in the log as unresolved.
    Abandoned,
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::Fixed => "fixed",
            Self::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

/// A raw problem reported by a sub-check, before the engine assigns it an
/// identity and attaches it to a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Free-form taxonomy tag, e.g. `"sql-injection"`.
    #[serde(rename = "type")]
    pub issue_type: String,
    #[serde(default)]
    pub severity: IssueSeverity,
    pub description: String,
    /// The part of the subject the finding touches (file, section). Fixes on
    /// the same resource are serialized.
    #[serde(default)]
    pub resource: Option<String>,
}

impl Finding {
    pub fn new(
        issue_type: impl Into<String>,
        severity: IssueSeverity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            issue_type: issue_type.into(),
            severity,
            description: description.into(),
            resource: None,
        }
    }

    #[must_use]
    pub fn on_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }
}

/// An issue in the run's issue log.
///
/// Created from a pass result; afterwards only the remediation loop mutates
/// it (attempt counter, status, strategy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub issue_type: String,
    pub severity: IssueSeverity,
    pub description: String,
    pub resource: Option<String>,
    /// Pass that discovered the issue.
    pub pass_number: u32,
    /// Methodology that discovered the issue.
    pub methodology: MethodologyId,
    pub fix_attempts: u32,
    pub status: IssueStatus,
    /// Fix suggested by the knowledge store at discovery time.
    pub suggested_fix: Option<String>,
    /// Alternate strategy handed out by the loop detector, if any.
    pub strategy: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

impl Issue {
    pub fn from_finding(finding: Finding, pass_number: u32, methodology: MethodologyId) -> Self {
        Self {
            id: Uuid::new_v4(),
            issue_type: finding.issue_type,
            severity: finding.severity,
            description: finding.description,
            resource: finding.resource,
            pass_number,
            methodology,
            fix_attempts: 0,
            status: IssueStatus::Open,
            suggested_fix: None,
            strategy: None,
            discovered_at: Utc::now(),
        }
    }

    /// Synthetic issue standing in for a sub-check that failed to run.
    pub fn execution_error(
        check_name: &str,
        message: impl fmt::Display,
        pass_number: u32,
        methodology: MethodologyId,
    ) -> Self {
        Self::from_finding(
            Finding::new(
                EXECUTION_ERROR,
                IssueSeverity::High,
                format!("sub-check '{check_name}' failed: {message}"),
            ),
            pass_number,
            methodology,
        )
    }

    pub fn is_execution_error(&self) -> bool {
        self.issue_type == EXECUTION_ERROR
    }

    pub fn is_open(&self) -> bool {
        self.status == IssueStatus::Open
    }

    /// Key used to serialize fixes touching the same part of the subject.
    /// Issues without a resource never contend with each other.
    pub fn lock_key(&self) -> String {
        self.resource
            .clone()
            .unwrap_or_else(|| format!("issue:{}", self.id))
    }
}
