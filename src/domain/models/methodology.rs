//! Methodologies and review modes.
//!
//! A methodology is one independent review technique with a declared focus.
//! Methodologies are grouped into modes; the set registered for a mode is the
//! pool the sampler draws from during a run.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::ports::MethodologyExecutor;

// ---------------------------------------------------------------------------
// MethodologyId
// ---------------------------------------------------------------------------

/// Stable identifier of a methodology, e.g. `"security"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodologyId(String);

impl MethodologyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MethodologyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MethodologyId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MethodologyId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ---------------------------------------------------------------------------
// ReviewMode
// ---------------------------------------------------------------------------

/// The kind of review a run performs. Determines which pool is used.
///
/// Serialized as `audit`, `phase-review` or `custom:<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ReviewMode {
    /// Code/deliverable audit (7 built-in methodologies).
    Audit,
    /// Review of a completed project phase (8 built-in methodologies).
    PhaseReview,
    /// Caller-defined mode populated purely by registration.
    Custom(String),
}

impl fmt::Display for ReviewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audit => f.write_str("audit"),
            Self::PhaseReview => f.write_str("phase-review"),
            Self::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

impl FromStr for ReviewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "audit" => Ok(Self::Audit),
            "phase-review" | "phase_review" => Ok(Self::PhaseReview),
            other => match other.strip_prefix("custom:") {
                Some(name) if !name.is_empty() => Ok(Self::Custom(name.to_string())),
                _ => Err(format!(
                    "unknown review mode '{other}' (expected audit, phase-review or custom:<name>)"
                )),
            },
        }
    }
}

impl TryFrom<String> for ReviewMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReviewMode> for String {
    fn from(mode: ReviewMode) -> Self {
        mode.to_string()
    }
}

// ---------------------------------------------------------------------------
// Methodology
// ---------------------------------------------------------------------------

/// Serializable description of a methodology, without its executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodologyDescriptor {
    pub id: MethodologyId,
    /// Human-readable focus/direction, e.g. "requirements→deliverables completeness".
    pub focus: String,
    /// Modes whose pool this methodology belongs to.
    pub modes: BTreeSet<ReviewMode>,
}

impl MethodologyDescriptor {
    pub fn new(id: impl Into<MethodologyId>, focus: impl Into<String>, mode: ReviewMode) -> Self {
        Self {
            id: id.into(),
            focus: focus.into(),
            modes: BTreeSet::from([mode]),
        }
    }

    /// Also include this methodology in the pool of `mode`.
    #[must_use]
    pub fn with_mode(mut self, mode: ReviewMode) -> Self {
        self.modes.insert(mode);
        self
    }
}

/// A registered methodology: its descriptor plus the executor capability
/// that applies it to a subject snapshot. Immutable once registered.
#[derive(Clone)]
pub struct Methodology {
    pub descriptor: MethodologyDescriptor,
    pub executor: Arc<dyn MethodologyExecutor>,
}

impl Methodology {
    pub fn new(descriptor: MethodologyDescriptor, executor: Arc<dyn MethodologyExecutor>) -> Self {
        Self {
            descriptor,
            executor,
        }
    }

    pub fn id(&self) -> &MethodologyId {
        &self.descriptor.id
    }

    pub fn focus(&self) -> &str {
        &self.descriptor.focus
    }
}

impl fmt::Debug for Methodology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Methodology")
            .field("id", &self.descriptor.id)
            .field("focus", &self.descriptor.focus)
            .field("modes", &self.descriptor.modes)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Built-in catalog
// ---------------------------------------------------------------------------

const AUDIT_CATALOG: [(&str, &str); 7] = [
    ("security", "attack surface, secrets handling and input validation"),
    ("correctness", "logic errors, edge cases and error propagation"),
    ("architecture", "module boundaries, coupling and layering"),
    ("performance", "hot paths, allocation and blocking calls"),
    ("accessibility", "keyboard, contrast and assistive-technology support"),
    ("maintainability", "duplication, naming and dead code"),
    ("documentation", "public API docs, examples and changelog accuracy"),
];

const PHASE_REVIEW_CATALOG: [(&str, &str); 8] = [
    ("requirements-forward", "requirements→deliverables completeness"),
    ("deliverables-backward", "deliverables→requirements traceability"),
    ("integration", "cross-component contracts and data flow"),
    ("edge-cases", "boundary inputs, failure paths and recovery"),
    ("consistency", "naming, conventions and duplicated decisions"),
    ("dependencies", "external dependencies, versions and licensing"),
    ("regression", "previously working behavior still holds"),
    ("fresh-eyes", "first-time reader walkthrough without prior context"),
];

/// Descriptors of the built-in methodologies for `mode`.
///
/// Custom modes have no built-in methodologies.
pub fn builtin_catalog(mode: &ReviewMode) -> Vec<MethodologyDescriptor> {
    let entries: &[(&str, &str)] = match mode {
        ReviewMode::Audit => &AUDIT_CATALOG,
        ReviewMode::PhaseReview => &PHASE_REVIEW_CATALOG,
        ReviewMode::Custom(_) => &[],
    };
    entries
        .iter()
        .map(|(id, focus)| MethodologyDescriptor::new(*id, *focus, mode.clone()))
        .collect()
}
