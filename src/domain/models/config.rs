use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{
    ExecutorTier, MethodologyId, ReviewMode, DEFAULT_MAX_ITERATIONS,
    DEFAULT_REQUIRED_CLEAN_PASSES,
};

/// Main configuration structure for Convergent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Defaults for convergence runs
    #[serde(default)]
    pub engine: RunConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Parameters of a single convergence run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunConfig {
    /// Review mode; selects the methodology pool
    #[serde(default = "default_mode")]
    pub mode: ReviewMode,

    /// Restrict the run to these methodologies (must belong to the mode's pool)
    #[serde(default)]
    pub pool: Option<Vec<MethodologyId>>,

    /// Consecutive distinct clean passes needed to converge
    #[serde(default = "default_required_clean_passes")]
    pub required_clean_passes: u32,

    /// Upper bound on total passes
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Executor/model tier passes run on
    #[serde(default)]
    pub executor_tier: ExecutorTier,

    /// Start every pass from cleared working context
    #[serde(default)]
    pub clear_context_between_passes: bool,

    /// Seed for methodology sampling; random when absent
    #[serde(default)]
    pub seed: Option<u64>,

    /// Per sub-check timeout in milliseconds
    #[serde(default = "default_sub_check_timeout_ms")]
    pub sub_check_timeout_ms: u64,

    /// Optional wall-clock bound for the whole run, checked between passes
    #[serde(default)]
    pub wall_clock_timeout_secs: Option<u64>,

    #[serde(default)]
    pub remediation: RemediationConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub evidence: EvidenceConfig,
}

fn default_mode() -> ReviewMode {
    ReviewMode::Audit
}

const fn default_required_clean_passes() -> u32 {
    DEFAULT_REQUIRED_CLEAN_PASSES
}

const fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

const fn default_sub_check_timeout_ms() -> u64 {
    60_000
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            pool: None,
            required_clean_passes: default_required_clean_passes(),
            max_iterations: default_max_iterations(),
            executor_tier: ExecutorTier::default(),
            clear_context_between_passes: false,
            seed: None,
            sub_check_timeout_ms: default_sub_check_timeout_ms(),
            wall_clock_timeout_secs: None,
            remediation: RemediationConfig::default(),
            context: ContextConfig::default(),
            evidence: EvidenceConfig::default(),
        }
    }
}

impl RunConfig {
    /// Config for `mode` with every other setting at its default.
    pub fn for_mode(mode: ReviewMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

/// Issue remediation bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RemediationConfig {
    /// Consecutive failed fix attempts before the loop detector is consulted
    #[serde(default = "default_max_fix_attempts")]
    pub max_fix_attempts: u32,

    /// Hard ceiling on attempts per issue; reaching it pivots the issue
    #[serde(default = "default_max_total_attempts")]
    pub max_total_attempts: u32,
}

const fn default_max_fix_attempts() -> u32 {
    3
}

const fn default_max_total_attempts() -> u32 {
    6
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            max_fix_attempts: default_max_fix_attempts(),
            max_total_attempts: default_max_total_attempts(),
        }
    }
}

/// Context metering and checkpoint trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ContextConfig {
    /// Size of the working context in tokens
    #[serde(default = "default_window_tokens")]
    pub window_tokens: u64,

    /// Usage percentage at which the chunker is asked to checkpoint
    #[serde(default = "default_checkpoint_threshold_percent")]
    pub checkpoint_threshold_percent: f64,
}

const fn default_window_tokens() -> u64 {
    200_000
}

const fn default_checkpoint_threshold_percent() -> f64 {
    70.0
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window_tokens: default_window_tokens(),
            checkpoint_threshold_percent: default_checkpoint_threshold_percent(),
        }
    }
}

/// Evidence gate for clean passes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EvidenceConfig {
    /// Minimum verifier confidence for a clean pass to count
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

const fn default_min_confidence() -> f64 {
    0.8
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for log files (console only when absent)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Also log to stderr when writing files
    #[serde(default = "default_true")]
    pub enable_console: bool,

    /// Log file rotation: daily, hourly or never
    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            enable_console: true,
            rotation: RotationPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}
