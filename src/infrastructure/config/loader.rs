use std::path::Path;

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid required_clean_passes: {0}. Must be at least 1")]
    InvalidRequiredCleanPasses(u32),

    #[error("Invalid max_iterations: {max_iterations}. Must be at least required_clean_passes ({required})")]
    InvalidMaxIterations { max_iterations: u32, required: u32 },

    #[error("Invalid max_fix_attempts: {0}. Must be at least 1")]
    InvalidMaxFixAttempts(u32),

    #[error("Invalid max_total_attempts: {total}. Must be at least max_fix_attempts ({per_round})")]
    InvalidMaxTotalAttempts { total: u32, per_round: u32 },

    #[error("Invalid checkpoint_threshold_percent: {0}. Must be in (0, 100]")]
    InvalidCheckpointThreshold(f64),

    #[error("Invalid window_tokens: {0}. Must be positive")]
    InvalidWindowTokens(u64),

    #[error("Invalid min_confidence: {0}. Must be in [0, 1]")]
    InvalidMinConfidence(f64),

    #[error("Invalid timeout: {0} cannot be 0")]
    ZeroTimeout(&'static str),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .convergent/config.yaml (project config)
    /// 3. .convergent/local.yaml (project local overrides, optional)
    /// 4. Environment variables (CONVERGENT_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Same as [`load`](Self::load) with `.convergent/` resolved under `dir`.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let base = dir.as_ref().join(".convergent");
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base.join("config.yaml")))
            .merge(Yaml::file(base.join("local.yaml")))
            .merge(Env::prefixed("CONVERGENT_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let engine = &config.engine;

        if engine.required_clean_passes == 0 {
            return Err(ConfigError::InvalidRequiredCleanPasses(
                engine.required_clean_passes,
            ));
        }

        if engine.max_iterations < engine.required_clean_passes {
            return Err(ConfigError::InvalidMaxIterations {
                max_iterations: engine.max_iterations,
                required: engine.required_clean_passes,
            });
        }

        if engine.remediation.max_fix_attempts == 0 {
            return Err(ConfigError::InvalidMaxFixAttempts(
                engine.remediation.max_fix_attempts,
            ));
        }

        if engine.remediation.max_total_attempts < engine.remediation.max_fix_attempts {
            return Err(ConfigError::InvalidMaxTotalAttempts {
                total: engine.remediation.max_total_attempts,
                per_round: engine.remediation.max_fix_attempts,
            });
        }

        let threshold = engine.context.checkpoint_threshold_percent;
        if !(threshold > 0.0 && threshold <= 100.0) {
            return Err(ConfigError::InvalidCheckpointThreshold(threshold));
        }

        if engine.context.window_tokens == 0 {
            return Err(ConfigError::InvalidWindowTokens(engine.context.window_tokens));
        }

        if !(0.0..=1.0).contains(&engine.evidence.min_confidence) {
            return Err(ConfigError::InvalidMinConfidence(
                engine.evidence.min_confidence,
            ));
        }

        if engine.sub_check_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("sub_check_timeout_ms"));
        }

        if engine.wall_clock_timeout_secs == Some(0) {
            return Err(ConfigError::ZeroTimeout("wall_clock_timeout_secs"));
        }

        // Validate logging config
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}
