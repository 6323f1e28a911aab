//! Configuration loading and validation.
//!
//! Hierarchical merging via figment: programmatic defaults, then
//! `.stagecraft/config.yaml`, then `.stagecraft/local.yaml`, then
//! `STAGECRAFT_*` environment variables (highest priority).

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::models::MaturityLevel;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid tick_interval_ms: {0}. Must be positive")]
    InvalidTickInterval(u64),

    #[error("Invalid top_k: {0}. Must be between 1 and 32")]
    InvalidTopK(usize),

    #[error("Invalid grace_ms: {0}. Must be positive")]
    InvalidGrace(u64),

    #[error("Invalid contribution_increment: {0}. Must be positive")]
    InvalidContributionIncrement(f64),

    #[error("Invalid history_cap: {0}. Must be at least 1")]
    InvalidHistoryCap(usize),

    #[error("Invalid level thresholds: {0}")]
    InvalidLevelThresholds(String),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),
}

/// Main configuration structure for stagecraft.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerSection,

    /// Aggregation configuration
    #[serde(default)]
    pub aggregation: AggregationSection,

    /// Maturity-level ladder configuration
    #[serde(default)]
    pub levels: LevelsSection,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scheduler configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerSection {
    /// Global tick interval in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Grace window past estimated completion, in milliseconds
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,

    /// New plans admitted per scheduling cycle
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

const fn default_tick_interval_ms() -> u64 {
    1_000
}

const fn default_grace_ms() -> u64 {
    60_000
}

const fn default_top_k() -> usize {
    3
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            grace_ms: default_grace_ms(),
            top_k: default_top_k(),
        }
    }
}

/// Aggregation configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AggregationSection {
    /// Contribution added per received snapshot
    #[serde(default = "default_contribution_increment")]
    pub contribution_increment: f64,

    /// Maximum retained history samples
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
}

const fn default_contribution_increment() -> f64 {
    1.0
}

const fn default_history_cap() -> usize {
    1000
}

impl Default for AggregationSection {
    fn default() -> Self {
        Self {
            contribution_increment: default_contribution_increment(),
            history_cap: default_history_cap(),
        }
    }
}

/// Maturity-level ladder section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LevelsSection {
    /// Activation thresholds, one per level, strictly ascending
    #[serde(default = "default_level_thresholds")]
    pub thresholds: Vec<f64>,
}

fn default_level_thresholds() -> Vec<f64> {
    MaturityLevel::DEFAULT_THRESHOLDS.to_vec()
}

impl Default for LevelsSection {
    fn default() -> Self {
        Self {
            thresholds: default_level_thresholds(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Optional directory for rotated file output
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.stagecraft/config.yaml`
    /// 3. `.stagecraft/local.yaml`
    /// 4. Environment variables (`STAGECRAFT_*` prefix)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".stagecraft/config.yaml"))
            .merge(Yaml::file(".stagecraft/local.yaml"))
            .merge(Env::prefixed("STAGECRAFT_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
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

    /// Validate configuration after loading.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.scheduler.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidTickInterval(
                config.scheduler.tick_interval_ms,
            ));
        }
        if config.scheduler.top_k == 0 || config.scheduler.top_k > 32 {
            return Err(ConfigError::InvalidTopK(config.scheduler.top_k));
        }
        if config.scheduler.grace_ms == 0 {
            return Err(ConfigError::InvalidGrace(config.scheduler.grace_ms));
        }

        if config.aggregation.contribution_increment <= 0.0 {
            return Err(ConfigError::InvalidContributionIncrement(
                config.aggregation.contribution_increment,
            ));
        }
        if config.aggregation.history_cap == 0 {
            return Err(ConfigError::InvalidHistoryCap(config.aggregation.history_cap));
        }

        if config.levels.thresholds.len() != MaturityLevel::ALL.len() {
            return Err(ConfigError::InvalidLevelThresholds(format!(
                "expected {} thresholds, got {}",
                MaturityLevel::ALL.len(),
                config.levels.thresholds.len()
            )));
        }
        for pair in config.levels.thresholds.windows(2) {
            if pair[0] >= pair[1] {
                return Err(ConfigError::InvalidLevelThresholds(format!(
                    "thresholds must be strictly ascending; {} >= {}",
                    pair[0], pair[1]
                )));
            }
        }

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
