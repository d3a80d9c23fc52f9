//! Configuration file parser for ~/.config/feedpace/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde (with `deny_unknown_fields` off), though
//! we log a warning when the file contains potential typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::scheduler::{RateLimitConfig, SchedulerConfig};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A value parsed but cannot be used (e.g. a zero-sized worker pool).
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level daemon configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. `None` = `feeds.db` next to the config file.
    pub database_path: Option<PathBuf>,

    /// User-Agent sent with every feed request.
    pub user_agent: String,

    pub scheduler: SchedulerSection,

    pub rate_limit: RateLimitSection,
}

/// `[scheduler]` table. Durations are whole seconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub update_window_secs: u64,
    pub min_interval_secs: u64,
    pub max_concurrent: usize,
    pub cleanup_interval_secs: u64,
    pub fetch_timeout_secs: u64,
}

/// `[rate_limit]` table, applied per remote host.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub requests_per_minute: u32,
    pub burst_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            user_agent: format!("feedpace/{}", env!("CARGO_PKG_VERSION")),
            scheduler: SchedulerSection::default(),
            rate_limit: RateLimitSection::default(),
        }
    }
}

impl Default for SchedulerSection {
    fn default() -> Self {
        let defaults = SchedulerConfig::default();
        Self {
            update_window_secs: defaults.update_window.as_secs(),
            min_interval_secs: defaults.min_interval.as_secs(),
            max_concurrent: defaults.max_concurrent,
            cleanup_interval_secs: defaults.cleanup_interval.as_secs(),
            fetch_timeout_secs: defaults.fetch_timeout.as_secs(),
        }
    }
}

impl Default for RateLimitSection {
    fn default() -> Self {
        let defaults = RateLimitConfig::default();
        Self {
            requests_per_minute: defaults.requests_per_minute,
            burst_size: defaults.burst_size,
        }
    }
}

const KNOWN_TOP_LEVEL_KEYS: &[&str] = &["database_path", "user_agent", "scheduler", "rate_limit"];
const KNOWN_SCHEDULER_KEYS: &[&str] = &[
    "update_window_secs",
    "min_interval_secs",
    "max_concurrent",
    "cleanup_interval_secs",
    "fetch_timeout_secs",
];
const KNOWN_RATE_LIMIT_KEYS: &[&str] = &["requests_per_minute", "burst_size"];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Unusable values → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to prevent memory exhaustion
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw, KNOWN_TOP_LEVEL_KEYS, None);
            for (section, known) in [
                ("scheduler", KNOWN_SCHEDULER_KEYS),
                ("rate_limit", KNOWN_RATE_LIMIT_KEYS),
            ] {
                if let Some(toml::Value::Table(table)) = raw.get(section) {
                    warn_unknown_keys(table, known, Some(section));
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            update_window_secs = config.scheduler.update_window_secs,
            max_concurrent = config.scheduler.max_concurrent,
            requests_per_minute = config.rate_limit.requests_per_minute,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.scheduler.update_window_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.update_window_secs must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.requests_per_minute == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.requests_per_minute must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.burst_size == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.burst_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        let s = &self.scheduler;
        SchedulerConfig {
            update_window: Duration::from_secs(s.update_window_secs),
            min_interval: Duration::from_secs(s.min_interval_secs),
            max_concurrent: s.max_concurrent,
            cleanup_interval: Duration::from_secs(s.cleanup_interval_secs),
            fetch_timeout: Duration::from_secs(s.fetch_timeout_secs),
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_minute: self.rate_limit.requests_per_minute,
            burst_size: self.rate_limit.burst_size,
        }
    }
}

fn warn_unknown_keys(table: &toml::Table, known: &[&str], section: Option<&str>) {
    for key in table.keys() {
        if !known.contains(&key.as_str()) {
            match section {
                Some(section) => {
                    tracing::warn!(section = %section, key = %key, "Unknown key in config file, ignoring")
                }
                None => tracing::warn!(key = %key, "Unknown key in config file, ignoring"),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
