//! Configuration loading and config file resolution
//!
//! Bootstrap configuration lives in a single TOML file. Every field has a
//! built-in default, so a missing file (or a missing section) is never fatal.
//!
//! # Config File Priority
//!
//! 1. Command-line argument (highest priority)
//! 2. `PREFLIGHT_CONFIG` environment variable
//! 3. `<config dir>/preflight/config.toml` (e.g. `~/.config/preflight/config.toml`)
//! 4. Built-in defaults (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PREFLIGHT_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Noisy input channel defaults
    #[serde(default)]
    pub channel: ChannelSettings,

    /// Tracker service settings
    #[serde(default)]
    pub tracker: TrackerSettings,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Noise reduction strength applied before each extraction attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseReductionLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for NoiseReductionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NoiseReductionLevel::Low => "low",
            NoiseReductionLevel::Medium => "medium",
            NoiseReductionLevel::High => "high",
        };
        f.write_str(s)
    }
}

/// Defaults for confidence-gated input channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Minimum confidence (0.0-1.0) for an extraction to be accepted
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Maximum number of extraction attempts per input
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Noise reduction level applied before extraction
    #[serde(default = "default_noise_reduction_level")]
    pub noise_reduction_level: NoiseReductionLevel,

    /// Per-attempt timeout for external service calls (milliseconds)
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_retries: default_max_retries(),
            noise_reduction_level: default_noise_reduction_level(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
        }
    }
}

/// Tracker service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSettings {
    /// Broadcast capacity of the event bus
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// SQLite database file for persisted progress (in-memory store if unset)
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
            database_path: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_confidence_threshold() -> f32 {
    0.85
}

fn default_max_retries() -> u32 {
    3
}

fn default_noise_reduction_level() -> NoiseReductionLevel {
    NoiseReductionLevel::Medium
}

fn default_attempt_timeout_ms() -> u64 {
    10_000
}

fn default_event_capacity() -> usize {
    100
}

impl TomlConfig {
    /// Parse and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config file and load it, falling back to defaults
    ///
    /// A missing config file logs a warning and yields the built-in defaults.
    /// A file that exists but fails to parse or validate is an error.
    pub fn load_or_default(cli_arg: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_arg) {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                warn!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Validate value ranges
    pub fn validate(&self) -> Result<()> {
        let threshold = self.channel.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "channel.confidence_threshold must be within 0.0-1.0 (got {})",
                threshold
            )));
        }
        if self.channel.attempt_timeout_ms == 0 {
            return Err(Error::Config(
                "channel.attempt_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.tracker.event_capacity == 0 {
            return Err(Error::Config(
                "tracker.event_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolve which config file to read, per the priority order above
///
/// Returns `None` when neither an explicit path nor the platform config file exists.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir()
        .map(|d| d.join("preflight").join("config.toml"))
        .filter(|p| p.exists())
}

/// Write config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}
