//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/agent-replay/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/agent-replay/` (~/.config/agent-replay/)
//! - State/Logs: `$XDG_STATE_HOME/agent-replay/` (~/.local/state/agent-replay/)

use crate::error::{Error, Result};
use crate::types::EventType;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
pub(crate) fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Redact outbound events before they leave the process
    #[serde(default)]
    pub public_mode: bool,

    /// Live watcher tuning
    #[serde(default)]
    pub live: LiveConfig,

    /// All-sessions aggregate tuning
    #[serde(default)]
    pub aggregate: AggregateConfig,

    /// Transcript discovery overrides
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Record decoder overrides
    #[serde(default)]
    pub decoder: DecoderConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Live watcher configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LiveConfig {
    /// Milliseconds between ingestion cycles of one file
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Seconds since last modification after which a session is inactive
    #[serde(default = "default_liveness_secs")]
    pub liveness_secs: u64,

    /// Events retained per session
    #[serde(default = "default_session_event_cap")]
    pub session_event_cap: usize,

    /// Leading records inspected for slug/branch/version
    #[serde(default = "default_metadata_records")]
    pub metadata_records: usize,

    /// Milliseconds between discovery refreshes
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    /// Buffered messages per subscriber channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            liveness_secs: default_liveness_secs(),
            session_event_cap: default_session_event_cap(),
            metadata_records: default_metadata_records(),
            refresh_interval_ms: default_refresh_interval_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl LiveConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Saturates at the largest representable duration
    pub fn liveness_window(&self) -> chrono::Duration {
        i64::try_from(self.liveness_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_liveness_secs() -> u64 {
    60
}

fn default_session_event_cap() -> usize {
    2000
}

fn default_metadata_records() -> usize {
    20
}

fn default_refresh_interval_ms() -> u64 {
    5000
}

fn default_channel_capacity() -> usize {
    256
}

/// Aggregate (all-sessions feed) configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AggregateConfig {
    /// Events retained in the merged feed
    #[serde(default = "default_aggregate_event_cap")]
    pub event_cap: usize,

    /// Events taken from a session's full snapshot when it first joins
    #[serde(default = "default_backfill")]
    pub backfill: usize,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            event_cap: default_aggregate_event_cap(),
            backfill: default_backfill(),
        }
    }
}

fn default_aggregate_event_cap() -> usize {
    2000
}

fn default_backfill() -> usize {
    20
}

/// Override paths for transcript discovery
#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    /// Override path for Claude Code data (defaults to ~/.claude)
    pub claude_code_path: Option<PathBuf>,

    /// Glob patterns relative to the root
    #[serde(default = "default_source_patterns")]
    pub patterns: Vec<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            claude_code_path: None,
            patterns: default_source_patterns(),
        }
    }
}

fn default_source_patterns() -> Vec<String> {
    vec!["projects/*/*.jsonl".to_string()]
}

/// Record decoder configuration
#[derive(Debug, Deserialize, Default, Clone)]
pub struct DecoderConfig {
    /// Tool name -> event type overrides, merged over the built-in table
    #[serde(default)]
    pub tool_kinds: HashMap<String, EventType>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would stall or empty the feed
    pub fn validate(&self) -> Result<()> {
        if self.live.poll_interval_ms == 0 {
            return Err(Error::Config(
                "live.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.live.refresh_interval_ms == 0 {
            return Err(Error::Config(
                "live.refresh_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.live.session_event_cap == 0 {
            return Err(Error::Config(
                "live.session_event_cap must be greater than 0".to_string(),
            ));
        }
        if self.live.channel_capacity == 0 {
            return Err(Error::Config(
                "live.channel_capacity must be greater than 0".to_string(),
            ));
        }
        if self.aggregate.event_cap == 0 {
            return Err(Error::Config(
                "aggregate.event_cap must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/agent-replay/config.toml` (~/.config/agent-replay/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("agent-replay").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/agent-replay/` (~/.local/state/agent-replay/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("agent-replay")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("agent-replay.log")
    }
}
