//! Logging for agent-replay
//!
//! Watchers and the aggregator run unattended while the terminal shows the
//! feed itself, so logs go to a daily rolling file under
//! `$XDG_STATE_HOME/agent-replay/`. `RUST_LOG` wins over the configured level.

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Log file name; rotation appends the date
pub const LOG_FILE_PREFIX: &str = "agent-replay.log";

/// Install the file logger in the XDG state directory.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the background writer.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    init_in(&Config::state_dir(), config)
}

/// Install the file logger writing into `log_dir`.
///
/// Fails on an unknown level or when a global subscriber is already set.
pub fn init_in(log_dir: &Path, config: &LoggingConfig) -> Result<LoggingGuard> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(&config.level)?,
    };

    std::fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(config.max_files.max(1))
        .build(log_dir)
        .map_err(|e| Error::Config(format!("failed to open log file: {}", e)))?;

    // watcher tasks must never block on disk
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {}", e)))?;

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        max_files = config.max_files,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Filter for a configured level name (`trace` .. `error`, or `off`)
fn level_filter(level: &str) -> Result<EnvFilter> {
    let parsed: LevelFilter = level
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid log level {:?}", level)))?;
    Ok(EnvFilter::new(parsed.to_string()))
}

/// Log to the test harness output; safe to call from every test
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Keeps the background log writer alive
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Path of the (unrotated) log file name in the state directory
pub fn log_file_path() -> PathBuf {
    Config::log_path()
}
