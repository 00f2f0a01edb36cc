//! Error types for agent-replay-core

use thiserror::Error;

/// Main error type for the agent-replay-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A single transcript line could not be decoded
    #[error("decode error on line {line}: {message}")]
    Decode { line: u64, message: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Session not tracked
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Transcript written by a runtime we have no decoder for
    #[error("unsupported transcript format: {0}")]
    UnsupportedFormat(String),
}

/// Result type alias for agent-replay-core
pub type Result<T> = std::result::Result<T, Error>;
