//! # agent-replay-core
//!
//! Core library for agent-replay - a live feed over coding-agent transcripts.
//!
//! This library provides:
//! - Domain types for events, agents, sessions and feed messages
//! - Incremental transcript ingestion (tail cursor + record decoder)
//! - Per-session stores with agent trees and token accounting
//! - Live watcher tasks and a cross-session aggregator
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! ```text
//! file bytes ─► TailCursor ─► RecordDecoder ─► SessionStore (+ AgentRegistry)
//!                                                   │
//!                                          LiveSession::poll
//!                                                   │
//!                           ┌───────────────────────┴──────────────┐
//!                           ▼                                      ▼
//!                per-session subscribers                   Aggregator task
//!                (FeedMessage: Full/Delta)            (AggregateDelta, bounded)
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use agent_replay_core::{Config, SessionHub};
//! use agent_replay_core::discovery::GlobSource;
//!
//! # async fn run() -> agent_replay_core::Result<()> {
//! let config = Config::load()?;
//! let source = GlobSource::from_config(&config.sources);
//! let hub = SessionHub::new(config.clone());
//! hub.refresh(&source).await?;
//!
//! for summary in hub.list_sessions() {
//!     println!("{} ({} events)", summary.file_path.display(), summary.event_count);
//! }
//! hub.shutdown().await;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use ingest::parse_transcript;
pub use live::SessionHub;
pub use types::*;

// Public modules
pub mod config;
pub mod discovery;
pub mod error;
pub mod format;
pub mod ingest;
pub mod live;
pub mod logging;
pub mod redact;
pub mod registry;
pub mod session;
pub mod types;
