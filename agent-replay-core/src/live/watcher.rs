//! Live watcher
//!
//! [`LiveSession`] is the synchronous per-file pipeline: one [`poll`](LiveSession::poll)
//! advances the cursor, decodes the new lines into the store and reports what
//! changed. [`spawn_watcher`] runs it on a timer inside a tokio task and
//! publishes every change.
//!
//! A session's subagent transcripts (`<session>/subagents/agent-*.jsonl`) are
//! tailed by the same `LiveSession`, each with its own cursor and decoder, and
//! feed the same store. Within one poll the main file is decoded first.

use crate::config::Config;
use crate::discovery::{subagent_id, subagent_transcripts};
use crate::error::{Error, Result};
use crate::ingest::{
    create_decoder, decode_lines, decoder_for, modified_at, Advance, RecordDecoder, TailCursor,
    TranscriptFormat,
};
use crate::live::aggregator::SessionUpdate;
use crate::redact::{redact_message, SharedRedactor};
use crate::session::SessionStore;
use crate::types::{Agent, Delta, FeedMessage, ResyncReason, Session};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Counters for one watched file
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WatchStats {
    pub lines_decoded: u64,
    pub lines_skipped: u64,
    pub events_appended: u64,
    pub resyncs: u64,
}

/// Cursor and decoder for one subagent transcript
struct SubagentTail {
    agent_id: String,
    cursor: TailCursor,
    decoder: Box<dyn RecordDecoder>,
}

/// New lines of one file, ready to decode
struct Pending {
    /// `None` for the main transcript
    subagent: Option<PathBuf>,
    first_line: u64,
    advance: Advance,
}

/// Cursors, decoders and store for one transcript file and its subagents.
pub struct LiveSession {
    path: PathBuf,
    config: Config,
    cursor: TailCursor,
    decoder: Box<dyn RecordDecoder>,
    subagents: BTreeMap<PathBuf, SubagentTail>,
    store: SessionStore,
    /// Agents as last reported to subscribers
    reported_agents: BTreeMap<String, Agent>,
    started: bool,
    stats: WatchStats,
}

impl LiveSession {
    /// Prepare a file for watching. Nothing is read until the first poll.
    ///
    /// Fails with [`Error::UnsupportedFormat`] when the file belongs to a
    /// runtime without a decoder.
    pub fn open(path: impl Into<PathBuf>, config: &Config) -> Result<Self> {
        let path = path.into();
        let decoder = decoder_for(&path, config)?;
        Ok(Self {
            store: SessionStore::new(&path, &config.live),
            path,
            config: config.clone(),
            cursor: TailCursor::new(),
            decoder,
            subagents: BTreeMap::new(),
            reported_agents: BTreeMap::new(),
            started: false,
            stats: WatchStats::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn project(&self) -> &str {
        self.store.project()
    }

    pub fn stats(&self) -> WatchStats {
        self.stats
    }

    pub fn is_present(&self) -> bool {
        self.store.is_present()
    }

    pub fn snapshot(&self) -> Session {
        self.store.snapshot()
    }

    /// Subagent transcripts currently tailed
    pub fn subagent_files(&self) -> impl Iterator<Item = &Path> {
        self.subagents.keys().map(PathBuf::as_path)
    }

    /// Run one ingestion cycle.
    ///
    /// - first successful poll: `Full { reason: Initial }`
    /// - the file or one of its subagent files shrank: everything rebuilt
    ///   from offset 0, `Full { reason: Truncated }`
    /// - new events or agent changes: `Delta`
    /// - otherwise `None`; a vanished file only flips `present` off
    pub fn poll(&mut self) -> Result<Option<FeedMessage>> {
        let modified = match modified_at(&self.path) {
            Ok(modified) => modified,
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
                self.mark_missing();
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let mut pending = match self.advance_all() {
            Ok(pending) => pending,
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
                self.mark_missing();
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let reset = pending.iter().any(|p| p.advance.reset);
        if reset {
            tracing::info!(file = %self.path.display(), "Transcript truncated, rebuilding session");
            self.stats.resyncs += 1;
            self.cursor.reset();
            self.decoder.reset();
            for tail in self.subagents.values_mut() {
                tail.cursor.reset();
                tail.decoder.reset();
            }
            self.store = SessionStore::new(&self.path, &self.config.live);
            pending = self.advance_all()?;
        }
        self.store.set_present(true);
        self.store.set_last_modified(modified);

        let mut fresh = Vec::new();
        let mut decoded_lines = 0;
        for batch in pending {
            let (decoder, owner) = match &batch.subagent {
                None => (self.decoder.as_mut(), None),
                Some(path) => match self.subagents.get_mut(path) {
                    Some(tail) => (tail.decoder.as_mut(), Some(tail.agent_id.as_str())),
                    None => continue,
                },
            };
            if let Some(agent_id) = owner {
                if !batch.advance.lines.is_empty() {
                    self.store.ensure_agent(agent_id);
                }
            }

            let stats = decode_lines(
                decoder,
                &mut self.store,
                &batch.advance.lines,
                batch.first_line,
                &mut fresh,
            );
            decoded_lines += stats.decoded;
            self.stats.lines_decoded += stats.decoded;
            self.stats.lines_skipped += stats.skipped;
            self.stats.events_appended += stats.events;
        }

        if !self.started || reset {
            let reason = if reset {
                ResyncReason::Truncated
            } else {
                ResyncReason::Initial
            };
            self.started = true;
            self.reported_agents = self.store.agents();
            return Ok(Some(FeedMessage::Full {
                reason,
                session: self.store.snapshot(),
            }));
        }

        if decoded_lines == 0 {
            return Ok(None);
        }

        let agents = self.store.agents();
        if fresh.is_empty() && agents == self.reported_agents {
            return Ok(None);
        }
        self.reported_agents = agents.clone();

        Ok(Some(FeedMessage::Delta(Delta {
            events: fresh,
            agents,
            total_events: self.store.total_events(),
        })))
    }

    /// Advance the main cursor, then every subagent cursor.
    ///
    /// Errors on the main file are returned; a subagent file that cannot be
    /// read is logged and retried on the next poll.
    fn advance_all(&mut self) -> Result<Vec<Pending>> {
        let first_line = self.cursor.lines_consumed() + 1;
        let advance = self.cursor.advance(&self.path)?;
        let mut pending = vec![Pending {
            subagent: None,
            first_line: if advance.reset { 1 } else { first_line },
            advance,
        }];

        self.track_subagents();
        for (path, tail) in self.subagents.iter_mut() {
            let first_line = tail.cursor.lines_consumed() + 1;
            match tail.cursor.advance(path) {
                Ok(advance) => pending.push(Pending {
                    subagent: Some(path.clone()),
                    first_line: if advance.reset { 1 } else { first_line },
                    advance,
                }),
                Err(e) => {
                    tracing::debug!(file = %path.display(), error = %e, "Subagent transcript unreadable");
                }
            }
        }

        Ok(pending)
    }

    /// Start tailing subagent transcripts that appeared since the last poll
    fn track_subagents(&mut self) {
        let found = match subagent_transcripts(&self.path, self.store.session_id()) {
            Ok(found) => found,
            Err(e) => {
                tracing::debug!(file = %self.path.display(), error = %e, "Subagent lookup failed");
                return;
            }
        };

        for path in found {
            if self.subagents.contains_key(&path) {
                continue;
            }
            let Some(agent_id) = subagent_id(&path) else {
                continue;
            };
            let mut decoder = match create_decoder(TranscriptFormat::ClaudeCode, &self.config.decoder) {
                Ok(decoder) => decoder,
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "No decoder for subagent transcript");
                    continue;
                }
            };
            decoder.set_default_agent(&agent_id);

            tracing::debug!(file = %path.display(), agent_id = %agent_id, "Tailing subagent transcript");
            self.subagents.insert(
                path,
                SubagentTail {
                    agent_id,
                    cursor: TailCursor::new(),
                    decoder,
                },
            );
        }
    }

    fn mark_missing(&mut self) {
        if self.store.is_present() {
            tracing::info!(file = %self.path.display(), "Transcript vanished");
            self.store.set_present(false);
        }
    }
}

/// Channels and settings a watcher task publishes through
#[derive(Clone)]
pub struct WatcherContext {
    pub poll_interval: Duration,
    /// Applied to outbound events; `None` outside public mode
    pub redactor: Option<SharedRedactor>,
    pub feed: broadcast::Sender<FeedMessage>,
    pub updates: mpsc::Sender<SessionUpdate>,
    pub snapshot: watch::Sender<Session>,
    pub cancel: CancellationToken,
}

/// Publish one message: snapshot first, then subscribers, then the aggregator.
pub async fn publish(ctx: &WatcherContext, live: &LiveSession, message: FeedMessage) {
    ctx.snapshot.send_replace(live.snapshot());

    let message = match &ctx.redactor {
        Some(redactor) => redact_message(redactor.as_ref(), message),
        None => message,
    };

    // no subscribers is not an error
    let _ = ctx.feed.send(message.clone());

    let update = SessionUpdate {
        project: live.project().to_string(),
        file_path: live.path().to_path_buf(),
        message,
    };
    if ctx.updates.send(update).await.is_err() {
        tracing::debug!(file = %live.path().display(), "Aggregator stopped, update dropped");
    }
}

/// Poll `live` every `ctx.poll_interval` until `ctx.cancel` fires.
///
/// Returns the final stats. Poll errors are logged and the loop keeps going.
pub fn spawn_watcher(mut live: LiveSession, ctx: WatcherContext) -> JoinHandle<WatchStats> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ctx.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::debug!(file = %live.path().display(), "Watcher started");

        loop {
            tokio::select! {
                () = ctx.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let was_present = live.is_present();
            match live.poll() {
                Ok(Some(message)) => publish(&ctx, &live, message).await,
                Ok(None) => {
                    if was_present != live.is_present() {
                        ctx.snapshot.send_replace(live.snapshot());
                    }
                }
                Err(e) => {
                    tracing::warn!(file = %live.path().display(), error = %e, "Poll failed");
                }
            }
        }

        let stats = live.stats();
        tracing::debug!(
            file = %live.path().display(),
            lines = stats.lines_decoded,
            skipped = stats.lines_skipped,
            events = stats.events_appended,
            resyncs = stats.resyncs,
            "Watcher stopped"
        );
        stats
    })
}
