//! Live layer: watcher tasks, the aggregator and the hub that owns them
//!
//! ```text
//!                 ┌──────────────┐  FeedMessage   ┌─────────────────────┐
//!  file ───────►  │ watcher task │ ─────────────► │ per-session          │
//!  (per path)     │ (LiveSession)│ ──┐            │ broadcast subscribers│
//!                 └──────────────┘   │ mpsc       └─────────────────────┘
//!                                    ▼
//!                            ┌──────────────┐  AggregateDelta  ┌────────────────┐
//!                            │  aggregator  │ ───────────────► │ all-sessions   │
//!                            └──────────────┘                  │ subscribers    │
//!                                                              └────────────────┘
//! ```
//!
//! [`SessionHub`] is the single owner of this machinery. It is created once,
//! reconciled against discovery with [`SessionHub::refresh`], and torn down
//! with [`SessionHub::shutdown`].

pub mod aggregator;
pub mod watcher;

pub use aggregator::{spawn_aggregator, MasterAggregate, SessionUpdate};
pub use watcher::{publish, spawn_watcher, LiveSession, WatchStats, WatcherContext};

use crate::config::Config;
use crate::discovery::TranscriptSource;
use crate::error::{Error, Result};
use crate::redact::{Redactor, SharedRedactor};
use crate::types::{AggregateDelta, FeedMessage, Session, SessionSummary};
use chrono::Utc;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Outcome of one [`SessionHub::refresh`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub added: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    /// Files discovered but not tracked (unsupported format, unreadable)
    pub skipped: Vec<PathBuf>,
}

struct TrackedSession {
    feed: broadcast::Sender<FeedMessage>,
    snapshot: watch::Receiver<Session>,
    cancel: CancellationToken,
    task: JoinHandle<WatchStats>,
}

/// Registry of tracked sessions and owner of the live tasks.
///
/// Must be created inside a tokio runtime.
pub struct SessionHub {
    config: Config,
    redactor: Option<SharedRedactor>,
    sessions: Mutex<HashMap<PathBuf, TrackedSession>>,
    updates: Mutex<Option<mpsc::Sender<SessionUpdate>>>,
    aggregate_feed: broadcast::Sender<AggregateDelta>,
    master: watch::Receiver<MasterAggregate>,
    aggregator: Mutex<Option<JoinHandle<()>>>,
    /// Held for a whole refresh; concurrent refreshes run one after another
    refreshing: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
}

impl SessionHub {
    /// Create a hub without redaction
    pub fn new(config: Config) -> Self {
        Self::build(config, None)
    }

    /// Create a hub that redacts outbound events when `public_mode` is on
    pub fn with_redactor(config: Config, redactor: Arc<dyn Redactor>) -> Self {
        Self::build(config, Some(redactor))
    }

    fn build(config: Config, redactor: Option<SharedRedactor>) -> Self {
        let capacity = config.live.channel_capacity.max(1);
        let (updates_tx, updates_rx) = mpsc::channel(capacity);
        let (aggregate_feed, _) = broadcast::channel(capacity);
        let (master_tx, master) = watch::channel(MasterAggregate::new(&config.aggregate));
        let aggregator = spawn_aggregator(updates_rx, aggregate_feed.clone(), master_tx);

        let redactor = if config.public_mode { redactor } else { None };

        Self {
            config,
            redactor,
            sessions: Mutex::new(HashMap::new()),
            updates: Mutex::new(Some(updates_tx)),
            aggregate_feed,
            master,
            aggregator: Mutex::new(Some(aggregator)),
            refreshing: tokio::sync::Mutex::new(()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Reconcile the tracked set with what `source` currently lists.
    ///
    /// New files are parsed once right away, so their sessions are complete
    /// when this returns, then handed to a watcher task. Files no longer
    /// listed are dropped and their watchers stopped.
    pub async fn refresh(&self, source: &dyn TranscriptSource) -> Result<RefreshReport> {
        let _refreshing = self.refreshing.lock().await;
        let discovered = source.discover()?;
        let current: HashSet<PathBuf> = discovered.into_iter().map(|f| f.path).collect();
        let mut report = RefreshReport::default();

        let new_paths: Vec<PathBuf> = {
            let mut sessions = lock(&self.sessions);
            let gone: Vec<PathBuf> = sessions
                .keys()
                .filter(|path| !current.contains(*path))
                .cloned()
                .collect();
            for path in gone {
                if let Some(tracked) = sessions.remove(&path) {
                    tracing::info!(file = %path.display(), "Transcript no longer discovered, dropping");
                    tracked.cancel.cancel();
                }
                report.removed.push(path);
            }
            current
                .iter()
                .filter(|path| !sessions.contains_key(*path))
                .cloned()
                .collect()
        };

        let Some(updates) = lock(&self.updates).clone() else {
            tracing::debug!("Refresh after shutdown ignored");
            return Ok(report);
        };

        for path in new_paths {
            match self.track(&path, updates.clone()).await {
                Ok(tracked) => {
                    lock(&self.sessions).insert(path.clone(), tracked);
                    report.added.push(path);
                }
                Err(e) => {
                    tracing::debug!(file = %path.display(), error = %e, "Not tracking transcript");
                    report.skipped.push(path);
                }
            }
        }

        if !report.added.is_empty() || !report.removed.is_empty() {
            tracing::info!(
                added = report.added.len(),
                removed = report.removed.len(),
                tracked = lock(&self.sessions).len(),
                "Refreshed sessions"
            );
        }
        Ok(report)
    }

    async fn track(
        &self,
        path: &Path,
        updates: mpsc::Sender<SessionUpdate>,
    ) -> Result<TrackedSession> {
        let mut live = LiveSession::open(path, &self.config)?;
        let initial = live.poll()?;

        let (feed, _) = broadcast::channel(self.config.live.channel_capacity.max(1));
        let (snapshot_tx, snapshot) = watch::channel(live.snapshot());
        let cancel = self.cancel.child_token();

        let ctx = WatcherContext {
            poll_interval: self.config.live.poll_interval(),
            redactor: self.redactor.clone(),
            feed: feed.clone(),
            updates,
            snapshot: snapshot_tx,
            cancel: cancel.clone(),
        };
        if let Some(message) = initial {
            publish(&ctx, &live, message).await;
        }
        let task = spawn_watcher(live, ctx);

        Ok(TrackedSession {
            feed,
            snapshot,
            cancel,
            task,
        })
    }

    /// Periodically [`refresh`](Self::refresh) until `cancel` fires.
    pub async fn run(&self, source: &dyn TranscriptSource, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.live.refresh_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.refresh(source).await {
                tracing::warn!(error = %e, "Session refresh failed");
            }
        }
    }

    /// Current state of one session
    pub fn get_session(&self, path: &Path) -> Result<Session> {
        let sessions = lock(&self.sessions);
        let tracked = sessions
            .get(path)
            .ok_or_else(|| Error::SessionNotFound(path.display().to_string()))?;
        let session = tracked.snapshot.borrow().clone();
        Ok(self.redacted(session))
    }

    /// Current state of one session and its feed from that state on.
    ///
    /// The receiver is subscribed before the snapshot is read, so no message
    /// falls between the two. A delta the snapshot already includes may
    /// still arrive; skip it with [`FeedMessage::covered_by`].
    pub fn attach(&self, path: &Path) -> Result<(Session, broadcast::Receiver<FeedMessage>)> {
        let sessions = lock(&self.sessions);
        let tracked = sessions
            .get(path)
            .ok_or_else(|| Error::SessionNotFound(path.display().to_string()))?;
        let feed = tracked.feed.subscribe();
        let session = tracked.snapshot.borrow().clone();
        Ok((self.redacted(session), feed))
    }

    fn redacted(&self, mut session: Session) -> Session {
        if let Some(redactor) = &self.redactor {
            session.events = session.events.iter().map(|e| redactor.redact(e)).collect();
        }
        session
    }

    /// Messages for one session from now on.
    ///
    /// Use [`attach`](Self::attach) to get the current state together with
    /// the feed.
    pub fn subscribe(&self, path: &Path) -> Result<broadcast::Receiver<FeedMessage>> {
        lock(&self.sessions)
            .get(path)
            .map(|tracked| tracked.feed.subscribe())
            .ok_or_else(|| Error::SessionNotFound(path.display().to_string()))
    }

    /// Aggregate deltas across all sessions from now on
    pub fn subscribe_all(&self) -> broadcast::Receiver<AggregateDelta> {
        self.aggregate_feed.subscribe()
    }

    /// Copy of the merged feed
    pub fn master(&self) -> MasterAggregate {
        self.master.borrow().clone()
    }

    /// Summaries of every tracked session, active first, then most recent
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let now = Utc::now();
        let window = self.config.live.liveness_window();

        let mut summaries: Vec<SessionSummary> = lock(&self.sessions)
            .values()
            .map(|tracked| tracked.snapshot.borrow().summary(now, window))
            .collect();
        summaries.sort_by_key(|s| (!s.is_active, Reverse(s.last_modified)));
        summaries
    }

    pub fn tracked_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Stop every watcher and the aggregator, waiting for them to finish.
    ///
    /// Subscribers can still drain messages queued before the shutdown.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let tracked: Vec<(PathBuf, TrackedSession)> = lock(&self.sessions).drain().collect();
        for (path, session) in tracked {
            match session.task.await {
                Ok(stats) => tracing::debug!(
                    file = %path.display(),
                    events = stats.events_appended,
                    "Watcher joined"
                ),
                Err(e) => tracing::warn!(file = %path.display(), error = %e, "Watcher task failed"),
            }
        }

        // the aggregator exits once the last update sender is gone
        lock(&self.updates).take();
        let aggregator = lock(&self.aggregator).take();
        if let Some(handle) = aggregator {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Aggregator task failed");
            }
        }
        tracing::info!("Session hub stopped");
    }
}

impl Drop for SessionHub {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Lock a hub mutex, recovering the data if a holder panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
