//! All-sessions aggregator
//!
//! Merges every watcher's messages into one bounded feed. Events keep the
//! order in which they were observed; the aggregate is never re-sorted by
//! timestamp.

use crate::config::AggregateConfig;
use crate::types::{AggregateDelta, Agent, FeedMessage, ProjectEvent};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// A feed message tagged with the session it came from
#[derive(Debug, Clone)]
pub struct SessionUpdate {
    pub project: String,
    pub file_path: PathBuf,
    pub message: FeedMessage,
}

/// Bounded merged feed over all sessions.
#[derive(Debug, Clone, Serialize)]
pub struct MasterAggregate {
    events: VecDeque<ProjectEvent>,
    /// Keyed by `project:agent_id`
    agents: BTreeMap<String, Agent>,
    #[serde(skip)]
    sessions: BTreeSet<PathBuf>,
    #[serde(skip)]
    event_cap: usize,
    #[serde(skip)]
    backfill: usize,
}

impl MasterAggregate {
    pub fn new(config: &AggregateConfig) -> Self {
        Self {
            events: VecDeque::new(),
            agents: BTreeMap::new(),
            sessions: BTreeSet::new(),
            event_cap: config.event_cap.max(1),
            backfill: config.backfill,
        }
    }

    pub fn events(&self) -> impl Iterator<Item = &ProjectEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn agents(&self) -> &BTreeMap<String, Agent> {
        &self.agents
    }

    /// Distinct sessions that have contributed
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Merge one session message.
    ///
    /// A `Delta` contributes all of its events; a `Full` only its last
    /// `backfill` events. The returned delta carries the whole agent map,
    /// like a session [`Delta`](crate::types::Delta) does. Returns `None`
    /// when nothing visible changed.
    pub fn ingest(
        &mut self,
        project: &str,
        file_path: &Path,
        message: &FeedMessage,
    ) -> Option<AggregateDelta> {
        let new_session = self.sessions.insert(file_path.to_path_buf());

        let events = message.events();
        let taken = match message {
            FeedMessage::Full { .. } => &events[events.len().saturating_sub(self.backfill)..],
            FeedMessage::Delta(_) => events,
        };
        let appended: Vec<ProjectEvent> = taken
            .iter()
            .map(|event| ProjectEvent {
                project: project.to_string(),
                file_path: file_path.to_path_buf(),
                event: event.clone(),
            })
            .collect();

        let mut agents_changed = false;
        for agent in message.agents().values() {
            let merged = scoped_agent(project, agent);
            if self.agents.get(&merged.id) != Some(&merged) {
                self.agents.insert(merged.id.clone(), merged);
                agents_changed = true;
            }
        }

        self.events.extend(appended.iter().cloned());
        while self.events.len() > self.event_cap {
            self.events.pop_front();
        }

        if appended.is_empty() && !agents_changed && !new_session {
            return None;
        }

        let skip = appended.len().saturating_sub(self.event_cap);
        Some(AggregateDelta {
            events: appended.into_iter().skip(skip).collect(),
            agents: self.agents.clone(),
            session_count: self.sessions.len(),
        })
    }
}

/// Copy of `agent` keyed and named under its project
fn scoped_agent(project: &str, agent: &Agent) -> Agent {
    Agent {
        id: format!("{}:{}", project, agent.id),
        name: format!("{}/{}", project, agent.name),
        parent_id: agent
            .parent_id
            .as_ref()
            .map(|parent| format!("{}:{}", project, parent)),
        ..agent.clone()
    }
}

/// Run the aggregator until every update sender is dropped.
///
/// Each visible change is published on `snapshot` and re-broadcast on `feed`.
pub fn spawn_aggregator(
    mut updates: mpsc::Receiver<SessionUpdate>,
    feed: broadcast::Sender<AggregateDelta>,
    snapshot: watch::Sender<MasterAggregate>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            let mut delta = None;
            snapshot.send_if_modified(|aggregate| {
                delta = aggregate.ingest(&update.project, &update.file_path, &update.message);
                delta.is_some()
            });

            if let Some(delta) = delta {
                tracing::trace!(
                    project = %update.project,
                    events = delta.events.len(),
                    "Aggregate updated"
                );
                let _ = feed.send(delta);
            }
        }
        tracing::debug!("Aggregator stopped");
    })
}
