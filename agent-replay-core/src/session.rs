//! Session store
//!
//! In-memory aggregate for one transcript file: the retained events, the
//! agent registry and the session metadata. A store has exactly one writer
//! (its watcher, or [`parse_transcript`](crate::parse_transcript)); readers
//! get owned [`Session`] snapshots.

use crate::config::LiveConfig;
use crate::ingest::decoder::{Decoded, RecordMeta};
use crate::registry::AgentRegistry;
use crate::types::{Agent, Event, Session, SessionSummary};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

/// Mutable state behind one [`Session`].
#[derive(Debug, Clone)]
pub struct SessionStore {
    file_path: PathBuf,
    project: String,
    meta: RecordMeta,
    /// Records whose metadata has been inspected
    meta_records: usize,
    meta_window: usize,
    registry: AgentRegistry,
    events: VecDeque<Event>,
    event_cap: usize,
    total_events: u64,
    last_modified: Option<DateTime<Utc>>,
    present: bool,
}

impl SessionStore {
    pub fn new(file_path: impl Into<PathBuf>, config: &LiveConfig) -> Self {
        let file_path = file_path.into();
        Self {
            project: project_name(&file_path),
            file_path,
            meta: RecordMeta::default(),
            meta_records: 0,
            meta_window: config.metadata_records,
            registry: AgentRegistry::new(),
            events: VecDeque::new(),
            event_cap: config.session_event_cap.max(1),
            total_events: 0,
            last_modified: None,
            present: true,
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Session id from the records, once one was seen
    pub fn session_id(&self) -> Option<&str> {
        self.meta.session_id.as_deref()
    }

    /// Make sure `id` exists in the agent tree
    pub fn ensure_agent(&mut self, id: &str) {
        self.registry.resolve(id);
    }

    /// Apply one decoded record: spawn links, stray usage, metadata, then events.
    ///
    /// Returns the number of events appended.
    pub fn apply(&mut self, decoded: Decoded) -> usize {
        for link in &decoded.spawns {
            self.registry
                .apply_spawn(&link.parent_id, &link.agent_id, link.name.as_deref());
        }

        if let Some(extra) = &decoded.usage {
            self.registry.apply_usage(&extra.agent_id, extra.usage);
        }

        if self.meta_records < self.meta_window {
            self.meta_records += 1;
            merge_meta(&mut self.meta, decoded.meta);
        }

        let appended = decoded.events.len();
        for event in decoded.events {
            self.append(event);
        }
        appended
    }

    /// Append one event, crediting its tokens to its agent.
    ///
    /// The oldest retained event is evicted once the cap is reached; agent
    /// counters are unaffected by eviction.
    pub fn append(&mut self, event: Event) {
        self.registry
            .note_activity(&event.agent_id, &event.timestamp);
        self.registry.apply_usage(&event.agent_id, event.tokens());

        self.events.push_back(event);
        while self.events.len() > self.event_cap {
            self.events.pop_front();
        }
        self.total_events += 1;
    }

    pub fn set_last_modified(&mut self, modified: DateTime<Utc>) {
        self.last_modified = Some(modified);
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    pub fn set_present(&mut self, present: bool) {
        self.present = present;
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    /// Events ever appended, including evicted ones
    pub fn total_events(&self) -> u64 {
        self.total_events
    }

    pub fn retained_events(&self) -> usize {
        self.events.len()
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn agents(&self) -> BTreeMap<String, Agent> {
        self.registry.snapshot()
    }

    /// Owned copy of the whole session
    pub fn snapshot(&self) -> Session {
        self.build(self.events.iter().cloned().collect())
    }

    pub fn summary(&self, now: DateTime<Utc>, window: chrono::Duration) -> SessionSummary {
        // summaries never look at event bodies
        self.build(Vec::new()).summary(now, window)
    }

    fn build(&self, events: Vec<Event>) -> Session {
        let session_id = self.meta.session_id.clone().unwrap_or_else(|| {
            self.file_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        Session {
            file_path: self.file_path.clone(),
            session_id,
            project: self.project.clone(),
            slug: self.meta.slug.clone().unwrap_or_default(),
            branch: self.meta.branch.clone().unwrap_or_default(),
            version: self.meta.version.clone().unwrap_or_default(),
            cwd: self.meta.cwd.clone().unwrap_or_default(),
            agents: self.registry.snapshot(),
            events,
            total_events: self.total_events,
            start_time: self.meta.timestamp.clone(),
            last_modified: self.last_modified,
            present: self.present,
        }
    }
}

/// Keep the first non-empty value of every field
fn merge_meta(current: &mut RecordMeta, incoming: RecordMeta) {
    fn fill(slot: &mut Option<String>, value: Option<String>) {
        if slot.is_none() {
            *slot = value.filter(|v| !v.is_empty());
        }
    }
    fill(&mut current.session_id, incoming.session_id);
    fill(&mut current.slug, incoming.slug);
    fill(&mut current.branch, incoming.branch);
    fill(&mut current.version, incoming.version);
    fill(&mut current.cwd, incoming.cwd);
    fill(&mut current.timestamp, incoming.timestamp);
}

/// Project label of a transcript: its parent directory name
pub fn project_name(path: &Path) -> String {
    path.parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
