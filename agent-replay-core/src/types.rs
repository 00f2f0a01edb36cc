//! Core domain types for agent-replay
//!
//! These types are the normalized shape every consumer sees, independent of
//! the transcript format they were decoded from.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Transcript** | The append-only JSONL file one coding session writes |
//! | **Event** | One normalized, immutable unit of activity (a tool call, a thought, ...) |
//! | **Agent** | The root assistant of a session or a subagent it spawned |
//! | **Session** | The in-memory aggregate for one transcript file |
//! | **Delta** | New events since the last observation plus a full agent snapshot |
//! | **Aggregate** | The merged, bounded feed across all sessions |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::format::{short_path, summarize};

/// Id of the implicit root agent of every session
pub const ROOT_AGENT_ID: &str = "main";

// ============================================
// Events
// ============================================

/// Kind of a normalized event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Agent spawned a subagent
    Spawn,
    /// Extended thinking block
    Think,
    /// Generic tool invocation
    ToolCall,
    /// Successful tool output
    ToolResult,
    /// File written for the first time in this session
    FileCreate,
    /// File modified
    FileUpdate,
    /// File read
    FileRead,
    /// Shell command
    Bash,
    /// Web search or fetch
    WebSearch,
    /// Assistant prose
    Text,
    /// Failed tool result or runtime error marker
    Error,
    /// Completion marker
    Complete,
    /// Human prompt
    User,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Spawn => "spawn",
            EventType::Think => "think",
            EventType::ToolCall => "tool_call",
            EventType::ToolResult => "tool_result",
            EventType::FileCreate => "file_create",
            EventType::FileUpdate => "file_update",
            EventType::FileRead => "file_read",
            EventType::Bash => "bash",
            EventType::WebSearch => "web_search",
            EventType::Text => "text",
            EventType::Error => "error",
            EventType::Complete => "complete",
            EventType::User => "user",
        }
    }

    /// Whether events of this type reference a file path
    pub fn is_file_event(&self) -> bool {
        matches!(
            self,
            EventType::FileCreate | EventType::FileUpdate | EventType::FileRead
        )
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spawn" => Ok(EventType::Spawn),
            "think" => Ok(EventType::Think),
            "tool_call" => Ok(EventType::ToolCall),
            "tool_result" => Ok(EventType::ToolResult),
            "file_create" => Ok(EventType::FileCreate),
            "file_update" => Ok(EventType::FileUpdate),
            "file_read" => Ok(EventType::FileRead),
            "bash" => Ok(EventType::Bash),
            "web_search" => Ok(EventType::WebSearch),
            "text" => Ok(EventType::Text),
            "error" => Ok(EventType::Error),
            "complete" => Ok(EventType::Complete),
            "user" => Ok(EventType::User),
            _ => Err(format!("unknown event type: {}", s)),
        }
    }
}

/// A normalized unit of agent activity.
///
/// Events are immutable once built; the `with_*` builders are only used by
/// decoders while constructing them. `summary` and `short_path` are derived
/// at construction time so consumers never recompute them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// RFC 3339 timestamp copied verbatim from the record
    pub timestamp: String,
    pub agent_id: String,
    /// Full text, may be large
    pub content: String,
    /// Short single-line label
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
}

impl Event {
    pub fn new(
        event_type: EventType,
        timestamp: impl Into<String>,
        agent_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        Self {
            event_type,
            timestamp: timestamp.into(),
            agent_id: agent_id.into(),
            summary: summarize(&content),
            content,
            file_path: None,
            short_path: None,
            tool_name: None,
            input_tokens: 0,
            output_tokens: 0,
            cache_read_tokens: 0,
        }
    }

    /// Replace the derived summary with an explicit one (still truncated)
    pub fn with_summary(mut self, summary: &str) -> Self {
        self.summary = summarize(summary);
        self
    }

    pub fn with_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        if path.is_empty() {
            return self;
        }
        self.short_path = Some(short_path(&path));
        self.file_path = Some(path);
        self
    }

    pub fn with_tokens(mut self, usage: TokenUsage) -> Self {
        self.input_tokens = usage.input;
        self.output_tokens = usage.output;
        self.cache_read_tokens = usage.cache_read;
        self
    }

    pub fn tokens(&self) -> TokenUsage {
        TokenUsage {
            input: self.input_tokens,
            output: self.output_tokens,
            cache_read: self.cache_read_tokens,
        }
    }
}

/// Token counts attached to a record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
}

impl TokenUsage {
    pub fn is_zero(&self) -> bool {
        self.input == 0 && self.output == 0 && self.cache_read == 0
    }
}

// ============================================
// Agents
// ============================================

/// The root agent of a session or one of its subagents.
///
/// Token counters only ever grow; they are updated by events attributed to
/// this agent and are independent of how many events a session retains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    /// Palette color derived from `id`
    pub color: String,
    pub is_subagent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Timestamp of the first event attributed to this agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_time: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
}

impl Agent {
    pub fn is_root(&self) -> bool {
        self.id == ROOT_AGENT_ID
    }

    pub fn tokens(&self) -> TokenUsage {
        TokenUsage {
            input: self.input_tokens,
            output: self.output_tokens,
            cache_read: self.cache_read_tokens,
        }
    }
}

// ============================================
// Sessions
// ============================================

/// Snapshot of one transcript file's aggregate.
///
/// Produced by [`SessionStore::snapshot`](crate::session::SessionStore::snapshot);
/// owning copies are handed to consumers so nobody reads live state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Stable identity key
    pub file_path: PathBuf,
    /// `sessionId` from the records, or the file stem
    pub session_id: String,
    /// Parent directory name of the transcript
    pub project: String,
    pub slug: String,
    pub branch: String,
    pub version: String,
    pub cwd: String,
    pub agents: BTreeMap<String, Agent>,
    /// Retained events, oldest first
    pub events: Vec<Event>,
    /// Events ever appended, including evicted ones
    pub total_events: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// False once the file vanished from disk
    pub present: bool,
}

impl Session {
    /// A session is active while its file exists and changed within `window`
    pub fn is_active(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        match self.last_modified {
            Some(modified) if self.present => now.signed_duration_since(modified) < window,
            _ => false,
        }
    }

    pub fn summary(&self, now: DateTime<Utc>, window: chrono::Duration) -> SessionSummary {
        let mut totals = TokenUsage::default();
        for agent in self.agents.values() {
            totals.input = totals.input.saturating_add(agent.input_tokens);
            totals.output = totals.output.saturating_add(agent.output_tokens);
            totals.cache_read = totals.cache_read.saturating_add(agent.cache_read_tokens);
        }

        SessionSummary {
            file_path: self.file_path.clone(),
            session_id: self.session_id.clone(),
            project: self.project.clone(),
            slug: self.slug.clone(),
            branch: self.branch.clone(),
            agent_count: self.agents.len().max(1),
            event_count: self.total_events,
            last_modified: self.last_modified,
            is_active: self.is_active(now, window),
            total_input_tokens: totals.input,
            total_output_tokens: totals.output,
            total_cache_tokens: totals.cache_read,
        }
    }
}

/// Lightweight listing entry; carries no event bodies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub file_path: PathBuf,
    pub session_id: String,
    pub project: String,
    pub slug: String,
    pub branch: String,
    pub agent_count: usize,
    pub event_count: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cache_tokens: u64,
}

// ============================================
// Feed messages
// ============================================

/// Why a full snapshot was sent instead of a delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResyncReason {
    /// First parse of a newly tracked file
    Initial,
    /// The file shrank and was re-parsed from offset 0
    Truncated,
}

/// New events since the last observation plus the full agent map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub events: Vec<Event>,
    pub agents: BTreeMap<String, Agent>,
    /// Events ever appended to the session after this delta
    pub total_events: u64,
}

/// Message pushed to per-session subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    /// Replace everything you hold with this snapshot
    Full {
        reason: ResyncReason,
        session: Session,
    },
    /// Append these events
    Delta(Delta),
}

impl FeedMessage {
    pub fn is_full(&self) -> bool {
        matches!(self, FeedMessage::Full { .. })
    }

    /// Events carried by this message, in file order
    pub fn events(&self) -> &[Event] {
        match self {
            FeedMessage::Full { session, .. } => &session.events,
            FeedMessage::Delta(delta) => &delta.events,
        }
    }

    pub fn agents(&self) -> &BTreeMap<String, Agent> {
        match self {
            FeedMessage::Full { session, .. } => &session.agents,
            FeedMessage::Delta(delta) => &delta.agents,
        }
    }

    /// Whether a session snapshot holding `total_events` events already
    /// includes this message. Only deltas can be covered; a `Full` always
    /// replaces.
    pub fn covered_by(&self, total_events: u64) -> bool {
        match self {
            FeedMessage::Full { .. } => false,
            FeedMessage::Delta(delta) => delta.total_events <= total_events,
        }
    }
}

/// An event tagged with the session it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectEvent {
    pub project: String,
    pub file_path: PathBuf,
    #[serde(flatten)]
    pub event: Event,
}

/// Message pushed to all-sessions subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateDelta {
    pub events: Vec<ProjectEvent>,
    /// Every agent seen so far, keyed by `project:agent_id`
    pub agents: BTreeMap<String, Agent>,
    pub session_count: usize,
}
