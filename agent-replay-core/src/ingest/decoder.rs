//! Record decoder abstraction
//!
//! All transcript decoders implement the [`RecordDecoder`] trait: one raw line
//! in, zero or more normalized [`Event`]s out, plus the side information the
//! session store needs (metadata, token usage, spawn links).
//!
//! ## Design Principles
//!
//! 1. **Per-line isolation**: a bad line yields `Err` for that line only; the
//!    caller logs it and moves on
//! 2. **Closed kinds**: raw record kinds are enums with an ignore arm, so new
//!    upstream record types never break decoding
//! 3. **Deterministic**: decoding the same lines in the same order always
//!    yields the same events

use crate::error::Result;
use crate::types::{Event, EventType, TokenUsage};
use std::collections::HashMap;

/// Transcript formats the decoders know about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptFormat {
    ClaudeCode,
    Codex,
}

impl TranscriptFormat {
    pub fn display_name(&self) -> &'static str {
        match self {
            TranscriptFormat::ClaudeCode => "Claude Code",
            TranscriptFormat::Codex => "Codex",
        }
    }
}

impl std::fmt::Display for TranscriptFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Session metadata carried by a record. Every field is optional; the
/// session store keeps the first non-empty value it sees.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecordMeta {
    pub session_id: Option<String>,
    pub slug: Option<String>,
    pub branch: Option<String>,
    pub version: Option<String>,
    pub cwd: Option<String>,
    pub timestamp: Option<String>,
}

/// A subagent link discovered while decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnLink {
    pub parent_id: String,
    pub agent_id: String,
    pub name: Option<String>,
}

/// Token usage that no event carried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentUsage {
    pub agent_id: String,
    pub usage: TokenUsage,
}

/// Everything one line decoded into.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Decoded {
    /// Visible events, in block order
    pub events: Vec<Event>,
    pub meta: RecordMeta,
    /// Usage to credit directly to an agent (record produced no events)
    pub usage: Option<AgentUsage>,
    /// Spawn links to apply before the events
    pub spawns: Vec<SpawnLink>,
}

/// Trait implemented by all transcript decoders.
///
/// A decoder instance belongs to one session: it remembers which paths were
/// written, which requests were already counted and which spawn calls are
/// still waiting for their agent id.
pub trait RecordDecoder: Send + Sync {
    /// Which format this decoder handles
    fn format(&self) -> TranscriptFormat;

    /// Decode one line. `line_number` is only used in error messages.
    ///
    /// Unknown record kinds decode to an empty [`Decoded`]; only lines that
    /// are not valid records at all return `Err`.
    fn decode(&mut self, line: &str, line_number: u64) -> Result<Decoded>;

    /// Drop per-session state (after the file was truncated)
    fn reset(&mut self);

    /// Agent that records without their own agent id belong to.
    ///
    /// Defaults to the root agent; a decoder reading a subagent's own
    /// transcript is pointed at that subagent. Survives [`reset`](Self::reset).
    fn set_default_agent(&mut self, agent_id: &str);
}

/// Mapping from tool names to event types.
///
/// The table is a heuristic over the agent runtime's tool set, so it is data
/// rather than code: defaults below, overridable from `[decoder.tool_kinds]`.
/// Tools classified as [`EventType::FileCreate`] become
/// [`EventType::FileUpdate`] when the path was already seen in the session.
#[derive(Debug, Clone)]
pub struct ToolTaxonomy {
    kinds: HashMap<String, EventType>,
}

impl ToolTaxonomy {
    /// Claude Code's built-in tools
    pub fn claude_code() -> Self {
        let kinds = [
            ("Bash", EventType::Bash),
            ("Read", EventType::FileRead),
            ("Write", EventType::FileCreate),
            ("Edit", EventType::FileUpdate),
            ("MultiEdit", EventType::FileUpdate),
            ("NotebookEdit", EventType::FileUpdate),
            ("Glob", EventType::ToolCall),
            ("Grep", EventType::ToolCall),
            ("WebSearch", EventType::WebSearch),
            ("WebFetch", EventType::WebSearch),
            ("Task", EventType::Spawn),
            ("Agent", EventType::Spawn),
        ]
        .into_iter()
        .map(|(name, kind)| (name.to_string(), kind))
        .collect();
        Self { kinds }
    }

    /// Merge overrides over the current table
    pub fn with_overrides(mut self, overrides: &HashMap<String, EventType>) -> Self {
        for (name, kind) in overrides {
            self.kinds.insert(name.clone(), *kind);
        }
        self
    }

    /// Event type for a tool; unknown tools are generic tool calls
    pub fn classify(&self, tool_name: &str) -> EventType {
        self.kinds
            .get(tool_name)
            .copied()
            .unwrap_or(EventType::ToolCall)
    }
}

impl Default for ToolTaxonomy {
    fn default() -> Self {
        Self::claude_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_taxonomy() {
        let taxonomy = ToolTaxonomy::default();
        assert_eq!(taxonomy.classify("Bash"), EventType::Bash);
        assert_eq!(taxonomy.classify("Write"), EventType::FileCreate);
        assert_eq!(taxonomy.classify("Edit"), EventType::FileUpdate);
        assert_eq!(taxonomy.classify("Task"), EventType::Spawn);
        assert_eq!(taxonomy.classify("WebFetch"), EventType::WebSearch);
        assert_eq!(taxonomy.classify("mcp__github__list"), EventType::ToolCall);
    }

    #[test]
    fn test_taxonomy_overrides() {
        let mut overrides = HashMap::new();
        overrides.insert("shell".to_string(), EventType::Bash);
        overrides.insert("Grep".to_string(), EventType::FileRead);

        let taxonomy = ToolTaxonomy::claude_code().with_overrides(&overrides);
        assert_eq!(taxonomy.classify("shell"), EventType::Bash);
        assert_eq!(taxonomy.classify("Grep"), EventType::FileRead);
        assert_eq!(taxonomy.classify("Bash"), EventType::Bash);
    }
}
