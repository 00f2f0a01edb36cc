//! Claude Code JSONL decoder
//!
//! Decodes session transcripts from `~/.claude/projects/[encoded-path]/*.jsonl`.
//!
//! # Error Handling
//!
//! - **Malformed JSON lines**: returned as [`Error::Decode`]; the caller logs
//!   and skips the line.
//! - **Missing fields**: defaulted via `#[serde(default)]`; block fields also
//!   accept `null`.
//! - **Unknown record kinds and content blocks**: decoded to nothing.
//! - **Malformed content blocks** (non-objects, wrong field types): skipped
//!   one by one; the rest of the record still decodes.
//!
//! # Token accounting
//!
//! Claude Code writes one line per content block of an API response, each
//! repeating the response's `usage`. Usage is therefore counted once per
//! request (keyed by `requestId`, else `message.id`) and attached to the first
//! event that request produces.

use crate::error::{Error, Result};
use crate::format::first_line;
use crate::ingest::decoder::{
    AgentUsage, Decoded, RecordDecoder, RecordMeta, SpawnLink, ToolTaxonomy, TranscriptFormat,
};
use crate::types::{Event, EventType, TokenUsage, ROOT_AGENT_ID};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Decoder for Claude Code transcripts.
#[derive(Debug, Default)]
pub struct ClaudeCodeDecoder {
    taxonomy: ToolTaxonomy,
    /// Paths touched by file events so far
    seen_paths: HashSet<String>,
    /// Request keys whose usage was already counted
    counted_requests: HashSet<String>,
    /// Tool names of calls still waiting for their result
    open_calls: HashMap<String, String>,
    /// Spawn calls waiting for the agent id in their result
    pending_spawns: HashMap<String, PendingSpawn>,
    /// Owner of records without `agentId`; root when unset
    default_agent: Option<String>,
}

#[derive(Debug, Clone)]
struct PendingSpawn {
    parent_id: String,
    name: Option<String>,
}

impl ClaudeCodeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder with a custom tool table
    pub fn with_taxonomy(taxonomy: ToolTaxonomy) -> Self {
        Self {
            taxonomy,
            ..Self::default()
        }
    }
}

// ============================================
// Raw JSONL record types (serde deserialization)
// ============================================

/// Discriminant of a transcript line
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
enum RecordKind {
    User,
    Assistant,
    System,
    Summary,
    Result,
    /// file-history-snapshot, progress, queue-operation, ...
    #[serde(other)]
    Other,
}

/// Represents a single line from Claude Code JSONL.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawRecord {
    #[serde(rename = "type")]
    kind: Option<RecordKind>,
    #[serde(alias = "session_id")]
    session_id: Option<String>,
    timestamp: Option<String>,
    cwd: Option<String>,
    version: Option<String>,
    git_branch: Option<String>,
    slug: Option<String>,
    agent_id: Option<String>,
    request_id: Option<String>,
    message: Option<RawMessage>,
    tool_use_result: Option<Value>,

    // summary / result / system markers
    summary: Option<String>,
    subtype: Option<String>,
    level: Option<String>,
    content: Option<Value>,
    result: Option<String>,
    #[serde(alias = "is_error")]
    is_error: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    id: Option<String>,
    content: Option<RawContent>,
    usage: Option<RawUsage>,
}

/// `message.content`: a plain string or a list of blocks.
///
/// Blocks stay as raw values and are parsed one at a time by
/// [`RawContent::blocks`], so one odd element cannot sink the whole line.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Blocks(Vec<Value>),
    Other(Value),
}

impl RawContent {
    /// Blocks that parse; anything else is skipped
    fn blocks(&self) -> Vec<ContentBlock> {
        match self {
            RawContent::Blocks(items) => items
                .iter()
                .filter_map(|item| ContentBlock::deserialize(item).ok())
                .collect(),
            RawContent::Text(_) | RawContent::Other(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        #[serde(default)]
        text: Option<String>,
    },
    Thinking {
        #[serde(default)]
        thinking: Option<String>,
    },
    ToolUse {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: Option<String>,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: Option<bool>,
    },
    // image, redacted_thinking, ...
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
    cache_read_input_tokens: Option<u64>,
}

impl From<&RawUsage> for TokenUsage {
    fn from(raw: &RawUsage) -> Self {
        TokenUsage {
            input: raw.input_tokens.unwrap_or(0),
            output: raw.output_tokens.unwrap_or(0),
            cache_read: raw.cache_read_input_tokens.unwrap_or(0),
        }
    }
}

impl RecordDecoder for ClaudeCodeDecoder {
    fn format(&self) -> TranscriptFormat {
        TranscriptFormat::ClaudeCode
    }

    fn decode(&mut self, line: &str, line_number: u64) -> Result<Decoded> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Decoded::default());
        }

        let record: RawRecord = serde_json::from_str(line).map_err(|e| Error::Decode {
            line: line_number,
            message: e.to_string(),
        })?;

        let mut decoded = Decoded {
            meta: record_meta(&record),
            ..Decoded::default()
        };

        let agent_id = record
            .agent_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or(self.default_agent.as_deref())
            .unwrap_or(ROOT_AGENT_ID)
            .to_string();
        let timestamp = record.timestamp.clone().unwrap_or_default();

        match record.kind.unwrap_or(RecordKind::Other) {
            RecordKind::User => self.decode_user(&record, &agent_id, &timestamp, &mut decoded),
            RecordKind::Assistant => {
                self.decode_assistant(&record, &agent_id, &timestamp, &mut decoded)
            }
            RecordKind::Result => {
                let text = record.result.clone().unwrap_or_default();
                let failed = record.is_error.unwrap_or(false)
                    || record
                        .subtype
                        .as_deref()
                        .is_some_and(|s| s.starts_with("error"));
                let kind = if failed {
                    EventType::Error
                } else {
                    EventType::Complete
                };
                decoded
                    .events
                    .push(Event::new(kind, timestamp, agent_id, text));
            }
            RecordKind::Summary => {
                let text = record.summary.clone().unwrap_or_default();
                decoded.events.push(Event::new(
                    EventType::Complete,
                    timestamp,
                    agent_id,
                    text,
                ));
            }
            RecordKind::System => {
                let is_error = record.level.as_deref() == Some("error")
                    || record.subtype.as_deref() == Some("api_error");
                if is_error {
                    let text = record.content.as_ref().map(value_text).unwrap_or_default();
                    decoded
                        .events
                        .push(Event::new(EventType::Error, timestamp, agent_id, text));
                }
            }
            RecordKind::Other => {}
        }

        Ok(decoded)
    }

    fn reset(&mut self) {
        self.seen_paths.clear();
        self.counted_requests.clear();
        self.open_calls.clear();
        self.pending_spawns.clear();
    }

    fn set_default_agent(&mut self, agent_id: &str) {
        self.default_agent = Some(agent_id.to_string()).filter(|id| !id.is_empty());
    }
}

impl ClaudeCodeDecoder {
    fn decode_user(
        &mut self,
        record: &RawRecord,
        agent_id: &str,
        timestamp: &str,
        decoded: &mut Decoded,
    ) {
        let Some(content) = record.message.as_ref().and_then(|m| m.content.as_ref()) else {
            return;
        };

        if let RawContent::Text(text) = content {
            if !text.trim().is_empty() {
                decoded
                    .events
                    .push(Event::new(EventType::User, timestamp, agent_id, text.clone()));
            }
            return;
        }

        for block in content.blocks() {
            match block {
                ContentBlock::Text { text: Some(text) } if !text.trim().is_empty() => {
                    decoded
                        .events
                        .push(Event::new(EventType::User, timestamp, agent_id, text));
                }
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => {
                    let kind = if is_error.unwrap_or(false) {
                        EventType::Error
                    } else {
                        EventType::ToolResult
                    };
                    let tool_use_id = tool_use_id.unwrap_or_default();
                    let mut event = Event::new(kind, timestamp, agent_id, value_text(&content));
                    if let Some(tool_name) = self.open_calls.remove(&tool_use_id) {
                        event = event.with_tool(tool_name);
                    }
                    decoded.events.push(event);

                    if let Some(link) = self.spawn_link(record, &tool_use_id, agent_id) {
                        decoded.spawns.push(link);
                    }
                }
                _ => {}
            }
        }
    }

    /// Link a finished spawn call to the agent id its result reports
    fn spawn_link(
        &mut self,
        record: &RawRecord,
        tool_use_id: &str,
        caller_id: &str,
    ) -> Option<SpawnLink> {
        let pending = self.pending_spawns.remove(tool_use_id);
        let new_id = record
            .tool_use_result
            .as_ref()
            .and_then(|r| r.get("agentId"))
            .and_then(Value::as_str)?;

        let (parent_id, name) = match pending {
            Some(p) => (p.parent_id, p.name),
            None => (caller_id.to_string(), None),
        };
        Some(SpawnLink {
            parent_id,
            agent_id: new_id.to_string(),
            name,
        })
    }

    fn decode_assistant(
        &mut self,
        record: &RawRecord,
        agent_id: &str,
        timestamp: &str,
        decoded: &mut Decoded,
    ) {
        let Some(message) = record.message.as_ref() else {
            return;
        };

        // Only the first line of a request carries its usage
        let usage: TokenUsage = message.usage.as_ref().map(Into::into).unwrap_or_default();
        let request_key = record.request_id.clone().or_else(|| message.id.clone());
        let first_sighting = match request_key {
            Some(key) => self.counted_requests.insert(key),
            None => true,
        };
        let mut unclaimed = if first_sighting {
            usage
        } else {
            TokenUsage::default()
        };

        let mut push = |event: Event, decoded: &mut Decoded| {
            let event = event.with_tokens(std::mem::take(&mut unclaimed));
            decoded.events.push(event);
        };

        match message.content.as_ref() {
            Some(RawContent::Text(text)) => {
                let text = text.trim();
                if !text.is_empty() {
                    push(
                        Event::new(EventType::Text, timestamp, agent_id, text),
                        decoded,
                    );
                }
            }
            Some(content) => {
                for block in content.blocks() {
                    match block {
                        ContentBlock::Thinking {
                            thinking: Some(thinking),
                        } if !thinking.trim().is_empty() => {
                            push(
                                Event::new(EventType::Think, timestamp, agent_id, thinking),
                                decoded,
                            );
                        }
                        ContentBlock::Text { text: Some(text) } if !text.trim().is_empty() => {
                            push(
                                Event::new(EventType::Text, timestamp, agent_id, text.trim()),
                                decoded,
                            );
                        }
                        ContentBlock::ToolUse { id, name, input } => {
                            let event = self.tool_event(
                                id.as_deref().unwrap_or_default(),
                                name.as_deref().unwrap_or_default(),
                                &input,
                                agent_id,
                                timestamp,
                            );
                            push(event, decoded);
                        }
                        _ => {}
                    }
                }
            }
            None => {}
        }

        if !unclaimed.is_zero() {
            decoded.usage = Some(AgentUsage {
                agent_id: agent_id.to_string(),
                usage: unclaimed,
            });
        }
    }

    fn tool_event(
        &mut self,
        id: &str,
        name: &str,
        input: &Value,
        agent_id: &str,
        timestamp: &str,
    ) -> Event {
        if !id.is_empty() {
            self.open_calls.insert(id.to_string(), name.to_string());
        }

        let event = match self.taxonomy.classify(name) {
            EventType::Bash => {
                let command = str_field(input, &["command", "cmd"]).unwrap_or_default();
                Event::new(EventType::Bash, timestamp, agent_id, command)
                    .with_summary(&first_line(command))
            }
            kind @ (EventType::FileCreate | EventType::FileUpdate | EventType::FileRead) => {
                let path = str_field(input, &["file_path", "notebook_path", "path"])
                    .unwrap_or_default()
                    .to_string();
                let kind = if kind == EventType::FileCreate && self.seen_paths.contains(&path) {
                    EventType::FileUpdate
                } else {
                    kind
                };
                if !path.is_empty() {
                    self.seen_paths.insert(path.clone());
                }
                Event::new(kind, timestamp, agent_id, path.clone()).with_file(path)
            }
            EventType::WebSearch => {
                let target = str_field(input, &["query", "url"]).unwrap_or_default();
                Event::new(EventType::WebSearch, timestamp, agent_id, target)
            }
            EventType::Spawn => {
                let description = str_field(input, &["description", "prompt"])
                    .unwrap_or_default()
                    .to_string();
                if !id.is_empty() {
                    let name = (!description.is_empty())
                        .then(|| description.clone())
                        .or_else(|| str_field(input, &["subagent_type"]).map(str::to_string));
                    self.pending_spawns.insert(
                        id.to_string(),
                        PendingSpawn {
                            parent_id: agent_id.to_string(),
                            name,
                        },
                    );
                }
                Event::new(EventType::Spawn, timestamp, agent_id, description)
            }
            kind => {
                let content = str_field(input, &["pattern", "query", "url"])
                    .map(str::to_string)
                    .unwrap_or_else(|| compact_input(input));
                Event::new(kind, timestamp, agent_id, content)
            }
        };

        event.with_tool(name)
    }
}

fn record_meta(record: &RawRecord) -> RecordMeta {
    let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
    RecordMeta {
        session_id: non_empty(&record.session_id),
        slug: non_empty(&record.slug),
        branch: non_empty(&record.git_branch),
        version: non_empty(&record.version),
        cwd: non_empty(&record.cwd),
        timestamp: non_empty(&record.timestamp),
    }
}

/// First string-valued field among `keys`
fn str_field<'a>(input: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| input.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

fn compact_input(input: &Value) -> String {
    match input {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Text of a tool result or marker payload: strings as-is, block lists joined
fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                if item.get("type").and_then(Value::as_str) == Some("text") {
                    item.get("text").and_then(Value::as_str)
                } else {
                    item.as_str()
                }
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(decoder: &mut ClaudeCodeDecoder, value: Value) -> Decoded {
        decoder.decode(&value.to_string(), 1).expect("decodes")
    }

    fn assistant(request_id: &str, blocks: Value, usage: Value) -> Value {
        json!({
            "type": "assistant",
            "sessionId": "s-1",
            "requestId": request_id,
            "timestamp": "2025-01-01T00:00:01Z",
            "message": {"role": "assistant", "content": blocks, "usage": usage}
        })
    }

    fn tool_use(id: &str, name: &str, input: Value) -> Value {
        json!([{"type": "tool_use", "id": id, "name": name, "input": input}])
    }

    #[test]
    fn test_user_text() {
        let mut decoder = ClaudeCodeDecoder::new();
        let decoded = decode(
            &mut decoder,
            json!({
                "type": "user",
                "sessionId": "s-1",
                "slug": "happy-otter",
                "gitBranch": "main",
                "version": "2.0.1",
                "timestamp": "2025-01-01T00:00:00Z",
                "message": {"role": "user", "content": "Hello there"}
            }),
        );

        assert_eq!(decoded.events.len(), 1);
        let event = &decoded.events[0];
        assert_eq!(event.event_type, EventType::User);
        assert_eq!(event.agent_id, ROOT_AGENT_ID);
        assert_eq!(event.content, "Hello there");
        assert_eq!(decoded.meta.slug.as_deref(), Some("happy-otter"));
        assert_eq!(decoded.meta.branch.as_deref(), Some("main"));
        assert_eq!(decoded.meta.version.as_deref(), Some("2.0.1"));
    }

    #[test]
    fn test_blank_user_text_is_skipped() {
        let mut decoder = ClaudeCodeDecoder::new();
        let decoded = decode(
            &mut decoder,
            json!({"type": "user", "message": {"content": "   "}}),
        );
        assert!(decoded.events.is_empty());
    }

    #[test]
    fn test_bash_summary_is_first_line() {
        let mut decoder = ClaudeCodeDecoder::new();
        let decoded = decode(
            &mut decoder,
            assistant(
                "r1",
                tool_use("t1", "Bash", json!({"command": "cd src\ncargo test", "description": "run tests"})),
                json!({}),
            ),
        );

        let event = &decoded.events[0];
        assert_eq!(event.event_type, EventType::Bash);
        assert_eq!(event.content, "cd src\ncargo test");
        assert_eq!(event.summary, "cd src");
        assert_eq!(event.tool_name.as_deref(), Some("Bash"));
    }

    #[test]
    fn test_write_create_then_update() {
        let mut decoder = ClaudeCodeDecoder::new();
        let input = json!({"file_path": "/home/dev/app/src/lib.rs", "content": "x"});

        let first = decode(&mut decoder, assistant("r1", tool_use("t1", "Write", input.clone()), json!({})));
        let second = decode(&mut decoder, assistant("r2", tool_use("t2", "Write", input), json!({})));

        assert_eq!(first.events[0].event_type, EventType::FileCreate);
        assert_eq!(second.events[0].event_type, EventType::FileUpdate);
        assert_eq!(first.events[0].short_path.as_deref(), Some("…/src/lib.rs"));
    }

    #[test]
    fn test_read_marks_path_seen() {
        let mut decoder = ClaudeCodeDecoder::new();
        let input = json!({"file_path": "README.md"});
        let read = decode(&mut decoder, assistant("r1", tool_use("t1", "Read", input.clone()), json!({})));
        let write = decode(&mut decoder, assistant("r2", tool_use("t2", "Write", input), json!({})));

        assert_eq!(read.events[0].event_type, EventType::FileRead);
        assert_eq!(write.events[0].event_type, EventType::FileUpdate);
    }

    #[test]
    fn test_tool_classification() {
        let mut decoder = ClaudeCodeDecoder::new();
        let cases = [
            ("Grep", json!({"pattern": "fn main"}), EventType::ToolCall, "fn main"),
            ("WebSearch", json!({"query": "tokio select"}), EventType::WebSearch, "tokio select"),
            ("WebFetch", json!({"url": "https://docs.rs"}), EventType::WebSearch, "https://docs.rs"),
            ("TodoWrite", json!({"todos": []}), EventType::ToolCall, "{\"todos\":[]}"),
        ];

        for (i, (name, input, kind, content)) in cases.into_iter().enumerate() {
            let decoded = decode(
                &mut decoder,
                assistant(&format!("r{}", i), tool_use(&format!("t{}", i), name, input), json!({})),
            );
            assert_eq!(decoded.events[0].event_type, kind, "tool {}", name);
            assert_eq!(decoded.events[0].content, content, "tool {}", name);
        }
    }

    #[test]
    fn test_usage_counted_once_per_request() {
        let mut decoder = ClaudeCodeDecoder::new();
        let usage = json!({"input_tokens": 100, "output_tokens": 20, "cache_read_input_tokens": 7});

        let first = decode(
            &mut decoder,
            assistant("req-1", json!([{"type": "thinking", "thinking": "hmm"}]), usage.clone()),
        );
        let second = decode(
            &mut decoder,
            assistant("req-1", json!([{"type": "text", "text": "Done."}]), usage),
        );

        assert_eq!(first.events[0].input_tokens, 100);
        assert_eq!(first.events[0].output_tokens, 20);
        assert_eq!(first.events[0].cache_read_tokens, 7);
        assert_eq!(second.events[0].input_tokens, 0);
        assert!(first.usage.is_none());
        assert!(second.usage.is_none());
    }

    #[test]
    fn test_usage_without_events_is_returned() {
        let mut decoder = ClaudeCodeDecoder::new();
        let decoded = decode(
            &mut decoder,
            assistant("req-9", json!([]), json!({"input_tokens": 5, "output_tokens": 1})),
        );
        assert!(decoded.events.is_empty());
        let usage = decoded.usage.expect("usage kept");
        assert_eq!(usage.agent_id, ROOT_AGENT_ID);
        assert_eq!(usage.usage.input, 5);
    }

    #[test]
    fn test_only_first_event_of_record_carries_tokens() {
        let mut decoder = ClaudeCodeDecoder::new();
        let decoded = decode(
            &mut decoder,
            assistant(
                "req-2",
                json!([
                    {"type": "text", "text": "Looking"},
                    {"type": "tool_use", "id": "t1", "name": "Read", "input": {"file_path": "a.rs"}}
                ]),
                json!({"input_tokens": 3, "output_tokens": 4}),
            ),
        );
        assert_eq!(decoded.events.len(), 2);
        assert_eq!(decoded.events[0].input_tokens, 3);
        assert_eq!(decoded.events[1].input_tokens, 0);
    }

    #[test]
    fn test_tool_result_and_error() {
        let mut decoder = ClaudeCodeDecoder::new();
        decode(&mut decoder, assistant("r1", tool_use("t1", "Bash", json!({"command": "ls"})), json!({})));

        let decoded = decode(
            &mut decoder,
            json!({
                "type": "user",
                "message": {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "t1", "content": [{"type": "text", "text": "a.txt"}, {"type": "text", "text": "b.txt"}]},
                    {"type": "tool_result", "tool_use_id": "t9", "content": "boom", "is_error": true}
                ]}
            }),
        );

        assert_eq!(decoded.events.len(), 2);
        assert_eq!(decoded.events[0].event_type, EventType::ToolResult);
        assert_eq!(decoded.events[0].content, "a.txt\nb.txt");
        assert_eq!(decoded.events[0].tool_name.as_deref(), Some("Bash"));
        assert_eq!(decoded.events[1].event_type, EventType::Error);
        assert!(decoded.events[1].tool_name.is_none());
    }

    #[test]
    fn test_spawn_links_agent_from_result() {
        let mut decoder = ClaudeCodeDecoder::new();
        let spawn = decode(
            &mut decoder,
            assistant(
                "r1",
                tool_use("task-1", "Task", json!({"description": "Explore codebase", "prompt": "look around"})),
                json!({}),
            ),
        );
        assert_eq!(spawn.events[0].event_type, EventType::Spawn);
        assert_eq!(spawn.events[0].content, "Explore codebase");

        let result = decode(
            &mut decoder,
            json!({
                "type": "user",
                "toolUseResult": {"agentId": "a4767a09", "status": "completed"},
                "message": {"content": [{"type": "tool_result", "tool_use_id": "task-1", "content": "done"}]}
            }),
        );
        assert_eq!(
            result.spawns,
            vec![SpawnLink {
                parent_id: ROOT_AGENT_ID.to_string(),
                agent_id: "a4767a09".to_string(),
                name: Some("Explore codebase".to_string()),
            }]
        );
    }

    #[test]
    fn test_sidechain_records_attributed_to_agent() {
        let mut decoder = ClaudeCodeDecoder::new();
        let decoded = decode(
            &mut decoder,
            json!({
                "type": "assistant",
                "isSidechain": true,
                "agentId": "a4767a09",
                "message": {"content": [{"type": "text", "text": "sub work"}]}
            }),
        );
        assert_eq!(decoded.events[0].agent_id, "a4767a09");
    }

    #[test]
    fn test_markers() {
        let mut decoder = ClaudeCodeDecoder::new();
        let done = decode(
            &mut decoder,
            json!({"type": "result", "subtype": "success", "is_error": false, "result": "All tests pass", "session_id": "s-2"}),
        );
        assert_eq!(done.events[0].event_type, EventType::Complete);
        assert_eq!(done.events[0].content, "All tests pass");
        assert_eq!(done.meta.session_id.as_deref(), Some("s-2"));

        let failed = decode(
            &mut decoder,
            json!({"type": "result", "subtype": "error_max_turns", "result": ""}),
        );
        assert_eq!(failed.events[0].event_type, EventType::Error);

        let summary = decode(
            &mut decoder,
            json!({"type": "summary", "summary": "Refactor parser", "leafUuid": "u"}),
        );
        assert_eq!(summary.events[0].event_type, EventType::Complete);

        let api_error = decode(
            &mut decoder,
            json!({"type": "system", "level": "error", "content": "overloaded"}),
        );
        assert_eq!(api_error.events[0].event_type, EventType::Error);
        assert_eq!(api_error.events[0].content, "overloaded");

        let info = decode(
            &mut decoder,
            json!({"type": "system", "subtype": "compact_boundary", "content": "compacted"}),
        );
        assert!(info.events.is_empty());
    }

    #[test]
    fn test_unknown_kinds_and_blocks_are_ignored() {
        let mut decoder = ClaudeCodeDecoder::new();
        let snapshot = decode(
            &mut decoder,
            json!({"type": "file-history-snapshot", "messageId": "m", "snapshot": {}}),
        );
        assert!(snapshot.events.is_empty());

        let untyped = decode(&mut decoder, json!({"foo": "bar"}));
        assert!(untyped.events.is_empty());

        let image = decode(
            &mut decoder,
            json!({"type": "assistant", "message": {"content": [{"type": "image", "source": {}}]}}),
        );
        assert!(image.events.is_empty());
    }

    #[test]
    fn test_stray_block_keeps_siblings() {
        let mut decoder = ClaudeCodeDecoder::new();
        let decoded = decode(
            &mut decoder,
            assistant(
                "r1",
                json!(["stray", 7, {"type": "text", "text": "valid text"}, {"type": "tool_use", "id": 3}]),
                json!({"input_tokens": 2}),
            ),
        );

        assert_eq!(decoded.events.len(), 1);
        assert_eq!(decoded.events[0].event_type, EventType::Text);
        assert_eq!(decoded.events[0].content, "valid text");
        assert_eq!(decoded.events[0].input_tokens, 2);
    }

    #[test]
    fn test_null_block_fields() {
        let mut decoder = ClaudeCodeDecoder::new();
        let decoded = decode(
            &mut decoder,
            json!({
                "type": "user",
                "message": {"content": [
                    {"type": "tool_result", "tool_use_id": "t1", "content": "ok", "is_error": null},
                    {"type": "text", "text": null},
                    {"type": "text", "text": "follow-up"}
                ]}
            }),
        );

        assert_eq!(decoded.events.len(), 2);
        assert_eq!(decoded.events[0].event_type, EventType::ToolResult);
        assert_eq!(decoded.events[0].content, "ok");
        assert_eq!(decoded.events[1].event_type, EventType::User);

        let thinking = decode(
            &mut decoder,
            assistant("r2", json!([{"type": "thinking", "thinking": null}, {"type": "tool_use", "id": null, "name": "Read", "input": {"file_path": "a.rs"}}]), json!({})),
        );
        assert_eq!(thinking.events.len(), 1);
        assert_eq!(thinking.events[0].event_type, EventType::FileRead);
    }

    #[test]
    fn test_non_list_content_decodes_to_nothing() {
        let mut decoder = ClaudeCodeDecoder::new();
        let decoded = decode(
            &mut decoder,
            json!({"type": "assistant", "message": {"content": {"odd": true}}}),
        );
        assert!(decoded.events.is_empty());
    }

    #[test]
    fn test_default_agent_owns_unmarked_records() {
        let mut decoder = ClaudeCodeDecoder::new();
        decoder.set_default_agent("b7e2c91f");

        let unmarked = decode(
            &mut decoder,
            json!({"type": "assistant", "message": {"content": [{"type": "text", "text": "sub work"}]}}),
        );
        assert_eq!(unmarked.events[0].agent_id, "b7e2c91f");

        let marked = decode(
            &mut decoder,
            json!({"type": "assistant", "agentId": "other", "message": {"content": [{"type": "text", "text": "x"}]}}),
        );
        assert_eq!(marked.events[0].agent_id, "other");

        decoder.reset();
        let after_reset = decode(&mut decoder, json!({"type": "user", "message": {"content": "go"}}));
        assert_eq!(after_reset.events[0].agent_id, "b7e2c91f");
    }

    #[test]
    fn test_malformed_line_is_error() {
        let mut decoder = ClaudeCodeDecoder::new();
        let err = decoder.decode("{\"type\": \"user\", ", 42).unwrap_err();
        assert!(matches!(err, Error::Decode { line: 42, .. }));
        assert!(decoder.decode("", 43).unwrap().events.is_empty());
    }

    #[test]
    fn test_reset_forgets_seen_paths() {
        let mut decoder = ClaudeCodeDecoder::new();
        let input = json!({"file_path": "a.rs"});
        decode(&mut decoder, assistant("r1", tool_use("t1", "Write", input.clone()), json!({})));
        decoder.reset();
        let again = decode(&mut decoder, assistant("r1", tool_use("t1", "Write", input), json!({"input_tokens": 1})));
        assert_eq!(again.events[0].event_type, EventType::FileCreate);
        assert_eq!(again.events[0].input_tokens, 1);
    }
}
