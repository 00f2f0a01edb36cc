//! Ingestion layer: raw transcript bytes to session state
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────┐     ┌──────────────────┐     ┌──────────────┐
//! │ Transcript file │ ──► │  TailCursor  │ ──► │  RecordDecoder   │ ──► │ SessionStore │
//! │ (~/.claude/...) │     │ (new lines)  │     │  └─ ClaudeCode   │     │ (+ registry) │
//! └─────────────────┘     └──────────────┘     └──────────────────┘     └──────────────┘
//! ```
//!
//! The live watcher drives these pieces on a timer; [`parse_transcript`]
//! runs the same [`LiveSession::poll`](crate::live::LiveSession::poll) once
//! over a whole file. Every line goes through [`decode_lines`], so a file
//! tailed in any number of steps ends up in the same state as a file parsed
//! in one pass.

pub mod cursor;
pub mod decoder;
pub mod parsers;

pub use cursor::{Advance, TailCursor};
pub use decoder::{Decoded, RecordDecoder, RecordMeta, ToolTaxonomy, TranscriptFormat};
pub use parsers::{create_decoder, detect_format};

use crate::config::Config;
use crate::error::Result;
use crate::live::LiveSession;
use crate::session::SessionStore;
use crate::types::{Event, Session};
use chrono::{DateTime, Utc};
use std::path::Path;

/// Counters for one batch of lines
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LineStats {
    /// Lines decoded successfully
    pub decoded: u64,
    /// Lines that failed to decode and were skipped
    pub skipped: u64,
    /// Events appended to the store
    pub events: u64,
}

/// Decode `lines` into `store`, copying every new event into `fresh`.
///
/// `first_line` is the 1-based number of the first line, used only in log
/// messages. A line that fails to decode is logged and skipped.
pub fn decode_lines(
    decoder: &mut dyn RecordDecoder,
    store: &mut SessionStore,
    lines: &[String],
    first_line: u64,
    fresh: &mut Vec<Event>,
) -> LineStats {
    let mut stats = LineStats::default();

    for (idx, line) in lines.iter().enumerate() {
        let line_number = first_line + idx as u64;
        match decoder.decode(line, line_number) {
            Ok(decoded) => {
                stats.decoded += 1;
                fresh.extend(decoded.events.iter().cloned());
                stats.events += store.apply(decoded) as u64;
            }
            Err(e) => {
                stats.skipped += 1;
                tracing::warn!(
                    file = %store.file_path().display(),
                    line = line_number,
                    error = %e,
                    "Skipping undecodable line"
                );
            }
        }
    }

    stats
}

/// Pick a decoder for `path`; files without markers yet are Claude Code.
pub fn decoder_for(path: &Path, config: &Config) -> Result<Box<dyn RecordDecoder>> {
    let format = detect_format(path)?.unwrap_or(TranscriptFormat::ClaudeCode);
    create_decoder(format, &config.decoder)
}

/// Modification time of a file as UTC
pub(crate) fn modified_at(path: &Path) -> Result<DateTime<Utc>> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(modified))
}

/// Parse a whole transcript in one pass.
///
/// Subagent transcripts of the session are included. A trailing line without
/// its newline is not, matching what a live watcher would have ingested at
/// the same moment.
pub fn parse_transcript(path: &Path, config: &Config) -> Result<Session> {
    let mut live = LiveSession::open(path, config)?;
    live.poll()?;
    if !live.is_present() {
        return Err(std::io::Error::from(std::io::ErrorKind::NotFound).into());
    }

    let stats = live.stats();
    tracing::debug!(
        file = %path.display(),
        lines = stats.lines_decoded,
        skipped = stats.lines_skipped,
        events = stats.events_appended,
        subagents = live.subagent_files().count(),
        "Parsed transcript"
    );

    Ok(live.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventType, ROOT_AGENT_ID};
    use std::io::Write;

    #[test]
    fn test_parse_transcript_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("-home-dev-app");
        std::fs::create_dir_all(&project).unwrap();
        let path = project.join("s1.jsonl");

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, r#"{{"type":"user","sessionId":"s1","timestamp":"2025-01-01T00:00:00Z","message":{{"content":"fix the bug"}}}}"#).unwrap();
        writeln!(file, "{{broken").unwrap();
        writeln!(file, r#"{{"type":"assistant","sessionId":"s1","message":{{"content":[{{"type":"text","text":"On it"}}]}}}}"#).unwrap();
        write!(file, r#"{{"type":"user","message""#).unwrap();
        drop(file);

        let session = parse_transcript(&path, &Config::default()).unwrap();
        assert_eq!(session.project, "-home-dev-app");
        assert_eq!(session.session_id, "s1");
        assert_eq!(session.events.len(), 2);
        assert_eq!(session.events[0].event_type, EventType::User);
        assert_eq!(session.events[1].event_type, EventType::Text);
        assert!(session.agents.contains_key(ROOT_AGENT_ID));
        assert!(session.last_modified.is_some());
    }

    #[test]
    fn test_parse_transcript_tolerates_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s1.jsonl");

        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"{\"type\":\"user\",\"message\":{\"content\":\"caf\xe9\"}}\n")
            .unwrap();
        writeln!(file, r#"{{"type":"user","sessionId":"s1","message":{{"content":"second"}}}}"#).unwrap();
        drop(file);

        let session = parse_transcript(&path, &Config::default()).unwrap();
        assert_eq!(session.events.len(), 2);
        assert_eq!(session.events[0].content, "caf\u{fffd}");
        assert_eq!(session.events[1].content, "second");
    }

    #[test]
    fn test_parse_transcript_includes_subagent_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s1.jsonl");
        std::fs::write(
            &path,
            "{\"type\":\"user\",\"sessionId\":\"s1\",\"message\":{\"content\":\"look around\"}}\n",
        )
        .unwrap();
        let subagents = dir.path().join("s1").join("subagents");
        std::fs::create_dir_all(&subagents).unwrap();
        std::fs::write(
            subagents.join("agent-c0ffee1.jsonl"),
            "{\"type\":\"assistant\",\"requestId\":\"r1\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"found it\"}],\"usage\":{\"input_tokens\":12,\"output_tokens\":3}}}\n",
        )
        .unwrap();

        let session = parse_transcript(&path, &Config::default()).unwrap();
        assert_eq!(session.events.len(), 2);
        assert_eq!(session.events[1].agent_id, "c0ffee1");

        let agent = &session.agents["c0ffee1"];
        assert!(agent.is_subagent);
        assert_eq!(agent.parent_id.as_deref(), Some(ROOT_AGENT_ID));
        assert_eq!(agent.input_tokens, 12);
        assert_eq!(agent.output_tokens, 3);
    }

    #[test]
    fn test_parse_transcript_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(parse_transcript(&dir.path().join("nope.jsonl"), &Config::default()).is_err());
    }

    #[test]
    fn test_parse_transcript_rejects_codex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollout.jsonl");
        std::fs::write(&path, "{\"type\":\"session_meta\",\"payload\":{}}\n").unwrap();
        assert!(matches!(
            parse_transcript(&path, &Config::default()),
            Err(crate::Error::UnsupportedFormat(_))
        ));
    }
}
