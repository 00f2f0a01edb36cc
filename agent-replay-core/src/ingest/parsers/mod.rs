//! Format-specific record decoders
//!
//! Each supported transcript format has a decoder module that implements
//! the [`RecordDecoder`](super::RecordDecoder) trait.
//!
//! ## Supported Formats
//!
//! | Format | Module | Status |
//! |--------|--------|--------|
//! | Claude Code | [`claude`] | ✅ Implemented |
//! | Codex | - | 🔍 Detected, not decoded |

mod claude;

pub use claude::ClaudeCodeDecoder;

use super::decoder::{RecordDecoder, ToolTaxonomy, TranscriptFormat};
use crate::config::DecoderConfig;
use crate::error::{Error, Result};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Leading lines inspected by [`detect_format`]
const DETECT_LINES: usize = 20;

/// Create a decoder for `format` with the configured tool table.
///
/// Returns [`Error::UnsupportedFormat`] for formats that are recognized but
/// have no decoder.
pub fn create_decoder(
    format: TranscriptFormat,
    config: &DecoderConfig,
) -> Result<Box<dyn RecordDecoder>> {
    match format {
        TranscriptFormat::ClaudeCode => {
            let taxonomy = ToolTaxonomy::claude_code().with_overrides(&config.tool_kinds);
            Ok(Box::new(ClaudeCodeDecoder::with_taxonomy(taxonomy)))
        }
        TranscriptFormat::Codex => Err(Error::UnsupportedFormat(format.to_string())),
    }
}

/// Guess the format of a transcript from its first lines.
///
/// Returns `Ok(None)` when no line carries a known marker (typically a file
/// that was just created and is still empty). Invalid UTF-8 is replaced, so a
/// mangled line only fails to match.
pub fn detect_format(path: &Path) -> Result<Option<TranscriptFormat>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut buf = Vec::new();

    for _ in 0..DETECT_LINES {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        if let Some(format) = detect_line(&String::from_utf8_lossy(&buf)) {
            return Ok(Some(format));
        }
    }

    Ok(None)
}

fn detect_line(line: &str) -> Option<TranscriptFormat> {
    let value: Value = serde_json::from_str(line.trim()).ok()?;
    let kind = value.get("type").and_then(Value::as_str).unwrap_or("");

    match kind {
        "file-history-snapshot" => Some(TranscriptFormat::ClaudeCode),
        "user" | "assistant" | "progress" if value.get("sessionId").is_some() => {
            Some(TranscriptFormat::ClaudeCode)
        }
        "session_meta" | "response_item" | "event_msg" | "turn_context" => {
            Some(TranscriptFormat::Codex)
        }
        _ => None,
    }
}
