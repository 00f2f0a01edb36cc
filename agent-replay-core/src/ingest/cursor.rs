//! Tail cursor
//!
//! Turns "the file grew" into "these complete lines arrived". Bytes after the
//! last newline stay buffered until their newline shows up, so a record that
//! is still being written is never decoded, and every complete line is handed
//! out exactly once.

use crate::error::Result;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Lines produced by one [`TailCursor::advance`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Advance {
    /// Complete, non-blank lines in file order (newline and trailing CR removed)
    pub lines: Vec<String>,
    /// The file shrank; the cursor restarted from offset 0 and `lines`
    /// come from the beginning of the file
    pub reset: bool,
}

/// Per-file read position.
#[derive(Debug, Default, Clone)]
pub struct TailCursor {
    /// Complete lines handed out (blank lines included)
    lines_consumed: u64,
    /// End of the last complete line
    byte_offset: u64,
    /// End of the bytes read so far (`byte_offset` + partial line)
    read_offset: u64,
    /// Trailing bytes without a newline yet
    partial: Vec<u8>,
    /// File size observed on the previous advance
    seen_size: u64,
}

impl TailCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn byte_offset(&self) -> u64 {
        self.byte_offset
    }

    pub fn lines_consumed(&self) -> u64 {
        self.lines_consumed
    }

    /// Bytes buffered from an incomplete trailing line
    pub fn partial_len(&self) -> usize {
        self.partial.len()
    }

    /// Forget all progress; the next advance starts at offset 0
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Read whatever was appended to `path` since the last call.
    pub fn advance(&mut self, path: &Path) -> Result<Advance> {
        let mut file = File::open(path)?;
        let size = file.metadata()?.len();
        self.advance_from(&mut file, size)
    }

    /// Read appended bytes from `reader`, whose current length is `current_size`.
    pub fn advance_from<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        current_size: u64,
    ) -> Result<Advance> {
        let mut reset = false;
        if current_size < self.seen_size {
            tracing::info!(
                previous_size = self.seen_size,
                current_size,
                "File shrank, restarting from offset 0"
            );
            self.reset();
            reset = true;
        }
        self.seen_size = current_size;

        if current_size <= self.read_offset {
            return Ok(Advance {
                lines: Vec::new(),
                reset,
            });
        }

        reader.seek(SeekFrom::Start(self.read_offset))?;
        let mut chunk = Vec::new();
        reader
            .by_ref()
            .take(current_size - self.read_offset)
            .read_to_end(&mut chunk)?;
        self.read_offset += chunk.len() as u64;

        let mut buffer = std::mem::take(&mut self.partial);
        buffer.extend_from_slice(&chunk);

        let mut lines = Vec::new();
        let mut start = 0usize;
        for (idx, byte) in buffer.iter().enumerate() {
            if *byte != b'\n' {
                continue;
            }
            let raw = String::from_utf8_lossy(&buffer[start..idx]);
            start = idx + 1;
            self.lines_consumed += 1;

            let line = raw.trim_end_matches('\r');
            if !line.trim().is_empty() {
                lines.push(line.to_string());
            }
        }

        self.byte_offset += start as u64;
        self.partial = buffer.split_off(start);

        Ok(Advance { lines, reset })
    }
}
