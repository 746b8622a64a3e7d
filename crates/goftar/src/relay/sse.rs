//! Incremental SSE parsing
//!
//! Upstream network reads split the `data: <json>\n\n` wire format at
//! arbitrary byte boundaries. Two small accumulators put it back together:
//! [`LineBuffer`] reassembles lines across reads, and [`JsonAccumulator`]
//! reassembles one JSON payload split across several `data:` lines.

use serde_json::Value;

/// Reassembles complete lines from arbitrarily-chunked reads
///
/// Accumulates raw bytes and splits on `\n` at the byte level, so a
/// multi-byte UTF-8 character cut in half by a chunk boundary is made
/// whole again before any decoding happens. Only complete lines are
/// decoded (a `\n` byte never occurs inside a multi-byte sequence).
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network read; returns the complete lines it unlocked.
    /// An incomplete trailing line is retained for the next read.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line);
            lines.push(text.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }

    /// Take whatever trailing partial line is left (at end of stream)
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            let buf = std::mem::take(&mut self.buf);
            Some(String::from_utf8_lossy(&buf).into_owned())
        }
    }
}

/// One parsed SSE line
#[derive(Debug, Clone, PartialEq)]
pub enum SseLine {
    /// Payload of a `data:` line
    Data(String),
    /// The literal `[DONE]` sentinel
    Done,
    /// Blank lines, comments, and any other field
    Ignored,
}

/// Classify a single complete SSE line
pub fn parse_line(line: &str) -> SseLine {
    let Some(data) = line
        .strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))
    else {
        return SseLine::Ignored;
    };
    let data = data.trim();
    if data == "[DONE]" {
        SseLine::Done
    } else if data.is_empty() {
        SseLine::Ignored
    } else {
        SseLine::Data(data.to_string())
    }
}

/// Reassembles one JSON object split across several `data:` lines
///
/// A payload that parses on its own resets any stale partial data, so a
/// fragment that never completes is skipped without poisoning the stream.
#[derive(Debug, Default)]
pub struct JsonAccumulator {
    pending: String,
}

impl JsonAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one `data:` payload; returns a value once one parses
    pub fn feed(&mut self, data: &str) -> Option<Value> {
        if let Ok(value) = serde_json::from_str(data) {
            self.pending.clear();
            return Some(value);
        }
        self.pending.push_str(data);
        match serde_json::from_str(&self.pending) {
            Ok(value) => {
                self.pending.clear();
                Some(value)
            }
            Err(_) => None,
        }
    }

    /// Whether an unfinished fragment is being held
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
