//! Message framing for the stdio transport.
//!
//! Two conventions are in use among MCP servers:
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! {"jsonrpc": "2.0", "id": 1, "method": "...", "params": {...}}
//! ```
//!
//! and newline-delimited JSON, one message per line. [`FrameDecoder`] is a
//! pure accumulator: feed it whatever chunks the pipe produced and it hands
//! back every complete message, independent of where the chunks were split.

use std::fmt;
use std::str::FromStr;

use memchr::memmem;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Header marker that starts a Content-Length frame.
const CONTENT_LENGTH_MARKER: &[u8] = b"Content-Length:";

/// Once the buffer grows past this without a complete frame header at its
/// start, it is truncated.
pub const MAX_BUFFER_BYTES: usize = 1024 * 1024;

/// How much of the buffer tail survives truncation.
pub const RETAINED_TAIL_BYTES: usize = 64 * 1024;

/// Framing convention on a stdio stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FramingMode {
    /// `Content-Length` headers followed by a JSON body.
    #[default]
    ContentLength,
    /// One JSON value per line.
    Newline,
}

impl FramingMode {
    /// Config value naming this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContentLength => "content-length",
            Self::Newline => "newline",
        }
    }
}

impl fmt::Display for FramingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FramingMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "content-length" | "contentlength" | "content_length" | "lsp" | "header" => {
                Ok(Self::ContentLength)
            }
            "newline" | "ndjson" | "jsonl" | "line" | "lines" => Ok(Self::Newline),
            other => Err(format!(
                "unknown framing '{other}' (expected 'content-length' or 'newline')"
            )),
        }
    }
}

/// Serialize a message and wrap it for the given framing.
pub fn encode_frame<T: Serialize>(message: &T, mode: FramingMode) -> Result<Vec<u8>> {
    let json = serde_json::to_string(message)?;
    let frame = match mode {
        FramingMode::ContentLength => {
            let mut frame = format!("Content-Length: {}\r\n\r\n", json.len()).into_bytes();
            frame.extend_from_slice(json.as_bytes());
            frame
        }
        FramingMode::Newline => {
            let mut frame = json.into_bytes();
            frame.push(b'\n');
            frame
        }
    };
    Ok(frame)
}

/// Incremental decoder for a stdio byte stream.
#[derive(Debug)]
pub struct FrameDecoder {
    mode: FramingMode,
    buffer: Vec<u8>,
    /// Set once a `Content-Length:` marker has appeared; until then a
    /// Content-Length decoder reads newline-delimited JSON instead.
    seen_header: bool,
}

impl FrameDecoder {
    /// Create a decoder for the given framing.
    pub fn new(mode: FramingMode) -> Self {
        Self {
            mode,
            buffer: Vec::new(),
            seen_header: false,
        }
    }

    /// The configured framing.
    pub fn mode(&self) -> FramingMode {
        self.mode
    }

    /// Bytes currently held back waiting for the rest of a frame.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Append a chunk and return every message it completed.
    ///
    /// Frames that are not valid JSON are dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        match self.mode {
            FramingMode::Newline => {
                self.drain_lines(&mut messages);
                self.enforce_cap();
            }
            FramingMode::ContentLength => {
                if !self.seen_header && memmem::find(&self.buffer, CONTENT_LENGTH_MARKER).is_some()
                {
                    self.seen_header = true;
                }
                if self.seen_header {
                    self.drain_content_length(&mut messages);
                } else {
                    self.drain_lines(&mut messages);
                }
                self.enforce_cap();
            }
        }
        messages
    }

    fn drain_lines(&mut self, messages: &mut Vec<Value>) {
        let mut consumed = 0;
        while let Some(offset) = memchr::memchr(b'\n', &self.buffer[consumed..]) {
            let line = &self.buffer[consumed..consumed + offset];
            consumed += offset + 1;

            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<Value>(line) {
                Ok(value) => messages.push(value),
                Err(e) => tracing::trace!(
                    error = %e,
                    line = %String::from_utf8_lossy(line),
                    "dropping malformed line"
                ),
            }
        }
        self.buffer.drain(..consumed);
    }

    fn drain_content_length(&mut self, messages: &mut Vec<Value>) {
        loop {
            let Some(start) = memmem::find(&self.buffer, CONTENT_LENGTH_MARKER) else {
                return;
            };
            if start > 0 {
                tracing::trace!(bytes = start, "discarding bytes before frame header");
                self.buffer.drain(..start);
            }

            let Some((header_end, body_start)) = find_header_end(&self.buffer) else {
                // Header not complete yet.
                return;
            };

            let Some(length) = parse_content_length(&self.buffer[..header_end]) else {
                tracing::trace!(
                    header = %String::from_utf8_lossy(&self.buffer[..header_end]),
                    "dropping malformed frame header"
                );
                self.buffer.drain(..body_start);
                continue;
            };

            let Some(body_end) = body_start.checked_add(length) else {
                self.buffer.drain(..body_start);
                continue;
            };
            if self.buffer.len() < body_end {
                return;
            }

            match serde_json::from_slice::<Value>(&self.buffer[body_start..body_end]) {
                Ok(value) => messages.push(value),
                Err(e) => tracing::trace!(error = %e, length, "dropping malformed frame body"),
            }
            self.buffer.drain(..body_end);
        }
    }

    fn enforce_cap(&mut self) {
        if self.buffer.len() <= MAX_BUFFER_BYTES || self.awaiting_body() {
            return;
        }
        let cut = self.buffer.len() - RETAINED_TAIL_BYTES;
        tracing::debug!(
            dropped = cut,
            "stdout buffer exceeded limit without a frame header, truncating"
        );
        self.buffer.drain(..cut);
    }

    /// Whether the buffer starts with a complete header whose body is still
    /// arriving.
    fn awaiting_body(&self) -> bool {
        self.mode == FramingMode::ContentLength
            && self.buffer.starts_with(CONTENT_LENGTH_MARKER)
            && find_header_end(&self.buffer).is_some()
    }
}

/// Locate the blank line ending a header block that starts at offset 0.
///
/// Returns `(header_end, body_start)`; both `\r\n\r\n` and `\n\n` are
/// accepted, whichever comes first.
fn find_header_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let crlf = memmem::find(buffer, b"\r\n\r\n").map(|i| (i, i + 4));
    let lf = memmem::find(buffer, b"\n\n").map(|i| (i, i + 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Parse the length out of a header block beginning with the marker.
fn parse_content_length(header: &[u8]) -> Option<usize> {
    let rest = header.strip_prefix(CONTENT_LENGTH_MARKER)?;
    let line_end = memchr::memchr2(b'\r', b'\n', rest).unwrap_or(rest.len());
    std::str::from_utf8(&rest[..line_end]).ok()?.trim().parse().ok()
}
