//! Event-stream framing.
//!
//! Both sides of the chat relay speak the same line protocol: each frame is
//! one `data: <payload>` line followed by a blank line, and the stream ends
//! with the literal sentinel `data: [DONE]`.
//!
//! - [`SseDecoder`] turns arbitrary upstream byte chunks into [`Frame`]s,
//!   buffering partial lines across chunk boundaries.
//! - [`StreamEvent::to_frame`] renders caller-facing events.

use serde_json::json;

/// Payload that terminates a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Caller-facing relay event. The terminal event is always [`StreamEvent::Done`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Content(String),
    Error(String),
    Done,
}

impl StreamEvent {
    /// Render as one wire frame, blank-line terminated.
    pub fn to_frame(&self) -> String {
        let payload = match self {
            StreamEvent::Content(text) => json!({ "content": text }).to_string(),
            StreamEvent::Error(message) => json!({ "error": message }).to_string(),
            StreamEvent::Done => DONE_SENTINEL.to_string(),
        };
        format!("data: {}\n\n", payload)
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StreamEvent::Done)
    }
}

/// One decoded `data:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(String),
    Done,
}

/// Incremental decoder for `data:` lines.
///
/// Lines other than `data:` (comments, `event:`, `id:`, blank separators)
/// are ignored. A trailing `\r` is tolerated.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.pending[consumed..].iter().position(|b| *b == b'\n') {
            let line_end = consumed + offset;
            if let Some(frame) = parse_line(&self.pending[consumed..line_end]) {
                frames.push(frame);
            }
            consumed = line_end + 1;
        }
        self.pending.drain(..consumed);
        frames
    }

    /// Flush a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<Frame> {
        let line = std::mem::take(&mut self.pending);
        parse_line(&line)
    }
}

fn parse_line(raw: &[u8]) -> Option<Frame> {
    // Splitting on b'\n' never cuts a multi-byte character.
    let line = String::from_utf8_lossy(raw);
    let line = line.strip_suffix('\r').unwrap_or(&line);
    let payload = line.strip_prefix("data:")?;
    let payload = payload.strip_prefix(' ').unwrap_or(payload);

    if payload == DONE_SENTINEL {
        Some(Frame::Done)
    } else {
        Some(Frame::Data(payload.to_string()))
    }
}
