//! Answer stream framing. The `/answer` endpoint sends `text/event-stream`
//! events; each event payload is either a sentinel (`open`, `close`) or a
//! content token. Events are decoded into [`Frame`] here so nothing
//! downstream compares raw strings.

use std::fmt;

/// Payload sent by the server before the first content token.
pub const OPEN_SENTINEL: &str = "open";
/// Payload sent by the server after the last content token.
pub const CLOSE_SENTINEL: &str = "close";
/// Line-break marker the server puts in content tokens instead of `\n`.
pub const LINE_BREAK_MARKER: &str = "<br/>";

/// One decoded answer-stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Open,
    Content(String),
    Close,
}

/// Frame discriminant, used in protocol errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Open,
    Content,
    Close,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameKind::Open => "open",
            FrameKind::Content => "content",
            FrameKind::Close => "close",
        };
        f.write_str(name)
    }
}

impl Frame {
    /// Classify an untyped payload: the sentinels are reserved, anything else is content.
    pub fn from_payload(payload: String) -> Self {
        match payload.as_str() {
            OPEN_SENTINEL => Frame::Open,
            CLOSE_SENTINEL => Frame::Close,
            _ => Frame::Content(payload),
        }
    }

    /// Classify an event that may carry an explicit `event:` type.
    /// `token` events are content even when the payload spells a sentinel.
    pub fn from_event(event: Option<&str>, payload: String) -> Self {
        match event {
            Some("open") => Frame::Open,
            Some("close") => Frame::Close,
            Some("token") => Frame::Content(payload),
            _ => Frame::from_payload(payload),
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Open => FrameKind::Open,
            Frame::Content(_) => FrameKind::Content,
            Frame::Close => FrameKind::Close,
        }
    }
}

/// Incremental event-stream decoder. Bytes may be pushed in arbitrary chunks;
/// complete events come out as frames in arrival order.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    data: Option<String>,
    event: Option<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the response body and return the frames it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// True when bytes or a partial event are buffered. They are dropped at end of stream.
    pub fn has_pending(&self) -> bool {
        !self.buf.is_empty() || self.data.is_some() || self.event.is_some()
    }

    fn line(&mut self, line: &str) -> Option<Frame> {
        if line.is_empty() {
            let event = self.event.take();
            return self
                .data
                .take()
                .map(|payload| Frame::from_event(event.as_deref(), payload));
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => match self.data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            "event" => self.event = Some(value.to_string()),
            _ => {}
        }
        None
    }
}
