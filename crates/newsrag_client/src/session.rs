//! One streamed question/answer exchange and its state machine:
//! `Idle -> Opening -> Streaming -> Closed`.

use std::fmt;

use crate::error::ProtocolError;
use crate::frame::{Frame, FrameKind};
use crate::render::{escape_html, line_breaks_to_newlines, Render};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session in flight.
    Idle,
    /// Connection requested, open sentinel not yet received.
    Opening,
    /// Open sentinel received; content tokens accumulate.
    Streaming,
    /// Close sentinel received. Terminal.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Opening => "opening",
            SessionState::Streaming => "streaming",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// State reached by applying a frame of `kind` in `state`.
pub fn transition(state: SessionState, kind: FrameKind) -> Result<SessionState, ProtocolError> {
    match (state, kind) {
        (SessionState::Opening, FrameKind::Open) => Ok(SessionState::Streaming),
        (SessionState::Streaming, FrameKind::Content) => Ok(SessionState::Streaming),
        (SessionState::Streaming, FrameKind::Close) => Ok(SessionState::Closed),
        (state, frame) => Err(ProtocolError::UnexpectedFrame { frame, state }),
    }
}

/// An in-flight exchange. Only the controller creates one, and only while idle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    query: String,
    state: SessionState,
    accumulated: String,
}

impl Session {
    pub(crate) fn open(query: String) -> Self {
        Self {
            query,
            state: SessionState::Opening,
            accumulated: String::new(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Raw content received so far, markers included.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Apply one frame. On error the session is left unchanged.
    pub(crate) fn advance(&mut self, frame: &Frame) -> Result<SessionState, ProtocolError> {
        let next = transition(self.state, frame.kind())?;
        if let Frame::Content(token) = frame {
            self.accumulated.push_str(token);
        }
        self.state = next;
        Ok(next)
    }

    /// The transcript record for this exchange: separator, escaped question,
    /// rendered answer.
    pub fn record(&self, renderer: &impl Render) -> String {
        let answer = renderer.render(&line_breaks_to_newlines(&self.accumulated));
        format!(
            "<hr><br/><b>Your question:</b> <i>{}</i>\n{}<br/><hr>\n",
            escape_html(&self.query),
            answer
        )
    }
}
