//! Error types for config, transport, stream protocol and the chat controller.

use crate::frame::FrameKind;
use crate::session::SessionState;

/// Config load/save error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// HTTP transport error.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server answered with status {0}")]
    Status(u16),
}

/// A frame arrived that the session state does not accept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unexpected {frame} frame while session is {state}")]
    UnexpectedFrame {
        frame: FrameKind,
        state: SessionState,
    },
}

/// Errors surfaced by the controller.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("query is empty")]
    EmptyQuery,
    #[error("input is a file selection, not a typed query")]
    FileInput,
    #[error("input is a typed query, not a file selection")]
    TypedInput,
    #[error("streaming answers are not supported in this environment")]
    StreamingUnsupported,
    #[error("another request is already in flight")]
    Busy,
    #[error("no answer session is active")]
    NoSession,
    #[error("no lookup is in flight")]
    NoLookup,
    #[error("no frame received for {0} seconds")]
    IdleTimeout(u64),
    #[error("stream ended before the close frame")]
    StreamEnded,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Transport(#[from] ClientError),
}

impl ChatError {
    /// Input validation failures: recovered locally with a prompt, no request issued.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ChatError::EmptyQuery | ChatError::FileInput | ChatError::TypedInput
        )
    }
}
