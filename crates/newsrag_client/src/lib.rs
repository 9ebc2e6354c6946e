//! NewsRAG question-answering client library: query composition, the streamed
//! answer session, search/expand lookups and config.
//! Used by the `newsrag` terminal front-end.

pub mod client;
pub mod compose;
pub mod config;
pub mod controller;
pub mod error;
pub mod frame;
pub mod page;
pub mod render;
pub mod session;

pub use client::{AnswerStream, Client, LookupKind, LookupOutcome};
pub use compose::RefField;
pub use config::{default_config_path, Config, ServerSection, SessionSection};
pub use controller::{Capabilities, Controller, SessionUpdate};
pub use error::{ChatError, ClientError, ConfigError, ProtocolError};
pub use frame::{Frame, FrameDecoder, FrameKind};
pub use page::{InputDiscipline, Page, Transcript};
pub use render::{MarkdownRenderer, Render};
pub use session::{Session, SessionState};
