//! Controller: owns the page and at most one in-flight operation (an answer
//! session or a lookup), applies stream frames and lookup results to the page.
//!
//! The synchronous methods (`submit`, `handle_frame`, `begin_lookup`,
//! `finish_lookup`) hold all state transitions; `chat` and `lookup` drive them
//! over a [`Client`].

use std::mem;
use std::path::Path;
use std::time::Duration;

use crate::client::{Client, LookupKind, LookupOutcome};
use crate::compose::{self, RefField};
use crate::error::ChatError;
use crate::frame::Frame;
use crate::page::{InputDiscipline, Page, STREAMING_UNSUPPORTED_NOTICE};
use crate::render::{MarkdownRenderer, Render};
use crate::session::{Session, SessionState};

/// What the environment can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Can open server-sent event streams.
    pub event_stream: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self { event_stream: true }
    }
}

/// Effect of one applied frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Previous display archived and cleared.
    Opened,
    /// Token appended to the display.
    Token(String),
    /// Exchange finalized; the session is released in its terminal state.
    Closed { record: String, session: Session },
}

#[derive(Debug)]
enum Activity {
    Idle,
    Session(Session),
    Lookup(LookupKind),
}

pub struct Controller<R = MarkdownRenderer> {
    page: Page,
    activity: Activity,
    renderer: R,
    capabilities: Capabilities,
}

impl Controller<MarkdownRenderer> {
    pub fn new() -> Self {
        Self::with_renderer(MarkdownRenderer)
    }
}

impl Default for Controller<MarkdownRenderer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Render> Controller<R> {
    pub fn with_renderer(renderer: R) -> Self {
        Self {
            page: Page::new(),
            activity: Activity::Idle,
            renderer,
            capabilities: Capabilities::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut Page {
        &mut self.page
    }

    /// State of the current session; `Idle` when none is in flight.
    pub fn state(&self) -> SessionState {
        match &self.activity {
            Activity::Session(session) => session.state(),
            _ => SessionState::Idle,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match &self.activity {
            Activity::Session(session) => Some(session),
            _ => None,
        }
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self.activity, Activity::Idle)
    }

    pub fn toggle_input(&mut self) {
        self.page.toggle_input();
        tracing::debug!(input = ?self.page.input, "input discipline toggled");
    }

    pub fn append_reference(&mut self, field: RefField, reference: &str, selected: bool) -> bool {
        self.page.append_reference(field, reference, selected)
    }

    /// Validate the page and start a session. Returns the query to stream.
    ///
    /// Concept references are stripped from the query field first; the doc-list
    /// field is appended after a single space.
    pub fn submit(&mut self) -> Result<String, ChatError> {
        if self.is_busy() {
            return Err(ChatError::Busy);
        }
        self.page.waiting = true;
        if !self.capabilities.event_stream {
            self.page.notice = Some(STREAMING_UNSUPPORTED_NOTICE.to_string());
            self.page.waiting = false;
            return Err(ChatError::StreamingUnsupported);
        }
        if self.page.input == InputDiscipline::File {
            self.page.prompt_for_input();
            return Err(ChatError::FileInput);
        }
        self.page.query = compose::strip_concept_references(&self.page.query);
        let Some(query) = compose::compose(&self.page.query, &self.page.docs) else {
            self.page.prompt_for_input();
            return Err(ChatError::EmptyQuery);
        };
        tracing::info!(%query, "session submitted");
        self.activity = Activity::Session(Session::open(query.clone()));
        Ok(query)
    }

    /// Apply one frame of the current session's stream.
    /// A frame the session cannot accept aborts the session.
    pub fn handle_frame(&mut self, frame: Frame) -> Result<SessionUpdate, ChatError> {
        let Activity::Session(session) = &mut self.activity else {
            return Err(ChatError::NoSession);
        };
        tracing::debug!(kind = %frame.kind(), state = %session.state(), "frame");
        if let Err(e) = session.advance(&frame) {
            let err = ChatError::from(e);
            self.abort_session(&err);
            return Err(err);
        }
        match frame {
            Frame::Open => {
                let previous = mem::take(&mut self.page.display);
                if !previous.is_empty() {
                    self.page.history.push(previous);
                }
                self.page.waiting = true;
                Ok(SessionUpdate::Opened)
            }
            Frame::Content(token) => {
                self.page.display.push_str(&token);
                Ok(SessionUpdate::Token(token))
            }
            Frame::Close => {
                let record = session.record(&self.renderer);
                let session = session.clone();
                self.activity = Activity::Idle;
                self.page.display = record.clone();
                self.page.waiting = false;
                self.page.query.clear();
                tracing::info!(query = %session.query(), "session closed");
                Ok(SessionUpdate::Closed { record, session })
            }
        }
    }

    /// End the current session without a close frame. Partial content stays on display.
    pub fn abort_session(&mut self, reason: &ChatError) {
        if let Activity::Session(session) = mem::replace(&mut self.activity, Activity::Idle) {
            tracing::warn!(query = %session.query(), state = %session.state(), error = %reason, "session aborted");
            self.page.waiting = false;
            self.page.notice = Some(reason.to_string());
        }
    }

    /// Start a lookup. Clears the transcript and returns the query field unchanged,
    /// concept references included. `Upload` needs file-based input.
    pub fn begin_lookup(&mut self, kind: LookupKind) -> Result<String, ChatError> {
        if self.is_busy() {
            return Err(ChatError::Busy);
        }
        if kind == LookupKind::Upload && self.page.input != InputDiscipline::File {
            return Err(ChatError::TypedInput);
        }
        self.page.history.clear();
        self.page.waiting = true;
        self.activity = Activity::Lookup(kind);
        Ok(self.page.query.clone())
    }

    /// Put a lookup result on the display.
    pub fn finish_lookup(&mut self, outcome: &LookupOutcome) -> Result<(), ChatError> {
        let Activity::Lookup(kind) = self.activity else {
            return Err(ChatError::NoLookup);
        };
        self.activity = Activity::Idle;
        self.page.display = outcome.display_text().to_string();
        self.page.waiting = false;
        if kind.reverts_input() {
            self.page.input = InputDiscipline::Typed;
        }
        tracing::info!(?kind, success = outcome.is_success(), "lookup finished");
        Ok(())
    }

    /// Submit the page and stream the answer, calling `on_update` after each frame.
    /// Returns the finalized record.
    ///
    /// With `idle_timeout`, a gap between frames longer than it aborts the session.
    pub async fn chat<F>(
        &mut self,
        client: &Client,
        idle_timeout: Option<Duration>,
        mut on_update: F,
    ) -> Result<String, ChatError>
    where
        F: FnMut(&SessionUpdate),
    {
        let query = self.submit()?;
        let mut stream = match client.open_answer(&query).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail(e.into())),
        };
        loop {
            let next = match idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, stream.next_frame()).await {
                    Ok(next) => next,
                    Err(_) => return Err(self.fail(ChatError::IdleTimeout(limit.as_secs()))),
                },
                None => stream.next_frame().await,
            };
            let frame = match next {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(self.fail(e.into())),
                None => return Err(self.fail(ChatError::StreamEnded)),
            };
            let update = self.handle_frame(frame)?;
            on_update(&update);
            if let SessionUpdate::Closed { record, .. } = update {
                return Ok(record);
            }
        }
    }

    /// Run a lookup end to end. For `Upload` the query field holds the file path.
    pub async fn lookup(
        &mut self,
        client: &Client,
        kind: LookupKind,
    ) -> Result<LookupOutcome, ChatError> {
        let query = self.begin_lookup(kind)?;
        let outcome = match kind {
            LookupKind::Upload => client.upload(Path::new(&query)).await,
            _ => client.lookup(kind, &query).await,
        };
        self.finish_lookup(&outcome)?;
        Ok(outcome)
    }

    fn fail(&mut self, err: ChatError) -> ChatError {
        self.abort_session(&err);
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PROMPT_FOR_INPUT;

    fn plain(s: &str) -> String {
        format!("[{s}]")
    }

    fn controller() -> Controller<fn(&str) -> String> {
        Controller::with_renderer(plain as fn(&str) -> String)
    }

    fn run(c: &mut Controller<fn(&str) -> String>, frames: &[&str]) -> Vec<SessionUpdate> {
        frames
            .iter()
            .map(|payload| {
                c.handle_frame(Frame::from_payload(payload.to_string()))
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn full_session_archives_then_finalizes() {
        let mut c = controller();
        c.page_mut().display = "earlier".into();
        c.page_mut().query = "why".into();
        assert_eq!(c.submit().unwrap(), "why ");
        assert_eq!(c.state(), SessionState::Opening);

        run(&mut c, &["open"]);
        assert_eq!(c.page().history.entries(), ["earlier"]);
        assert_eq!(c.page().display, "");
        assert!(c.page().waiting);

        run(&mut c, &["A", "B"]);
        assert_eq!(c.page().display, "AB");

        let updates = run(&mut c, &["close"]);
        let SessionUpdate::Closed { record, session } = &updates[0] else {
            panic!("expected close, got {updates:?}");
        };
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(
            record,
            "<hr><br/><b>Your question:</b> <i>why </i>\n[AB]<br/><hr>\n"
        );
        assert_eq!(&c.page().display, record);
        assert!(!c.page().waiting);
        assert_eq!(c.page().query, "");
        assert_eq!(c.state(), SessionState::Idle);
    }

    #[test]
    fn second_session_moves_first_record_into_history() {
        let mut c = controller();
        c.page_mut().query = "one".into();
        c.submit().unwrap();
        let updates = run(&mut c, &["open", "first", "close"]);
        let SessionUpdate::Closed { record: r1, .. } = updates[2].clone() else {
            panic!("expected close");
        };
        assert!(c.page().history.is_empty());

        c.page_mut().query = "two".into();
        c.submit().unwrap();
        run(&mut c, &["open"]);
        assert_eq!(c.page().history.entries(), [r1]);
        run(&mut c, &["second"]);
        assert_eq!(c.page().display, "second");
    }

    #[test]
    fn empty_query_is_refused_without_session() {
        let mut c = controller();
        c.page_mut().history.push("kept".into());
        assert!(matches!(c.submit(), Err(ChatError::EmptyQuery)));
        assert_eq!(c.page().display, PROMPT_FOR_INPUT);
        assert!(!c.page().waiting);
        assert_eq!(c.page().history.entries(), ["kept"]);
        assert!(!c.is_busy());
    }

    #[test]
    fn concept_only_query_is_empty_after_stripping() {
        let mut c = controller();
        c.page_mut().query = " c12 c4".into();
        assert!(matches!(c.submit(), Err(ChatError::EmptyQuery)));
        assert_eq!(c.page().query, "");
    }

    #[test]
    fn file_input_is_refused() {
        let mut c = controller();
        c.page_mut().query = "/tmp/doc.txt".into();
        c.toggle_input();
        assert!(matches!(c.submit(), Err(ChatError::FileInput)));
        assert_eq!(c.page().display, PROMPT_FOR_INPUT);
        assert_eq!(c.state(), SessionState::Idle);
    }

    #[test]
    fn unsupported_environment_sets_notice() {
        let mut c = controller().with_capabilities(Capabilities {
            event_stream: false,
        });
        c.page_mut().query = "q".into();
        assert!(matches!(c.submit(), Err(ChatError::StreamingUnsupported)));
        assert_eq!(
            c.page().notice.as_deref(),
            Some(STREAMING_UNSUPPORTED_NOTICE)
        );
        assert!(!c.is_busy());
    }

    #[test]
    fn concept_refs_stripped_but_docs_kept() {
        let mut c = controller();
        c.page_mut().query = "cancer".into();
        c.append_reference(RefField::Query, "c12", true);
        c.append_reference(RefField::Docs, "ep123", true);
        assert_eq!(c.submit().unwrap(), "cancer  ep123");
    }

    #[test]
    fn concurrent_submit_is_rejected() {
        let mut c = controller();
        c.page_mut().query = "q".into();
        c.submit().unwrap();
        c.page_mut().query = "other".into();
        assert!(matches!(c.submit(), Err(ChatError::Busy)));
        assert!(matches!(c.begin_lookup(LookupKind::Search), Err(ChatError::Busy)));
        assert_eq!(c.session().map(Session::query), Some("q "));
    }

    #[test]
    fn content_before_open_aborts_session() {
        let mut c = controller();
        c.page_mut().query = "q".into();
        c.submit().unwrap();
        let err = c.handle_frame(Frame::Content("x".into())).unwrap_err();
        assert!(matches!(err, ChatError::Protocol(_)));
        assert_eq!(c.state(), SessionState::Idle);
        assert!(!c.page().waiting);
        assert!(c.page().notice.is_some());
    }

    #[test]
    fn frame_without_session_is_an_error() {
        let mut c = controller();
        assert!(matches!(
            c.handle_frame(Frame::Open),
            Err(ChatError::NoSession)
        ));
    }

    #[test]
    fn search_clears_history_and_reverts_input() {
        let mut c = controller();
        c.page_mut().history.push("old".into());
        c.page_mut().query = "cancer c3".into();
        c.toggle_input();
        assert_eq!(c.begin_lookup(LookupKind::Search).unwrap(), "cancer c3");
        assert!(c.page().history.is_empty());
        assert!(c.page().waiting);
        c.finish_lookup(&LookupOutcome::Body("<ul><li>Doc1</li></ul>".into()))
            .unwrap();
        assert_eq!(c.page().display, "<ul><li>Doc1</li></ul>");
        assert_eq!(c.page().input, InputDiscipline::Typed);
        assert!(!c.page().waiting);
    }

    #[test]
    fn expand_failure_keeps_input_discipline() {
        let mut c = controller();
        c.toggle_input();
        c.begin_lookup(LookupKind::Expand).unwrap();
        c.finish_lookup(&LookupOutcome::Failed("Internal Server Error".into()))
            .unwrap();
        assert_eq!(c.page().display, "Internal Server Error");
        assert_eq!(c.page().input, InputDiscipline::File);
        assert!(!c.page().waiting);
    }

    #[test]
    fn upload_needs_file_input() {
        let mut c = controller();
        assert!(matches!(
            c.begin_lookup(LookupKind::Upload),
            Err(ChatError::TypedInput)
        ));
        c.toggle_input();
        assert!(c.begin_lookup(LookupKind::Upload).is_ok());
    }

    #[test]
    fn finish_without_lookup_is_an_error() {
        let mut c = controller();
        assert!(matches!(
            c.finish_lookup(&LookupOutcome::Body(String::new())),
            Err(ChatError::NoLookup)
        ));
    }
}
