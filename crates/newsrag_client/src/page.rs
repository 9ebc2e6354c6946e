//! The client's view state: input fields, input discipline, display surface,
//! transcript and indicators.

use crate::compose::{self, RefField};

/// Shown in the display when a submission has nothing to ask.
pub const PROMPT_FOR_INPUT: &str = "<h1>Sorry? Please ask a question!</h1>";
/// Shown when the environment cannot open an answer stream.
pub const STREAMING_UNSUPPORTED_NOTICE: &str =
    "Sorry: this client cannot receive streamed answers.";

/// How the query field collects input. Exactly two values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputDiscipline {
    #[default]
    Typed,
    File,
}

impl InputDiscipline {
    pub fn toggled(self) -> Self {
        match self {
            InputDiscipline::Typed => InputDiscipline::File,
            InputDiscipline::File => InputDiscipline::Typed,
        }
    }
}

/// Append-only log of rendered past exchanges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    entries: Vec<String>,
}

impl Transcript {
    pub fn push(&mut self, entry: String) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Concatenated markup, oldest first.
    pub fn render(&self) -> String {
        self.entries.concat()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Conversational query field; concept references are appended here.
    pub query: String,
    /// Doc-list field; document references are appended here.
    pub docs: String,
    pub input: InputDiscipline,
    /// Current answer or lookup result.
    pub display: String,
    pub history: Transcript,
    pub waiting: bool,
    /// Blocking notice for fatal conditions.
    pub notice: Option<String>,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field_mut(&mut self, field: RefField) -> &mut String {
        match field {
            RefField::Query => &mut self.query,
            RefField::Docs => &mut self.docs,
        }
    }

    /// Select or deselect a reference in the given field.
    pub fn append_reference(&mut self, field: RefField, reference: &str, selected: bool) -> bool {
        compose::append_reference(self.field_mut(field), reference, selected)
    }

    pub fn toggle_input(&mut self) {
        self.input = self.input.toggled();
    }

    pub(crate) fn prompt_for_input(&mut self) {
        self.display = PROMPT_FOR_INPUT.to_string();
        self.waiting = false;
    }
}
