//! Query composition: reference tokens appended to the query and doc-list
//! fields, concept stripping before chat, and the outgoing query string.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// A concept reference as it appears inside a query: space, `c`, digits.
static CONCEPT_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" c[0-9]+\b").expect("Invalid concept regex"));

static CHECKBOX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<input\s[^>]*type="checkbox"[^>]*>"#).expect("Invalid checkbox regex"));

static ELEMENT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bid="([^"]+)""#).expect("Invalid id regex"));

/// Which text field a reference is added to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefField {
    /// The conversational query field (concept references).
    Query,
    /// The doc-list field (document references).
    Docs,
}

/// Add `" " + reference` to `field` when `selected`, otherwise remove its first
/// occurrence. Returns whether the field changed.
///
/// A reference already present is not added twice. Occurrences are matched as
/// whole tokens, so removing `c1` leaves `c12` alone.
pub fn append_reference(field: &mut String, reference: &str, selected: bool) -> bool {
    if reference.is_empty() || reference.contains(char::is_whitespace) {
        return false;
    }
    match (selected, find_reference(field, reference)) {
        (true, Some(_)) | (false, None) => false,
        (true, None) => {
            field.push(' ');
            field.push_str(reference);
            true
        }
        (false, Some(start)) => {
            field.replace_range(start..start + 1 + reference.len(), "");
            true
        }
    }
}

fn find_reference(text: &str, reference: &str) -> Option<usize> {
    let needle = format!(" {reference}");
    text.match_indices(&needle).map(|(i, _)| i).find(|&i| {
        text[i + needle.len()..]
            .chars()
            .next()
            .map_or(true, char::is_whitespace)
    })
}

/// Remove every concept reference (` c123`) from `text`.
pub fn strip_concept_references(text: &str) -> String {
    CONCEPT_REF.replace_all(text, "").into_owned()
}

/// Build the outgoing query from free text and the doc-list field.
/// Returns `None` when nothing but whitespace would be sent.
pub fn compose(free_text: &str, doc_refs: &str) -> Option<String> {
    let query = format!("{free_text} {doc_refs}");
    if query.trim().is_empty() {
        None
    } else {
        Some(query)
    }
}

/// Ids of the selectable checkboxes in a lookup response, in order, without duplicates.
pub fn selectable_references(body: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    CHECKBOX
        .find_iter(body)
        .filter_map(|input| ELEMENT_ID.captures(input.as_str()))
        .map(|caps| caps[1].to_string())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}
