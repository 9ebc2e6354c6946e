//! Display rendering: the markdown transform applied to a finished answer,
//! and escaping for text echoed into the display.

use pulldown_cmark::{html, Options, Parser};

use crate::frame::LINE_BREAK_MARKER;

/// Turns accumulated answer text into display markup. Must be side-effect free.
pub trait Render {
    fn render(&self, text: &str) -> String;
}

impl<F> Render for F
where
    F: Fn(&str) -> String,
{
    fn render(&self, text: &str) -> String {
        self(text)
    }
}

/// CommonMark to HTML, with tables and strikethrough enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl Render for MarkdownRenderer {
    fn render(&self, text: &str) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        let parser = Parser::new_ext(text, options);
        let mut out = String::with_capacity(text.len() * 3 / 2);
        html::push_html(&mut out, parser);
        out
    }
}

/// Collapse the server's `<br/>` markers back into newlines.
pub fn line_breaks_to_newlines(text: &str) -> String {
    text.replace(LINE_BREAK_MARKER, "\n")
}

/// Escape text for inclusion in display markup.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
