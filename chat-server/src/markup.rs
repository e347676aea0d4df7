//! Turns model output into HTML for the browser.
//!
//! Answers that already carry Markdown are rendered as-is. Plain prose gets a
//! little structure first: the opening line becomes a `###` heading when it is
//! short, and every remaining line becomes its own paragraph.

use std::borrow::Cow;
use std::fmt;

use pulldown_cmark::{html, Options, Parser};
use tracing::{debug, warn};

use crate::error::ChatError;

pub const DEFAULT_HEADING_MAX_CHARS: usize = 100;

const MARKUP_INDICATORS: [&str; 7] = ["**", "*", "`", "#", "- ", ">", "|"];

#[derive(Debug, Clone, Copy)]
pub struct MarkupRenderer {
    heading_max_chars: usize,
}

impl Default for MarkupRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_HEADING_MAX_CHARS)
    }
}

impl MarkupRenderer {
    pub fn new(heading_max_chars: usize) -> Self {
        Self { heading_max_chars }
    }

    /// Renders `raw` to HTML, falling back to `raw` unchanged on failure.
    pub fn render(&self, raw: &str) -> String {
        self.render_with(raw, String::with_capacity(raw.len() * 3 / 2))
    }

    fn render_with<W>(&self, raw: &str, mut out: W) -> String
    where
        W: fmt::Write + Into<String>,
    {
        match self.write_html(raw, &mut out) {
            Ok(()) => {
                let formatted = out.into();
                debug!(
                    raw_len = raw.len(),
                    html_len = formatted.len(),
                    "Formatted model answer"
                );
                formatted
            }
            Err(e) => {
                warn!("{}", e);
                raw.to_string()
            }
        }
    }

    fn write_html(&self, raw: &str, out: &mut impl fmt::Write) -> Result<(), ChatError> {
        let markdown = if has_markup(raw) {
            Cow::Borrowed(raw)
        } else {
            debug!("No markdown detected, adding basic formatting");
            Cow::Owned(self.structure_plain_text(raw))
        };

        html::write_html_fmt(out, Parser::new_ext(&markdown, markdown_options()))?;
        Ok(())
    }

    /// Splits plain text into one paragraph per non-empty line and promotes a
    /// short first line to a level-3 heading.
    pub fn structure_plain_text(&self, text: &str) -> String {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .enumerate()
            .map(|(i, line)| {
                if i == 0 && line.chars().count() < self.heading_max_chars {
                    format!("### {line}")
                } else {
                    line.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub fn has_markup(text: &str) -> bool {
    MARKUP_INDICATORS.iter().any(|marker| text.contains(marker))
}

// Fenced code blocks are core CommonMark, and CommonMark already refuses
// intraword underscore emphasis, so `snake_case_names` survive untouched.
fn markdown_options() -> Options {
    Options::ENABLE_TABLES
}
