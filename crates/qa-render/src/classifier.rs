//! Text shape detection and keyword highlighting for retrieved chunks.
//!
//! Both functions are pure: the same input always yields the same output.

use once_cell::sync::Lazy;
use qa_error::{QaError, Result};
use regex::{Regex, RegexBuilder};
use serde::Serialize;

/// Domain terms emphasised in source chunks unless configured otherwise.
pub const DEFAULT_KEYWORDS: [&str; 5] = ["revenue", "profit", "net income", "sales", "turnover"];

/// Column separator: a run of two or more whitespace characters, or a tab.
static CELL_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s{2,}|\t").expect("cell separator pattern is valid"));

static DEFAULT_HIGHLIGHTER: Lazy<Highlighter> = Lazy::new(|| {
    Highlighter::new(DEFAULT_KEYWORDS).expect("escaped default keywords always compile")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub is_table: bool,
    /// Every multi-column line, in order. The first row is the header.
    pub rows: Vec<Vec<String>>,
}

/// Decides whether `text` is tabular.
///
/// A line becomes a row only if splitting it yields more than one column.
/// The text is a table when at least two rows were produced and the first
/// one has more than one column. Ambiguous prose may be misclassified.
pub fn classify(text: &str) -> Classification {
    let rows: Vec<Vec<String>> = text
        .lines()
        .filter_map(|line| {
            let cells: Vec<String> = CELL_SEPARATOR
                .split(line.trim())
                .map(str::trim)
                .filter(|cell| !cell.is_empty())
                .map(str::to_string)
                .collect();
            (cells.len() > 1).then_some(cells)
        })
        .collect();

    let is_table = rows.len() >= 2 && rows.first().is_some_and(|header| header.len() > 1);
    Classification { is_table, rows }
}

/// Heuristic for chunks that are stray serialized data rather than document text.
pub fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim();
    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
    {
        return true;
    }
    trimmed.contains("\"score\"") || trimmed.contains("\"metadata\"")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub text: String,
    pub is_match: bool,
}

impl Segment {
    fn plain(text: &str) -> Self {
        Self {
            text: text.to_string(),
            is_match: false,
        }
    }

    fn matched(text: &str) -> Self {
        Self {
            text: text.to_string(),
            is_match: true,
        }
    }
}

/// Case-insensitive keyword marker.
///
/// Only the keyword list is compiled into the pattern; each keyword is
/// escaped, so text with regex metacharacters is matched literally.
#[derive(Debug, Clone)]
pub struct Highlighter {
    pattern: Option<Regex>,
}

impl Highlighter {
    pub fn new<I, S>(keywords: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        if keywords.is_empty() {
            return Ok(Self { pattern: None });
        }

        // Alternation order is keyword order: leftmost match wins, ties go to
        // the earlier keyword.
        let alternation = keywords
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = RegexBuilder::new(&alternation)
            .case_insensitive(true)
            .build()
            .map_err(|e| QaError::Configuration {
                key: "render.keywords".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            pattern: Some(pattern),
        })
    }

    /// Splits `text` into contiguous segments, marking keyword matches.
    /// Concatenating the segments reproduces `text` exactly.
    pub fn highlight(&self, text: &str) -> Vec<Segment> {
        if text.is_empty() {
            return Vec::new();
        }
        let Some(pattern) = &self.pattern else {
            return vec![Segment::plain(text)];
        };

        let mut segments = Vec::new();
        let mut cursor = 0;
        for m in pattern.find_iter(text) {
            if m.start() > cursor {
                segments.push(Segment::plain(&text[cursor..m.start()]));
            }
            segments.push(Segment::matched(m.as_str()));
            cursor = m.end();
        }
        if cursor < text.len() {
            segments.push(Segment::plain(&text[cursor..]));
        }
        segments
    }
}

impl Default for Highlighter {
    fn default() -> Self {
        DEFAULT_HIGHLIGHTER.clone()
    }
}

/// One-shot form of [`Highlighter::highlight`].
pub fn highlight(text: &str, keywords: &[&str]) -> Result<Vec<Segment>> {
    Ok(Highlighter::new(keywords)?.highlight(text))
}
