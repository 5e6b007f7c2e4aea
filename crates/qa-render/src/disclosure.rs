//! Progressive disclosure state for the chunks of one answer.

use serde::Serialize;
use std::collections::HashMap;

/// Chunks longer than this many characters start collapsed.
pub const TRUNCATE_AT: usize = 300;

/// Per-chunk expand/collapse flags plus a global "expand all" switch.
///
/// While `expand_all` is on every chunk reads as expanded. Turning it off
/// only stops forcing; individual choices are kept, so anything a user
/// expanded by hand stays open.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DisclosureController {
    expanded: HashMap<usize, bool>,
    expand_all: bool,
}

impl DisclosureController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips one chunk's stored flag (absent counts as collapsed) and
    /// returns the new value.
    pub fn toggle_one(&mut self, index: usize) -> bool {
        let entry = self.expanded.entry(index).or_insert(false);
        *entry = !*entry;
        *entry
    }

    /// Flips the global switch and returns the new value.
    pub fn toggle_all(&mut self) -> bool {
        self.expand_all = !self.expand_all;
        self.expand_all
    }

    pub fn expand_all(&self) -> bool {
        self.expand_all
    }

    pub fn is_expanded(&self, index: usize) -> bool {
        self.expand_all || self.expanded.get(&index).copied().unwrap_or(false)
    }

    /// Whether a chunk with this content renders in full. Short chunks
    /// always do.
    pub fn shows_fully(&self, index: usize, content: &str) -> bool {
        !is_collapsible(content) || self.is_expanded(index)
    }
}

/// Whether `content` is long enough to get an expand/collapse affordance.
pub fn is_collapsible(content: &str) -> bool {
    content.chars().nth(TRUNCATE_AT).is_some()
}

/// First `limit` characters of `text`; a hard cut, not word-aware.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
