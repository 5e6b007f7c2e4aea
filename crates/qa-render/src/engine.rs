use crate::classifier::{classify, looks_like_json, Highlighter, Segment};
use crate::disclosure::{is_collapsible, truncate_chars, DisclosureController, TRUNCATE_AT};
use crate::grouper::{group, IndexedChunk};
use qa_core::{PageKey, SourceChunk};
use serde::Serialize;
use tracing::trace;

/// Header and body rows of a tabular chunk, every cell highlighted.
#[derive(Debug, Clone, Serialize)]
pub struct TableView {
    pub header: Vec<Vec<Segment>>,
    pub body: Vec<Vec<Vec<Segment>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedChunk {
    /// Position in the answer's flat source list; the disclosure address.
    pub index: usize,
    pub display_text: String,
    pub is_table: bool,
    pub table: Option<TableView>,
    pub is_expanded: bool,
    /// Whether an expand/collapse control applies to this chunk.
    pub collapsible: bool,
    pub is_raw_data: bool,
    pub highlight_segments: Vec<Segment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedGroup {
    pub page: PageKey,
    pub chunks: Vec<RenderedChunk>,
}

/// Builds the view model for the sources attached to one answer.
#[derive(Debug, Clone, Default)]
pub struct SourceRenderer {
    highlighter: Highlighter,
}

impl SourceRenderer {
    pub fn new(highlighter: Highlighter) -> Self {
        Self { highlighter }
    }

    /// Renders `sources` grouped by page. An empty list renders nothing.
    pub fn render(
        &self,
        sources: &[SourceChunk],
        disclosure: &DisclosureController,
    ) -> Vec<RenderedGroup> {
        let groups: Vec<RenderedGroup> = group(sources)
            .into_iter()
            .map(|g| RenderedGroup {
                page: g.page,
                chunks: g
                    .chunks
                    .into_iter()
                    .map(|item| self.render_chunk(item, disclosure))
                    .collect(),
            })
            .collect();
        trace!(
            sources = sources.len(),
            groups = groups.len(),
            expand_all = disclosure.expand_all(),
            "rendered sources"
        );
        groups
    }

    fn render_chunk(&self, item: IndexedChunk<'_>, disclosure: &DisclosureController) -> RenderedChunk {
        let content = item.chunk.content.as_str();
        let shape = classify(content);
        let is_raw_data = looks_like_json(content);

        if shape.is_table {
            let mut rows = shape.rows.into_iter();
            let header = rows
                .next()
                .map(|row| self.highlight_cells(&row))
                .unwrap_or_default();
            let body = rows.map(|row| self.highlight_cells(&row)).collect();
            // Tables are never truncated.
            return RenderedChunk {
                index: item.index,
                display_text: content.to_string(),
                is_table: true,
                table: Some(TableView { header, body }),
                is_expanded: true,
                collapsible: false,
                is_raw_data,
                highlight_segments: self.highlighter.highlight(content),
            };
        }

        let collapsible = is_collapsible(content);
        let is_expanded = disclosure.shows_fully(item.index, content);
        let display_text = if is_expanded {
            content
        } else {
            truncate_chars(content, TRUNCATE_AT)
        };

        RenderedChunk {
            index: item.index,
            display_text: display_text.to_string(),
            is_table: false,
            table: None,
            is_expanded,
            collapsible,
            is_raw_data,
            highlight_segments: self.highlighter.highlight(display_text),
        }
    }

    fn highlight_cells(&self, row: &[String]) -> Vec<Vec<Segment>> {
        row.iter().map(|cell| self.highlighter.highlight(cell)).collect()
    }
}
