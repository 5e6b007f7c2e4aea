//! Plain-text rendering of messages and their sources.

use qa_core::{DocumentsResponse, Role, UploadState};
use qa_render::{RenderedChunk, Segment};
use qa_session::MessageView;
use std::fmt::Write;
use std::io::IsTerminal;

#[derive(Debug, Clone, Copy)]
pub struct Style {
    ansi: bool,
}

impl Style {
    /// ANSI bold when stdout is a terminal, markdown-style `**` otherwise.
    pub fn detect() -> Self {
        Self {
            ansi: std::io::stdout().is_terminal(),
        }
    }

    #[cfg(test)]
    pub fn plain() -> Self {
        Self { ansi: false }
    }

    fn emphasize(&self, segments: &[Segment]) -> String {
        let mut out = String::new();
        for seg in segments {
            match (seg.is_match, self.ansi) {
                (false, _) => out.push_str(&seg.text),
                (true, true) => {
                    let _ = write!(out, "\x1b[1m{}\x1b[0m", seg.text);
                }
                (true, false) => {
                    let _ = write!(out, "**{}**", seg.text);
                }
            }
        }
        out
    }
}

pub fn message(view: &MessageView<'_>, style: Style) -> String {
    let mut out = String::new();
    let who = match view.message.role {
        Role::User => "you",
        Role::Assistant => "assistant",
    };
    let _ = writeln!(out, "{}> {}", who, view.message.content);
    if view.sources.is_empty() {
        return out;
    }

    let total: usize = view.sources.iter().map(|g| g.chunks.len()).sum();
    let _ = writeln!(out, "  sources ({}):", total);
    for group in &view.sources {
        let _ = writeln!(out, "  [{}]", group.page);
        for chunk in &group.chunks {
            chunk_lines(&mut out, chunk, style, !view.expand_all);
        }
    }
    // Under expand-all only the global toggle changes what is shown.
    let collapsible = view.sources.iter().flat_map(|g| &g.chunks).any(|c| c.collapsible);
    if view.expand_all && collapsible {
        let _ = writeln!(out, "  ... /expand-all to collapse");
    }
    out
}

fn chunk_lines(out: &mut String, chunk: &RenderedChunk, style: Style, hint: bool) {
    let number = chunk.index + 1;
    let tag = if chunk.is_raw_data { " (raw data)" } else { "" };

    if let Some(table) = &chunk.table {
        let _ = writeln!(out, "    #{}{} table:", number, tag);
        let mut rows: Vec<&Vec<Vec<Segment>>> = vec![&table.header];
        rows.extend(table.body.iter());
        for line in aligned(&rows, style) {
            let _ = writeln!(out, "      {}", line);
        }
        return;
    }

    let text = style.emphasize(&chunk.highlight_segments);
    let _ = writeln!(out, "    #{}{} {}", number, tag, text.replace('\n', "\n       "));
    if hint && chunk.collapsible {
        let action = if chunk.is_expanded { "collapse" } else { "show all" };
        let _ = writeln!(out, "       ... /expand {} to {}", number, action);
    }
}

/// Pads each cell to its column's width, measured on the unstyled text.
fn aligned(rows: &[&Vec<Vec<Segment>>], style: Style) -> Vec<String> {
    let width = |cell: &Vec<Segment>| cell.iter().map(|s| s.text.chars().count()).sum::<usize>();
    let columns = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    let mut widths = vec![0usize; columns];
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(width(cell));
        }
    }

    rows.iter()
        .map(|row| {
            let cells: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(i, cell)| {
                    let pad = widths[i] - width(cell);
                    format!("{}{}", style.emphasize(cell), " ".repeat(pad))
                })
                .collect();
            cells.join(" | ").trim_end().to_string()
        })
        .collect()
}

pub fn status(state: &UploadState, loading: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "upload:   {}", state.phase);
    if let Some(name) = &state.file_name {
        let _ = writeln!(out, "file:     {}", name);
    }
    if let Some(id) = &state.document_id {
        let _ = writeln!(out, "document: {}", id);
    }
    if let Some(err) = &state.last_error {
        let _ = writeln!(out, "error:    {}", err);
    }
    if loading {
        let _ = writeln!(out, "waiting for an answer...");
    }
    out
}

pub fn documents(resp: &DocumentsResponse) -> String {
    if resp.documents.is_empty() {
        return "no documents on the server\n".to_string();
    }
    let mut out = String::new();
    for doc in &resp.documents {
        let date = doc
            .upload_date
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{}  {} chunks  {}  {}",
            doc.filename, doc.chunks_count, doc.status, date
        );
    }
    out
}

pub const HELP: &str = "\
commands:
  /upload <path>   select and upload a PDF
  /reset           unbind the document (server and local)
  /expand <n>      expand or collapse source #n of the last answer
  /expand-all      toggle every source of the last answer
  /docs            list documents known to the server
  /health          check that the server is up
  /status          show upload state
  /help            this text
  /quit            exit
anything else is sent as a question";

#[cfg(test)]
mod tests {
    use super::*;
    use qa_core::{Message, SourceChunk};
    use qa_render::{DisclosureController, SourceRenderer};

    fn view_with<'a>(message: &'a Message, disclosure: &DisclosureController) -> MessageView<'a> {
        MessageView {
            message,
            sources: SourceRenderer::default().render(&message.sources, disclosure),
            expand_all: disclosure.expand_all(),
        }
    }

    fn view_of(message: &Message) -> MessageView<'_> {
        view_with(message, &DisclosureController::new())
    }

    #[test]
    fn test_prose_chunk_marks_keywords() {
        let msg = Message::assistant(
            "X",
            vec![SourceChunk::new("Revenue 100  200").with_page("1")],
        );
        let out = message(&view_of(&msg), Style::plain());
        assert!(out.starts_with("assistant> X\n"));
        assert!(out.contains("[Page 1]"));
        assert!(out.contains("#1 **Revenue** 100  200"));
        assert!(!out.contains("/expand"));
    }

    #[test]
    fn test_table_columns_aligned() {
        let msg = Message::assistant(
            "t",
            vec![SourceChunk::new("Metric  FY2023\nSales  1000\nNet income  300")],
        );
        let out = message(&view_of(&msg), Style::plain());
        assert!(out.contains("#1 table:"));
        assert!(out.contains("Metric     | FY2023"));
        assert!(out.contains("**Sales**      | 1000"));
        assert!(out.contains("**Net income** | 300"));
    }

    #[test]
    fn test_long_chunk_gets_expand_hint() {
        let msg = Message::assistant("a", vec![SourceChunk::new("word ".repeat(100))]);
        let out = message(&view_of(&msg), Style::plain());
        assert!(out.contains("[Unknown page]"));
        assert!(out.contains("/expand 1 to show all"));
    }

    #[test]
    fn test_expand_all_replaces_per_chunk_hints() {
        let long = "Turnover rose. ".repeat(30);
        let msg = Message::assistant("a", vec![SourceChunk::new(long.clone()), SourceChunk::new(long)]);
        let mut disclosure = DisclosureController::new();
        disclosure.toggle_one(0);
        disclosure.toggle_all();

        let out = message(&view_with(&msg, &disclosure), Style::plain());
        assert!(!out.contains("/expand 1"));
        assert!(!out.contains("/expand 2"));
        assert_eq!(out.matches("/expand-all to collapse").count(), 1);

        // Back off: the hand-expanded chunk keeps its own hint again.
        disclosure.toggle_all();
        let out = message(&view_with(&msg, &disclosure), Style::plain());
        assert!(out.contains("/expand 1 to collapse"));
        assert!(out.contains("/expand 2 to show all"));
        assert!(!out.contains("/expand-all"));
    }

    #[test]
    fn test_user_message_has_no_sources_block() {
        let msg = Message::user("hello");
        let out = message(&view_of(&msg), Style::plain());
        assert_eq!(out, "you> hello\n");
    }
}
