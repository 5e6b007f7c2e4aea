use qa_core::{PageKey, SourceChunk};
use std::collections::HashMap;

/// A chunk tagged with its position in the flat source list.
#[derive(Debug, Clone, Copy)]
pub struct IndexedChunk<'a> {
    pub index: usize,
    pub chunk: &'a SourceChunk,
}

#[derive(Debug, Clone)]
pub struct PageGroup<'a> {
    pub page: PageKey,
    pub chunks: Vec<IndexedChunk<'a>>,
}

/// Partitions chunks by effective page.
///
/// Groups appear in the order their first chunk was seen; chunks keep their
/// input order inside a group.
pub fn group(chunks: &[SourceChunk]) -> Vec<PageGroup<'_>> {
    let mut groups: Vec<PageGroup<'_>> = Vec::new();
    let mut slots: HashMap<PageKey, usize> = HashMap::new();

    for (index, chunk) in chunks.iter().enumerate() {
        let page = chunk.effective_page();
        let slot = match slots.get(&page) {
            Some(slot) => *slot,
            None => {
                groups.push(PageGroup {
                    page: page.clone(),
                    chunks: Vec::new(),
                });
                slots.insert(page, groups.len() - 1);
                groups.len() - 1
            }
        };
        groups[slot].chunks.push(IndexedChunk { index, chunk });
    }

    groups
}
