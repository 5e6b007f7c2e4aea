pub mod classifier;
pub mod disclosure;
pub mod engine;
pub mod grouper;

pub use classifier::{
    classify, highlight, looks_like_json, Classification, Highlighter, Segment, DEFAULT_KEYWORDS,
};
pub use disclosure::{is_collapsible, truncate_chars, DisclosureController, TRUNCATE_AT};
pub use engine::{RenderedChunk, RenderedGroup, SourceRenderer, TableView};
pub use grouper::{group, IndexedChunk, PageGroup};

pub use qa_core::{PageKey, SourceChunk};
pub use qa_error::{QaError, Result};
