//! Document tree model
//!
//! A [`Document`] is an ordered tree of typed [`Node`]s. Inline nodes carry an
//! ordered stack of [`Mark`]s; every node and mark carries a [`SourceMap`]
//! telling whether it was recovered from literal input or synthesized.

pub mod json;
pub mod nodes;
pub mod schema;
pub mod source_map;

pub use nodes::{
    merge_adjacent_text, Alignment, CellAttrs, CodeFence, DiffKind, Document, DocumentAttrs,
    FrontmatterLanguage, HtmlTag, LinkAttrs, Mark, MarkKind, MediaAttrs, Node, NodeCategory,
    NodeKind,
};
pub use schema::{validate, ContentRule};
pub use source_map::{KeyGenerator, SourceMap, SourceMapKey, SourceSpan};
