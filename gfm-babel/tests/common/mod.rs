//! Shared helpers for the integration tests

use gfm_babel::{deserialize, serialize, Document, Node, NodeKind};
use std::path::PathBuf;

/// Read a file from `tests/fixtures`
pub fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read {path:?}: {e}"))
}

pub fn parse(markdown: &str) -> Document {
    deserialize(markdown).expect("Should parse markdown")
}

/// Parse and serialize against the parsed tree itself
pub fn roundtrip(markdown: &str) -> String {
    let doc = parse(markdown);
    serialize(&doc, Some(&doc)).expect("Should serialize markdown")
}

/// Serialize `edited` against `pristine`
pub fn write(edited: &Document, pristine: &Document) -> String {
    serialize(edited, Some(pristine)).expect("Should serialize markdown")
}

/// Apply `f` to every text node of the tree
pub fn map_text(nodes: &mut [Node], f: &dyn Fn(&str) -> String) {
    for node in nodes {
        if let NodeKind::Text(text) = &mut node.kind {
            *text = f(text);
        }
        map_text(&mut node.content, f);
    }
}
