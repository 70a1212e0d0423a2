//! Markdown format tests
//!
//! Tests for bidirectional Markdown ↔ document tree conversion.

mod export;
mod frontmatter;
mod import;
mod roundtrip;
mod table;
