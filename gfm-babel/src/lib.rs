//! Lossless GitLab Flavored Markdown conversion
//!
//!     This crate converts GitLab Flavored Markdown into a typed document tree and back. Every
//!     node built from literal input remembers the text it came from, so serializing a tree
//!     after an edit rewrites only what changed and leaves the rest of the file byte for byte.
//!
//!     TLDR:
//!         - deserialize() parses Markdown into a Document, serialize() writes it back.
//!         - Pass the pristine document to serialize() so unchanged nodes are copied verbatim.
//!         - Raw HTML never enters the tree unchecked: the sanitizer maps allowed tags to nodes
//!           and marks and drops everything else.
//!         - Malformed Markdown is never an error. Only unreadable input (bad UTF-8, runaway
//!           nesting, broken JSON) is.
//!
//! Architecture
//!
//!     This is a pure lib, that is, it powers the gfm cli but is shell agnostic: no code here
//!     supposes a shell environment, be it std print, env vars etc.
//!
//!     The file structure :
//!     .
//!     ├── error.rs
//!     ├── format.rs               # Format trait definition
//!     ├── registry.rs             # FormatRegistry for discovery and selection
//!     ├── model                   # Document tree, schema, source maps, canonical JSON
//!     ├── sanitizer               # Tag policy, URL checks, HTML fragment rebuilding
//!     ├── formats
//!     │   ├── markdown            # Parser (comrak) and passthrough serializer
//!     │   ├── json                # Canonical JSON tree
//!     │   ├── html                # Rendering through an html5ever RcDom
//!     │   └── treeviz             # Box-drawing tree for debugging
//!     ├── snapshot.rs             # Example corpus harness
//!     └── lib.rs
//!
//! Testing
//!     tests
//!     ├── lib.rs
//!     ├── <area>
//!     │   └── <testname>.rs
//!     └── fixtures
//!
//!     Note that rust does not by default discover tests in subdirectories, so we need to include these
//!     in the mod.
//!
//! Core Algorithms
//!
//!     Parsing runs comrak with source positions and converts its AST, slicing each node's source
//!     from the original text. What comrak does not keep (link reference definitions, the position
//!     of footnotes, HTML open and close tags in separate blocks) is recovered by scanning the
//!     source around the blocks it does keep.
//!
//!     Serialization indexes the pristine tree by source map key. A node is unchanged when its kind,
//!     attributes, marks and source agree with the pristine node of the same key, recursively; such
//!     nodes are written as their source. Everything else is regenerated, reusing the delimiters the
//!     source recorded.
//!
//! Library Choices
//!
//!     We offload to specialized crates what they do well: comrak tokenizes Markdown, html5ever
//!     parses and serializes HTML, url checks link targets. The serializer is the exception, as
//!     no Markdown writer can pass unchanged text through.
//!
pub mod error;
pub mod format;
pub mod formats;
pub mod model;
pub mod registry;
pub mod sanitizer;
pub mod snapshot;

pub use error::{FormatError, ParseError, SchemaViolation};
pub use format::Format;
pub use formats::markdown::{
    deserialize, deserialize_bytes, MarkdownParser, MarkdownSerializer, ParserOptions,
    SerializerOptions,
};
pub use model::{DiffKind, Document, Mark, MarkKind, Node, NodeKind, SourceMap};
pub use registry::FormatRegistry;

/// Serialize `doc` to Markdown with the default options.
///
/// Nodes unchanged compared with `pristine` are written as their original
/// source. Without a pristine document the tree's own sources are trusted.
pub fn serialize(doc: &Document, pristine: Option<&Document>) -> Result<String, FormatError> {
    formats::markdown::serialize(doc, pristine, &SerializerOptions::default())
}
