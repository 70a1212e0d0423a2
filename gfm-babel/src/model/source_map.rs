//! Source map model
//!
//! Every node or mark built from literal input text remembers the substring
//! that produced it. The serializer compares an edited tree against the
//! pristine one by [`SourceMapKey`] and re-emits the stored markdown for
//! anything that did not change.

use std::fmt;
use std::ops::Range;

/// Opaque identity of a source-mapped node, unique within one parse
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceMapKey(String);

impl SourceMapKey {
    pub fn new(key: impl Into<String>) -> Self {
        SourceMapKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceMapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hands out keys for one deserialization pass
#[derive(Debug, Default)]
pub struct KeyGenerator {
    next: usize,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_key(&mut self) -> SourceMapKey {
        let key = SourceMapKey(format!("sm{}", self.next));
        self.next += 1;
        key
    }

    /// Build a recovered source map for `range` of `source`.
    pub fn recover(&mut self, source: &str, range: Range<usize>) -> SourceMap {
        self.recover_tagged(source, range, None)
    }

    pub fn recover_tagged(
        &mut self,
        source: &str,
        range: Range<usize>,
        tag_name: Option<&str>,
    ) -> SourceMap {
        match source.get(range.clone()) {
            Some(markdown) => SourceMap::Recovered(SourceSpan {
                key: self.next_key(),
                markdown: markdown.to_string(),
                tag_name: tag_name.map(str::to_string),
                column: source[..range.start]
                    .rfind('\n')
                    .map_or(range.start, |newline| range.start - newline - 1),
                range: Some(range),
                newlines_before: None,
            }),
            None => {
                tracing::debug!(?range, "source range is not on a char boundary");
                SourceMap::Synthesized
            }
        }
    }
}

/// The literal text a node was built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpan {
    pub key: SourceMapKey,
    pub markdown: String,
    /// Lowercased HTML tag name when the node came from raw HTML
    pub tag_name: Option<String>,
    /// Byte range of `markdown` in the parsed text, when known
    pub range: Option<Range<usize>>,
    /// Bytes between the start of its line and the start of `markdown`.
    /// Continuation lines of `markdown` repeat container prefixes up to this
    /// width.
    pub column: usize,
    /// Newlines separating this node from its previous sibling in the
    /// source, when nothing but whitespace and `>` lies between them
    pub newlines_before: Option<usize>,
}

/// Whether a node carries recoverable source text
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceMap {
    Recovered(SourceSpan),
    #[default]
    Synthesized,
}

impl SourceMap {
    pub fn span(&self) -> Option<&SourceSpan> {
        match self {
            SourceMap::Recovered(span) => Some(span),
            SourceMap::Synthesized => None,
        }
    }

    pub fn key(&self) -> Option<&SourceMapKey> {
        self.span().map(|span| &span.key)
    }

    pub fn markdown(&self) -> Option<&str> {
        self.span().map(|span| span.markdown.as_str())
    }

    pub fn tag_name(&self) -> Option<&str> {
        self.span().and_then(|span| span.tag_name.as_deref())
    }

    pub fn range(&self) -> Option<Range<usize>> {
        self.span().and_then(|span| span.range.clone())
    }

    pub fn is_recovered(&self) -> bool {
        matches!(self, SourceMap::Recovered(_))
    }

    /// Same key, markdown and tag, ignoring where the text sat in the input
    pub fn same_origin(&self, other: &SourceMap) -> bool {
        match (self, other) {
            (SourceMap::Synthesized, SourceMap::Synthesized) => true,
            (SourceMap::Recovered(a), SourceMap::Recovered(b)) => {
                a.key == b.key && a.markdown == b.markdown && a.tag_name == b.tag_name
            }
            _ => false,
        }
    }
}
