//! Markdown format implementation
//!
//! This module implements bidirectional conversion between GitLab Flavored
//! Markdown and the document tree.
//!
//! # Library Choice
//!
//! We use the `comrak` crate for Markdown parsing. This choice is based on:
//! - GFM extensions (tables, strikethrough, autolinks, task lists, footnotes)
//! - Source positions on every node, which the source map is built from
//! - Robust and well-maintained
//!
//! Serialization is written by hand: comrak's formatter normalizes the
//! output, while unchanged nodes here must come back byte for byte.
//!
//! # Element Mapping Table
//!
//! | Node              | Markdown                        | Import Notes                              |
//! |-------------------|---------------------------------|-------------------------------------------|
//! | Paragraph         | Paragraph                       | `[[_TOC_]]` alone becomes TableOfContents |
//! | Heading           | `#` or setext underline         | Level 1-6                                 |
//! | Blockquote        | `> ` or `>>>` fences            | Multiline flag kept                       |
//! | BulletList        | `*`, `-` or `+` items           | Bullet kept in the source map             |
//! | OrderedList       | `1.` or `1)` items              | Start number kept                         |
//! | TaskList          | `* [ ]` items                   | Any task item turns the list into one     |
//! | CodeBlock         | Fenced or indented code         | `mermaid`/`plantuml` become Diagram       |
//! | Table             | Pipe table or `<table>`         | Header row, alignment per cell            |
//! | HorizontalRule    | `---`, `***`, `___`             |                                           |
//! | Footnote          | `[^label]: text`                | Kept in source order                      |
//! | ReferenceDefinition | `[label]: url "title"`        | Recovered from the gaps comrak leaves     |
//! | Frontmatter       | `---`, `+++`, `;;;` blocks      | YAML, TOML or JSON                        |
//! | HtmlElement       | Allowed raw HTML block tags     | Sanitized by the tag policy               |
//! | Inline:           |                                 |                                           |
//! |   Text            | Plain text                      | Escaped on regeneration                   |
//! |   Bold / Italic   | `**x**` / `_x_`                 | Delimiter kept in the source map          |
//! |   Strike / Code   | `~~x~~` / `` `x` ``             |                                           |
//! |   Link            | Inline, reference or autolink   | `canonical_src` keeps what was written    |
//! |   Image / media   | `![alt](src)`                   | Audio and video by file extension         |
//! |   InlineDiff      | `{+x+}` / `{-x-}`               | `[+x+]` and `[-x-]` are read too          |
//! |   Highlight       | `<mark>x</mark>`                |                                           |
//! |   HardBreak       | Backslash or two spaces         | `<br>` inside table cells                 |
//!
//! # Lossy Conversions
//!
//! Only regenerated nodes lose formatting; passed-through nodes keep it all.
//! - Indentation and spacing inside a regenerated block are normalized
//! - HTML tables whose cells hold blocks reparse with different sources
//! - Image dimensions are written as `{width=… height=…}` but not parsed back
//!
//! # Testing
//!
//! Unit tests live next to the parser and serializer. Integration tests in
//! `tests/markdown/` use fixtures and snapshots.

pub mod definitions;
mod inline;
pub mod parser;
pub mod serializer;
pub mod source;
mod writer;

use std::collections::HashMap;

use crate::error::FormatError;
use crate::format::{flag, Format};
use crate::model::Document;

pub use parser::{deserialize, deserialize_bytes, MarkdownParser, ParserOptions};
pub use serializer::{serialize, MarkdownSerializer, SerializerOptions};

/// Format implementation for Markdown
#[derive(Debug, Clone, Default)]
pub struct MarkdownFormat {
    parser: ParserOptions,
    serializer: SerializerOptions,
}

impl MarkdownFormat {
    pub fn new(parser: ParserOptions, serializer: SerializerOptions) -> Self {
        MarkdownFormat { parser, serializer }
    }

    pub fn parser_options(&self) -> &ParserOptions {
        &self.parser
    }

    pub fn serializer_options(&self) -> &SerializerOptions {
        &self.serializer
    }

    /// Serializer options with the extra parameters applied
    fn options_with(
        &self,
        options: &HashMap<String, String>,
    ) -> Result<SerializerOptions, FormatError> {
        let mut resolved = self.serializer.clone();
        for (key, value) in options {
            match key.as_str() {
                "passthrough" => resolved.passthrough = flag(options, key).unwrap_or(true),
                "bullet" => {
                    resolved.bullet = match value.as_str() {
                        "*" | "-" | "+" => value.chars().next().unwrap_or('*'),
                        _ => return Err(invalid(key, value)),
                    }
                }
                "emphasis" => match value.as_str() {
                    "_" | "*" => resolved.emphasis = value.clone(),
                    _ => return Err(invalid(key, value)),
                },
                "strong" => match value.as_str() {
                    "**" | "__" => resolved.strong = value.clone(),
                    _ => return Err(invalid(key, value)),
                },
                "fence" => match value.as_str() {
                    "```" | "~~~" => resolved.fence = value.clone(),
                    _ => return Err(invalid(key, value)),
                },
                "horizontal-rule" => match value.as_str() {
                    "---" | "***" | "___" => resolved.horizontal_rule = value.clone(),
                    _ => return Err(invalid(key, value)),
                },
                _ => {
                    return Err(FormatError::NotSupported(format!(
                        "Markdown does not take a '{key}' parameter"
                    )))
                }
            }
        }
        Ok(resolved)
    }
}

fn invalid(key: &str, value: &str) -> FormatError {
    FormatError::SerializationError(format!("invalid value '{value}' for '{key}'"))
}

impl Format for MarkdownFormat {
    fn name(&self) -> &str {
        "markdown"
    }

    fn description(&self) -> &str {
        "GitLab Flavored Markdown"
    }

    fn file_extensions(&self) -> &[&str] {
        &["md", "markdown"]
    }

    fn supports_parsing(&self) -> bool {
        true
    }

    fn supports_serialization(&self) -> bool {
        true
    }

    fn parse(&self, source: &str) -> Result<Document, FormatError> {
        Ok(MarkdownParser::new(self.parser.clone()).parse(source)?)
    }

    fn serialize(&self, doc: &Document) -> Result<String, FormatError> {
        MarkdownSerializer::new(self.serializer.clone()).serialize(doc, None)
    }

    fn serialize_with_options(
        &self,
        doc: &Document,
        options: &HashMap<String, String>,
    ) -> Result<String, FormatError> {
        MarkdownSerializer::new(self.options_with(options)?).serialize(doc, None)
    }
}
