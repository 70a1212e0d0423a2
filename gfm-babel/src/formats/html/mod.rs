//! HTML format implementation
//!
//! Renders a document the way the editor shows it. Output only: HTML input
//! is handled by the sanitizer when it appears inside Markdown.
//!
//! # Library Choice
//!
//! We use the `html5ever` + `markup5ever_rcdom` ecosystem, the same pair the
//! sanitizer parses fragments with:
//! - `html5ever`: Browser-grade HTML5 parser and serializer from the Servo project
//! - `markup5ever_rcdom`: Reference-counted DOM tree implementation
//!
//! Building an RcDom and serializing it leaves escaping and void elements to
//! html5ever.
//!
//! # Element Mapping Table
//!
//! | Node              | HTML                                             |
//! |-------------------|--------------------------------------------------|
//! | Paragraph         | `<p>`                                            |
//! | Heading           | `<hN id="slug">`                                 |
//! | Blockquote        | `<blockquote>`                                   |
//! | BulletList        | `<ul>`                                           |
//! | OrderedList       | `<ol start="N">`                                 |
//! | TaskList / Item   | `<ul class="task-list">`, checkbox `<input>`     |
//! | CodeBlock         | `<pre><code class="language-x">`                 |
//! | Diagram           | `<pre><code class="diagram" data-diagram="x">`   |
//! | Frontmatter       | `<pre><code class="frontmatter">`                |
//! | Table             | `<table>`, `<th>`/`<td>` with spans and alignment |
//! | Footnote          | `<div class="footnote" id="fn-label">`           |
//! | TableOfContents   | `<ul class="section-nav">` of heading links      |
//! | HtmlElement       | The element itself                               |
//! | ReferenceDefinition | Nothing                                        |
//! | Marks:            |                                                  |
//! |   Bold / Italic   | `<strong>` / `<em>`                              |
//! |   Strike / Code   | `<del>` / `<code>`                               |
//! |   Link            | `<a href target="_blank" rel="noopener noreferrer nofollow">` |
//!
//! # Parameters
//!
//! - `standalone`: wrap the output in a complete HTML5 document
//! - `css`: stylesheet text embedded in a standalone document

mod serializer;

pub use serializer::{serialize_to_html, serialize_to_html_with_options, HtmlOptions, LINK_REL};

use std::collections::HashMap;

use crate::error::FormatError;
use crate::format::{flag, Format};
use crate::model::Document;

/// Format implementation for HTML
#[derive(Debug, Clone, Default)]
pub struct HtmlFormat {
    options: HtmlOptions,
}

impl HtmlFormat {
    pub fn new(options: HtmlOptions) -> Self {
        Self { options }
    }

    /// HTML format producing complete documents
    pub fn standalone() -> Self {
        Self::new(HtmlOptions::standalone())
    }
}

impl Format for HtmlFormat {
    fn name(&self) -> &str {
        "html"
    }

    fn description(&self) -> &str {
        "HTML5 rendering of the document tree"
    }

    fn file_extensions(&self) -> &[&str] {
        &["html", "htm"]
    }

    fn supports_serialization(&self) -> bool {
        true
    }

    fn serialize(&self, doc: &Document) -> Result<String, FormatError> {
        serialize_to_html_with_options(doc, &self.options)
    }

    fn serialize_with_options(
        &self,
        doc: &Document,
        options: &HashMap<String, String>,
    ) -> Result<String, FormatError> {
        let mut resolved = self.options.clone();
        for (key, value) in options {
            match key.as_str() {
                "standalone" => resolved.standalone = flag(options, key).unwrap_or(true),
                "css" => resolved.custom_css = Some(value.clone()),
                _ => {
                    return Err(FormatError::NotSupported(format!(
                        "HTML does not take a '{key}' parameter"
                    )))
                }
            }
        }
        serialize_to_html_with_options(doc, &resolved)
    }
}
