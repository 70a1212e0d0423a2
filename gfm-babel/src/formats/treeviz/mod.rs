//! Treeviz formatter for document trees
//!
//! Treeviz is a visual representation of the document tree. It encodes the
//! node structure as box-drawing connectors, one node per line:
//!
//! <prefix><connector> <icon> <label> (truncated to 30 characters)
//!
//! Example:
//!
//! ⧉ Document (3 blocks)
//! ├─ § h1 Title
//! ├─ ¶ Some bold text
//! └─ ☰ 2 items
//!   ├─ • item
//!   │ └─ ¶ Item one
//!   └─ • item
//!     └─ ¶ Item two
//!
//! With `ast-full` every inline node is listed with its marks, and with
//! `show-source` recovered nodes show their source map key and byte range.

use super::icons::get_icon;
use crate::error::FormatError;
use crate::format::{flag, Format};
use crate::model::{Document, Mark, MarkKind, Node, NodeKind, SourceMap};
use std::collections::HashMap;

const LABEL_WIDTH: usize = 30;

#[derive(Debug, Clone, Copy, Default)]
struct TreevizParams {
    include_all: bool,
    show_source: bool,
}

/// Format a single node and its children
fn format_node(
    node: &Node,
    prefix: &str,
    child_index: usize,
    child_count: usize,
    params: TreevizParams,
) -> String {
    let mut output = String::new();
    let is_last = child_index == child_count - 1;
    let connector = if is_last { "└─" } else { "├─" };
    let icon = get_icon(node.type_name());

    output.push_str(&format!("{prefix}{connector} {icon} {}", label(node)));
    if params.show_source {
        output.push_str(&source_label(&node.source));
    }
    output.push('\n');

    let child_prefix = format!("{}{}", prefix, if is_last { "  " } else { "│ " });

    if params.include_all {
        for (i, mark) in node.marks.iter().enumerate() {
            let connector = if i == node.marks.len() - 1 && node.content.is_empty() {
                "└─"
            } else {
                "├─"
            };
            output.push_str(&format!(
                "{child_prefix}{connector} {} {}",
                get_icon(mark.kind.type_name()),
                mark_label(mark)
            ));
            if params.show_source {
                output.push_str(&source_label(&mark.source));
            }
            output.push('\n');
        }
    }

    // Paragraph-like nodes already show their text in the label
    let shows_inlines = node.content.first().is_some_and(Node::is_inline);
    if shows_inlines && !params.include_all {
        return output;
    }
    output + &format_children(&node.content, &child_prefix, params)
}

fn format_children(children: &[Node], prefix: &str, params: TreevizParams) -> String {
    let mut output = String::new();
    let child_count = children.len();
    for (i, child) in children.iter().enumerate() {
        output.push_str(&format_node(child, prefix, i, child_count, params));
    }
    output
}

fn label(node: &Node) -> String {
    let text = match &node.kind {
        NodeKind::Heading { level, .. } => format!("h{level} {}", node.text_content()),
        NodeKind::BulletList { .. } | NodeKind::OrderedList { .. } | NodeKind::TaskList { .. } => {
            format!("{} items", node.content.len())
        }
        NodeKind::ListItem => "item".to_string(),
        NodeKind::TaskItem { checked } => {
            let checkbox = if *checked { "[x]" } else { "[ ]" };
            format!("item {checkbox}")
        }
        NodeKind::CodeBlock { language, .. } => match language {
            Some(language) => format!("code ({language})"),
            None => "code".to_string(),
        },
        NodeKind::Diagram { language } => format!("diagram ({language})"),
        NodeKind::Frontmatter { language } => format!("frontmatter ({})", language.as_str()),
        NodeKind::Table => format!("{} rows", node.content.len()),
        NodeKind::TableRow => format!("{} cells", node.content.len()),
        NodeKind::FootnoteDefinition { label, .. } | NodeKind::FootnoteReference { label, .. } => {
            format!("[^{label}]")
        }
        NodeKind::ReferenceDefinition {
            identifier, url, ..
        } => format!("[{identifier}]: {url}"),
        NodeKind::TableOfContents => "table of contents".to_string(),
        NodeKind::HtmlElement { tag } => format!("<{}>", tag.name()),
        NodeKind::HorizontalRule => "rule".to_string(),
        NodeKind::HardBreak => "break".to_string(),
        NodeKind::Text(text) => format!("{text:?}"),
        NodeKind::Image(media) | NodeKind::Audio(media) | NodeKind::Video(media) => {
            format!("{} {}", node.type_name(), media.src.as_deref().unwrap_or("∅"))
        }
        _ => node.text_content(),
    };
    truncate(&text.replace('\n', "↵"))
}

fn mark_label(mark: &Mark) -> String {
    match &mark.kind {
        MarkKind::Link(link) => format!("link {}", link.href.as_deref().unwrap_or("∅")),
        MarkKind::InlineDiff(diff) => format!("inlineDiff {}", diff.name()),
        kind => kind.type_name().to_string(),
    }
}

fn source_label(source: &SourceMap) -> String {
    match source.span() {
        Some(span) => match &span.range {
            Some(range) => format!(" {{{} @{}..{}}}", span.key, range.start, range.end),
            None => format!(" {{{}}}", span.key),
        },
        None => " {synthesized}".to_string(),
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= LABEL_WIDTH {
        return text.to_string();
    }
    let kept: String = text.chars().take(LABEL_WIDTH - 1).collect();
    format!("{kept}…")
}

pub fn to_treeviz_str(doc: &Document) -> String {
    to_treeviz_str_with_params(doc, &HashMap::new())
}

/// Convert a document to treeviz string with optional parameters
///
/// # Parameters
///
/// - `"ast-full"`: list inline nodes and their marks instead of summarizing
///   them in the parent's label
/// - `"show-source"`: append the source map key and byte range of each node
///
/// # Examples
///
/// ```ignore
/// let mut params = HashMap::new();
/// params.insert("ast-full".to_string(), "true".to_string());
/// let output = to_treeviz_str_with_params(&doc, &params);
/// ```
pub fn to_treeviz_str_with_params(doc: &Document, params: &HashMap<String, String>) -> String {
    let params = TreevizParams {
        include_all: flag(params, "ast-full").unwrap_or(false),
        show_source: flag(params, "show-source").unwrap_or(false),
    };

    let icon = get_icon("doc");
    let output = format!("{icon} Document ({} blocks)\n", doc.content.len());
    output + &format_children(&doc.content, "", params)
}

/// Format implementation for treeviz format
pub struct TreevizFormat;

impl Format for TreevizFormat {
    fn name(&self) -> &str {
        "treeviz"
    }

    fn description(&self) -> &str {
        "Visual tree representation with box drawing and Unicode icons"
    }

    fn file_extensions(&self) -> &[&str] {
        &["tree", "treeviz"]
    }

    fn supports_serialization(&self) -> bool {
        true
    }

    fn serialize(&self, doc: &Document) -> Result<String, FormatError> {
        Ok(to_treeviz_str(doc))
    }

    fn serialize_with_options(
        &self,
        doc: &Document,
        options: &HashMap<String, String>,
    ) -> Result<String, FormatError> {
        if let Some(key) = options
            .keys()
            .find(|key| !matches!(key.as_str(), "ast-full" | "show-source"))
        {
            return Err(FormatError::NotSupported(format!(
                "Treeviz does not take a '{key}' parameter"
            )));
        }
        Ok(to_treeviz_str_with_params(doc, options))
    }
}
