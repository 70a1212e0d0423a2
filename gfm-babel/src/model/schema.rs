//! Structural rules of the document schema
//!
//! Each node kind declares what it may contain. The parser only builds trees
//! that satisfy these rules; [`validate`] checks trees that were built by hand
//! or read from JSON.

use super::nodes::{Document, Node, NodeKind};
use crate::error::SchemaViolation;

/// What a node kind may contain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRule {
    /// Block nodes
    Blocks,
    /// Inline nodes
    Inlines,
    /// Unmarked text only
    Text,
    ListItems,
    TaskItems,
    TableRows,
    TableCells,
    Empty,
}

impl ContentRule {
    pub fn for_kind(kind: &NodeKind) -> Self {
        match kind {
            NodeKind::Paragraph | NodeKind::Heading { .. } => ContentRule::Inlines,
            NodeKind::Blockquote { .. }
            | NodeKind::ListItem
            | NodeKind::TaskItem { .. }
            | NodeKind::FootnoteDefinition { .. }
            | NodeKind::TableHeader(_)
            | NodeKind::TableCell(_)
            | NodeKind::HtmlElement { .. } => ContentRule::Blocks,
            NodeKind::BulletList { .. } | NodeKind::OrderedList { .. } => ContentRule::ListItems,
            NodeKind::TaskList { .. } => ContentRule::TaskItems,
            NodeKind::CodeBlock { .. }
            | NodeKind::Diagram { .. }
            | NodeKind::Frontmatter { .. }
            | NodeKind::ReferenceDefinition { .. } => ContentRule::Text,
            NodeKind::Table => ContentRule::TableRows,
            NodeKind::TableRow => ContentRule::TableCells,
            NodeKind::HorizontalRule
            | NodeKind::TableOfContents
            | NodeKind::Text(_)
            | NodeKind::HardBreak
            | NodeKind::Image(_)
            | NodeKind::Audio(_)
            | NodeKind::Video(_)
            | NodeKind::FootnoteReference { .. } => ContentRule::Empty,
        }
    }

    pub fn allows(self, child: &Node) -> bool {
        match self {
            ContentRule::Blocks => !child.is_inline(),
            ContentRule::Inlines => child.is_inline(),
            ContentRule::Text => matches!(child.kind, NodeKind::Text(_)) && child.marks.is_empty(),
            ContentRule::ListItems => matches!(child.kind, NodeKind::ListItem),
            ContentRule::TaskItems => matches!(child.kind, NodeKind::TaskItem { .. }),
            ContentRule::TableRows => matches!(child.kind, NodeKind::TableRow),
            ContentRule::TableCells => child.kind.is_table_cell(),
            ContentRule::Empty => false,
        }
    }
}

/// Check every node of `doc` against the content rules.
pub fn validate(doc: &Document) -> Result<(), SchemaViolation> {
    for (index, node) in doc.content.iter().enumerate() {
        let path = index.to_string();
        if !ContentRule::Blocks.allows(node) {
            return Err(violation("doc", node, &path));
        }
        validate_node(node, &path)?;
    }
    Ok(())
}

fn validate_node(node: &Node, path: &str) -> Result<(), SchemaViolation> {
    if !node.marks.is_empty() && !node.is_inline() {
        return Err(SchemaViolation {
            parent: node.type_name().to_string(),
            child: "marks".to_string(),
            path: path.to_string(),
        });
    }
    let rule = ContentRule::for_kind(&node.kind);
    for (index, child) in node.content.iter().enumerate() {
        let child_path = format!("{path}/{index}");
        if !rule.allows(child) {
            return Err(violation(node.type_name(), child, &child_path));
        }
        validate_node(child, &child_path)?;
    }
    Ok(())
}

fn violation(parent: &str, child: &Node, path: &str) -> SchemaViolation {
    SchemaViolation {
        parent: parent.to_string(),
        child: child.type_name().to_string(),
        path: path.to_string(),
    }
}

impl Document {
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        validate(self)
    }
}
