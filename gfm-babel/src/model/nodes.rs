//! Node and mark types of the document tree
//!
//! The vocabulary is closed: the parser builds [`NodeKind`] values with an
//! exhaustive match and the serializer consumes them the same way. Inline
//! formatting is carried by [`Mark`]s stacked on inline nodes, outermost
//! first.

use super::source_map::SourceMap;

/// A whole document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub content: Vec<Node>,
    pub attrs: DocumentAttrs,
}

/// Document-level attributes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentAttrs {
    /// Reference definitions kept as a verbatim block. When set on the
    /// pristine document and the edited tree carries no reference
    /// definition nodes, the serializer appends this text unchanged.
    pub reference_definitions: Option<String>,
}

impl Document {
    pub fn new(content: Vec<Node>) -> Self {
        Document {
            content,
            attrs: DocumentAttrs::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Depth-first iterator over every node of the document
    pub fn descendants(&self) -> impl Iterator<Item = &Node> {
        let mut stack: Vec<&Node> = self.content.iter().rev().collect();
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.content.iter().rev());
            Some(node)
        })
    }
}

/// A node of the document tree
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub content: Vec<Node>,
    /// Inline formatting, outermost first. Only inline nodes carry marks.
    pub marks: Vec<Mark>,
    pub source: SourceMap,
}

/// Fence used by a fenced code block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeFence {
    pub marker: char,
    pub length: usize,
}

/// Column alignment of a table cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
    Right,
}

impl Alignment {
    pub fn as_str(self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "left" => Some(Alignment::Left),
            "center" => Some(Alignment::Center),
            "right" => Some(Alignment::Right),
            _ => None,
        }
    }
}

/// Attributes shared by header and body cells
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellAttrs {
    pub colspan: u32,
    pub rowspan: u32,
    pub align: Option<Alignment>,
}

impl Default for CellAttrs {
    fn default() -> Self {
        CellAttrs {
            colspan: 1,
            rowspan: 1,
            align: None,
        }
    }
}

/// Attributes of images and embedded media
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaAttrs {
    /// Sanitized target; `None` when the value was rejected
    pub src: Option<String>,
    /// The destination exactly as written (the identifier for references)
    pub canonical_src: Option<String>,
    pub alt: Option<String>,
    pub title: Option<String>,
    pub is_reference: bool,
    pub width: Option<String>,
    pub height: Option<String>,
}

/// Frontmatter dialect, tied to its delimiter line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontmatterLanguage {
    Yaml,
    Toml,
    Json,
}

impl FrontmatterLanguage {
    pub fn delimiter(self) -> &'static str {
        match self {
            FrontmatterLanguage::Yaml => "---",
            FrontmatterLanguage::Toml => "+++",
            FrontmatterLanguage::Json => ";;;",
        }
    }

    pub fn from_delimiter(line: &str) -> Option<Self> {
        match line {
            "---" => Some(FrontmatterLanguage::Yaml),
            "+++" => Some(FrontmatterLanguage::Toml),
            ";;;" => Some(FrontmatterLanguage::Json),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FrontmatterLanguage::Yaml => "yaml",
            FrontmatterLanguage::Toml => "toml",
            FrontmatterLanguage::Json => "json",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "yaml" => Some(FrontmatterLanguage::Yaml),
            "toml" => Some(FrontmatterLanguage::Toml),
            "json" => Some(FrontmatterLanguage::Json),
            _ => None,
        }
    }
}

/// Block-level HTML elements kept as their own nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HtmlTag {
    Div,
    Pre,
    Details,
    Summary,
    Figure,
    Figcaption,
    Dl,
    Dt,
    Dd,
}

impl HtmlTag {
    pub const ALL: [HtmlTag; 9] = [
        HtmlTag::Div,
        HtmlTag::Pre,
        HtmlTag::Details,
        HtmlTag::Summary,
        HtmlTag::Figure,
        HtmlTag::Figcaption,
        HtmlTag::Dl,
        HtmlTag::Dt,
        HtmlTag::Dd,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HtmlTag::Div => "div",
            HtmlTag::Pre => "pre",
            HtmlTag::Details => "details",
            HtmlTag::Summary => "summary",
            HtmlTag::Figure => "figure",
            HtmlTag::Figcaption => "figcaption",
            HtmlTag::Dl => "dl",
            HtmlTag::Dt => "dt",
            HtmlTag::Dd => "dd",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        HtmlTag::ALL.into_iter().find(|tag| tag.name() == name)
    }
}

/// The closed set of node types
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Paragraph,
    Heading {
        level: u8,
        setext: bool,
    },
    Blockquote {
        multiline: bool,
    },
    BulletList {
        bullet: char,
    },
    OrderedList {
        start: u64,
        parens: bool,
    },
    ListItem,
    TaskList {
        numeric: bool,
        start: u64,
        parens: bool,
        bullet: char,
    },
    TaskItem {
        checked: bool,
    },
    CodeBlock {
        language: Option<String>,
        lang_params: Option<String>,
        /// `None` for indented code
        fence: Option<CodeFence>,
    },
    Diagram {
        language: String,
    },
    Table,
    TableRow,
    TableHeader(CellAttrs),
    TableCell(CellAttrs),
    HorizontalRule,
    Frontmatter {
        language: FrontmatterLanguage,
    },
    FootnoteDefinition {
        identifier: String,
        label: String,
    },
    ReferenceDefinition {
        identifier: String,
        url: String,
        title: Option<String>,
    },
    TableOfContents,
    HtmlElement {
        tag: HtmlTag,
    },
    Text(String),
    HardBreak,
    Image(MediaAttrs),
    Audio(MediaAttrs),
    Video(MediaAttrs),
    FootnoteReference {
        identifier: String,
        label: String,
    },
}

/// Block or inline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCategory {
    Block,
    Inline,
}

impl NodeKind {
    /// Name used in the canonical JSON shape
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Paragraph => "paragraph",
            NodeKind::Heading { .. } => "heading",
            NodeKind::Blockquote { .. } => "blockquote",
            NodeKind::BulletList { .. } => "bulletList",
            NodeKind::OrderedList { .. } => "orderedList",
            NodeKind::ListItem => "listItem",
            NodeKind::TaskList { .. } => "taskList",
            NodeKind::TaskItem { .. } => "taskItem",
            NodeKind::CodeBlock { .. } => "codeBlock",
            NodeKind::Diagram { .. } => "diagram",
            NodeKind::Table => "table",
            NodeKind::TableRow => "tableRow",
            NodeKind::TableHeader(_) => "tableHeader",
            NodeKind::TableCell(_) => "tableCell",
            NodeKind::HorizontalRule => "horizontalRule",
            NodeKind::Frontmatter { .. } => "frontmatter",
            NodeKind::FootnoteDefinition { .. } => "footnoteDefinition",
            NodeKind::ReferenceDefinition { .. } => "referenceDefinition",
            NodeKind::TableOfContents => "tableOfContents",
            NodeKind::HtmlElement { tag } => tag.name(),
            NodeKind::Text(_) => "text",
            NodeKind::HardBreak => "hardBreak",
            NodeKind::Image(_) => "image",
            NodeKind::Audio(_) => "audio",
            NodeKind::Video(_) => "video",
            NodeKind::FootnoteReference { .. } => "footnoteReference",
        }
    }

    pub fn category(&self) -> NodeCategory {
        match self {
            NodeKind::Text(_)
            | NodeKind::HardBreak
            | NodeKind::Image(_)
            | NodeKind::Audio(_)
            | NodeKind::Video(_)
            | NodeKind::FootnoteReference { .. } => NodeCategory::Inline,
            _ => NodeCategory::Block,
        }
    }

    pub fn is_inline(&self) -> bool {
        self.category() == NodeCategory::Inline
    }

    pub fn is_list(&self) -> bool {
        matches!(
            self,
            NodeKind::BulletList { .. } | NodeKind::OrderedList { .. } | NodeKind::TaskList { .. }
        )
    }

    pub fn is_table_cell(&self) -> bool {
        matches!(self, NodeKind::TableHeader(_) | NodeKind::TableCell(_))
    }

    pub fn cell_attrs(&self) -> Option<&CellAttrs> {
        match self {
            NodeKind::TableHeader(attrs) | NodeKind::TableCell(attrs) => Some(attrs),
            _ => None,
        }
    }

    pub fn media_attrs(&self) -> Option<&MediaAttrs> {
        match self {
            NodeKind::Image(attrs) | NodeKind::Audio(attrs) | NodeKind::Video(attrs) => {
                Some(attrs)
            }
            _ => None,
        }
    }
}

/// An inline formatting annotation
#[derive(Debug, Clone, PartialEq)]
pub struct Mark {
    pub kind: MarkKind,
    pub source: SourceMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkAttrs {
    /// Sanitized target; `None` when the value was rejected
    pub href: Option<String>,
    pub canonical_src: Option<String>,
    pub title: Option<String>,
    pub is_reference: bool,
}

/// Side of an inline diff: `{+added+}` or `{-removed-}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    Addition,
    Deletion,
}

impl DiffKind {
    pub fn name(self) -> &'static str {
        match self {
            DiffKind::Addition => "addition",
            DiffKind::Deletion => "deletion",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "addition" => Some(DiffKind::Addition),
            "deletion" => Some(DiffKind::Deletion),
            _ => None,
        }
    }

    /// Opening and closing delimiters in Markdown
    pub fn delimiters(self) -> (&'static str, &'static str) {
        match self {
            DiffKind::Addition => ("{+", "+}"),
            DiffKind::Deletion => ("{-", "-}"),
        }
    }
}

/// The closed set of mark types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkKind {
    Bold,
    Italic,
    Strike,
    Code,
    Link(LinkAttrs),
    InlineDiff(DiffKind),
    Highlight,
}

impl MarkKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            MarkKind::Bold => "bold",
            MarkKind::Italic => "italic",
            MarkKind::Strike => "strike",
            MarkKind::Code => "code",
            MarkKind::Link(_) => "link",
            MarkKind::InlineDiff(_) => "inlineDiff",
            MarkKind::Highlight => "highlight",
        }
    }
}

impl Mark {
    pub fn new(kind: MarkKind) -> Self {
        Mark {
            kind,
            source: SourceMap::Synthesized,
        }
    }

    pub fn with_source(mut self, source: SourceMap) -> Self {
        self.source = source;
        self
    }

    pub fn bold() -> Self {
        Mark::new(MarkKind::Bold)
    }

    pub fn italic() -> Self {
        Mark::new(MarkKind::Italic)
    }

    pub fn strike() -> Self {
        Mark::new(MarkKind::Strike)
    }

    pub fn code() -> Self {
        Mark::new(MarkKind::Code)
    }

    pub fn link(href: impl Into<String>) -> Self {
        Mark::new(MarkKind::Link(LinkAttrs {
            href: Some(href.into()),
            ..LinkAttrs::default()
        }))
    }
}

impl Node {
    pub fn new(kind: NodeKind, content: Vec<Node>) -> Self {
        Node {
            kind,
            content,
            marks: Vec::new(),
            source: SourceMap::Synthesized,
        }
    }

    pub fn leaf(kind: NodeKind) -> Self {
        Node::new(kind, Vec::new())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Node::leaf(NodeKind::Text(text.into()))
    }

    pub fn paragraph(content: Vec<Node>) -> Self {
        Node::new(NodeKind::Paragraph, content)
    }

    pub fn heading(level: u8, content: Vec<Node>) -> Self {
        Node::new(
            NodeKind::Heading {
                level,
                setext: false,
            },
            content,
        )
    }

    pub fn blockquote(content: Vec<Node>) -> Self {
        Node::new(NodeKind::Blockquote { multiline: false }, content)
    }

    pub fn bullet_list(items: Vec<Node>) -> Self {
        Node::new(NodeKind::BulletList { bullet: '*' }, items)
    }

    pub fn ordered_list(start: u64, items: Vec<Node>) -> Self {
        Node::new(
            NodeKind::OrderedList {
                start,
                parens: false,
            },
            items,
        )
    }

    pub fn list_item(content: Vec<Node>) -> Self {
        Node::new(NodeKind::ListItem, content)
    }

    pub fn code_block(language: Option<&str>, code: &str) -> Self {
        let content = if code.is_empty() {
            Vec::new()
        } else {
            vec![Node::text(code)]
        };
        Node::new(
            NodeKind::CodeBlock {
                language: language.map(str::to_string),
                lang_params: None,
                fence: Some(CodeFence {
                    marker: '`',
                    length: 3,
                }),
            },
            content,
        )
    }

    pub fn hard_break() -> Self {
        Node::leaf(NodeKind::HardBreak)
    }

    pub fn image(src: impl Into<String>, alt: impl Into<String>) -> Self {
        Node::leaf(NodeKind::Image(MediaAttrs {
            src: Some(src.into()),
            alt: Some(alt.into()),
            ..MediaAttrs::default()
        }))
    }

    pub fn with_marks(mut self, marks: Vec<Mark>) -> Self {
        self.marks = marks;
        self
    }

    pub fn with_source(mut self, source: SourceMap) -> Self {
        self.source = source;
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn is_inline(&self) -> bool {
        self.kind.is_inline()
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let NodeKind::Text(text) = &self.kind {
            out.push_str(text);
        }
        for child in &self.content {
            child.collect_text(out);
        }
    }

    pub fn has_mark(&self, kind: &MarkKind) -> bool {
        self.marks.iter().any(|mark| &mark.kind == kind)
    }
}

/// Join neighbouring text nodes that carry the same marks and drop empty ones.
pub fn merge_adjacent_text(nodes: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if let NodeKind::Text(text) = &node.kind {
            if text.is_empty() {
                continue;
            }
            if let Some(prev) = out.last_mut() {
                if prev.marks == node.marks {
                    if let NodeKind::Text(prev_text) = &mut prev.kind {
                        prev_text.push_str(text);
                        continue;
                    }
                }
            }
        }
        out.push(node);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_text_with_equal_marks() {
        let merged = merge_adjacent_text(vec![
            Node::text("a"),
            Node::text(""),
            Node::text("b"),
            Node::text("c").with_marks(vec![Mark::bold()]),
            Node::text("d").with_marks(vec![Mark::bold()]),
            Node::hard_break(),
            Node::text("e"),
        ]);
        assert_eq!(
            merged,
            vec![
                Node::text("ab"),
                Node::text("cd").with_marks(vec![Mark::bold()]),
                Node::hard_break(),
                Node::text("e"),
            ]
        );
    }

    #[test]
    fn categories_follow_the_vocabulary() {
        assert!(Node::text("x").is_inline());
        assert!(Node::hard_break().is_inline());
        assert!(!Node::paragraph(vec![]).is_inline());
        assert!(Node::bullet_list(vec![]).kind.is_list());
    }

    #[test]
    fn text_content_concatenates_descendants() {
        let node = Node::paragraph(vec![
            Node::text("a "),
            Node::text("b").with_marks(vec![Mark::bold()]),
        ]);
        assert_eq!(node.text_content(), "a b");
    }

    #[test]
    fn descendants_walk_depth_first() {
        let doc = Document::new(vec![
            Node::blockquote(vec![Node::paragraph(vec![Node::text("q")])]),
            Node::paragraph(vec![]),
        ]);
        let names: Vec<_> = doc.descendants().map(Node::type_name).collect();
        assert_eq!(names, vec!["blockquote", "paragraph", "text", "paragraph"]);
    }

    #[test]
    fn html_tags_round_trip_by_name() {
        for tag in HtmlTag::ALL {
            assert_eq!(HtmlTag::from_name(tag.name()), Some(tag));
        }
        assert_eq!(HtmlTag::from_name("script"), None);
    }
}
