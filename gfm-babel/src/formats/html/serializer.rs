//! HTML serialization (document tree → HTML)
//!
//! Pipeline: Document → RcDom (HTML DOM tree) → HTML string.
//! Inline runs are regrouped by their marks, outermost first, so adjacent
//! nodes sharing a mark end up inside one element.

use crate::error::FormatError;
use crate::model::{CellAttrs, Document, LinkAttrs, Mark, MarkKind, MediaAttrs, Node, NodeKind};
use html5ever::{
    ns, serialize, serialize::SerializeOpts, serialize::TraversalScope, Attribute, LocalName,
    QualName,
};
use markup5ever_rcdom::{Handle, Node as DomNode, NodeData, RcDom, SerializableHandle};
use std::cell::{Cell, RefCell};
use std::default::Default;
use std::rc::Rc;

/// `rel` written on every link
pub const LINK_REL: &str = "noopener noreferrer nofollow";

/// Options for HTML serialization
#[derive(Debug, Clone, Default)]
pub struct HtmlOptions {
    /// Wrap the fragment in a complete HTML5 document
    pub standalone: bool,
    /// Optional CSS embedded in a standalone document
    pub custom_css: Option<String>,
}

impl HtmlOptions {
    pub fn standalone() -> Self {
        Self {
            standalone: true,
            custom_css: None,
        }
    }

    pub fn with_custom_css(mut self, css: String) -> Self {
        self.custom_css = Some(css);
        self
    }
}

/// Serialize a document to an HTML fragment
pub fn serialize_to_html(doc: &Document) -> Result<String, FormatError> {
    serialize_to_html_with_options(doc, &HtmlOptions::default())
}

/// Serialize a document to HTML with full options
pub fn serialize_to_html_with_options(
    doc: &Document,
    options: &HtmlOptions,
) -> Result<String, FormatError> {
    // Step 1: Document → RcDom
    let dom = build_html_dom(doc)?;

    // Step 2: RcDom → HTML string
    let html_string = serialize_dom(&dom)?;

    if !options.standalone {
        return Ok(html_string);
    }

    // Step 3: Wrap in complete HTML document
    let title = doc
        .descendants()
        .find(|node| matches!(node.kind, NodeKind::Heading { .. }))
        .map(Node::text_content)
        .filter(|title| !title.trim().is_empty())
        .unwrap_or_else(|| "Document".to_string());
    Ok(wrap_in_document(&html_string, &title, options))
}

/// Build an HTML DOM tree from the document
fn build_html_dom(doc: &Document) -> Result<RcDom, FormatError> {
    let dom = RcDom::default();
    let container = create_element("div", vec![]);
    let mut builder = DomBuilder { doc };
    for node in &doc.content {
        builder.block(&container, node)?;
    }
    dom.document.children.borrow_mut().push(container);
    Ok(dom)
}

struct DomBuilder<'d> {
    doc: &'d Document,
}

impl DomBuilder<'_> {
    fn block(&mut self, parent: &Handle, node: &Node) -> Result<(), FormatError> {
        let element = match &node.kind {
            NodeKind::Paragraph => {
                let p = create_element("p", vec![]);
                add_inlines(&p, &node.content, 0)?;
                p
            }
            NodeKind::Heading { level, .. } => {
                let tag = format!("h{}", (*level).clamp(1, 6));
                let id = slug(&node.text_content());
                let heading = create_element(&tag, vec![("id", id.as_str())]);
                add_inlines(&heading, &node.content, 0)?;
                heading
            }
            NodeKind::Blockquote { .. } => self.container("blockquote", vec![], node)?,
            NodeKind::BulletList { .. } => self.container("ul", vec![], node)?,
            NodeKind::OrderedList { start, .. } => {
                let start = start.to_string();
                let attrs = if start == "1" { vec![] } else { vec![("start", start.as_str())] };
                self.container("ol", attrs, node)?
            }
            NodeKind::TaskList { numeric, .. } => {
                let tag = if *numeric { "ol" } else { "ul" };
                self.container(tag, vec![("class", "task-list")], node)?
            }
            NodeKind::ListItem => self.container("li", vec![], node)?,
            NodeKind::TaskItem { checked } => {
                let li = create_element("li", vec![("class", "task-list-item")]);
                let mut attrs = vec![("type", "checkbox"), ("disabled", "")];
                if *checked {
                    attrs.push(("checked", ""));
                }
                append(&li, create_element("input", attrs));
                for child in &node.content {
                    self.block(&li, child)?;
                }
                li
            }
            NodeKind::CodeBlock {
                language,
                lang_params,
                ..
            } => {
                let class = language.as_ref().map(|lang| format!("language-{lang}"));
                let mut attrs = vec![];
                if let Some(class) = &class {
                    attrs.push(("class", class.as_str()));
                }
                if let Some(params) = lang_params {
                    attrs.push(("data-lang-params", params.as_str()));
                }
                code_block(attrs, &node.text_content())
            }
            NodeKind::Diagram { language } => code_block(
                vec![("class", "diagram"), ("data-diagram", language.as_str())],
                &node.text_content(),
            ),
            NodeKind::Frontmatter { language } => code_block(
                vec![("class", "frontmatter"), ("data-language", language.as_str())],
                &node.text_content(),
            ),
            NodeKind::Table => self.table(node)?,
            NodeKind::HorizontalRule => create_element("hr", vec![]),
            NodeKind::FootnoteDefinition { label, .. } => {
                let id = format!("fn-{label}");
                self.container(
                    "div",
                    vec![("class", "footnote"), ("id", id.as_str())],
                    node,
                )?
            }
            // Definitions only feed reference links
            NodeKind::ReferenceDefinition { .. } => return Ok(()),
            NodeKind::TableOfContents => self.table_of_contents(),
            NodeKind::HtmlElement { tag } => self.container(tag.name(), vec![], node)?,
            NodeKind::TableRow | NodeKind::TableHeader(_) | NodeKind::TableCell(_) => {
                return Err(FormatError::SerializationError(format!(
                    "{} outside a table",
                    node.type_name()
                )))
            }
            _ => {
                // Inline content at block level renders as a paragraph
                let p = create_element("p", vec![]);
                add_inlines(&p, std::slice::from_ref(node), 0)?;
                p
            }
        };
        append(parent, element);
        Ok(())
    }

    fn container(
        &mut self,
        tag: &str,
        attrs: Vec<(&str, &str)>,
        node: &Node,
    ) -> Result<Handle, FormatError> {
        let element = create_element(tag, attrs);
        for child in &node.content {
            self.block(&element, child)?;
        }
        Ok(element)
    }

    fn table(&mut self, node: &Node) -> Result<Handle, FormatError> {
        let table = create_element("table", vec![]);
        for row in &node.content {
            let tr = create_element("tr", vec![]);
            for cell in &row.content {
                let (tag, attrs) = match &cell.kind {
                    NodeKind::TableHeader(attrs) => ("th", attrs),
                    NodeKind::TableCell(attrs) => ("td", attrs),
                    _ => {
                        return Err(FormatError::SerializationError(format!(
                            "{} inside a table row",
                            cell.type_name()
                        )))
                    }
                };
                let td = cell_element(tag, attrs);
                for child in &cell.content {
                    self.block(&td, child)?;
                }
                append(&tr, td);
            }
            append(&table, tr);
        }
        Ok(table)
    }

    /// Nested list of links to every heading in the document
    fn table_of_contents(&self) -> Handle {
        let nav = create_element("ul", vec![("class", "section-nav")]);
        for heading in self.doc.descendants() {
            if !matches!(heading.kind, NodeKind::Heading { .. }) {
                continue;
            }
            let text = heading.text_content();
            let href = format!("#{}", slug(&text));
            let li = create_element("li", vec![]);
            let a = create_element("a", vec![("href", href.as_str())]);
            append(&a, create_text(&text));
            append(&li, a);
            append(&nav, li);
        }
        nav
    }
}

fn cell_element(tag: &str, attrs: &CellAttrs) -> Handle {
    let colspan = attrs.colspan.to_string();
    let rowspan = attrs.rowspan.to_string();
    let style = attrs.align.map(|align| format!("text-align: {}", align.as_str()));
    let mut html_attrs = vec![];
    if attrs.colspan != 1 {
        html_attrs.push(("colspan", colspan.as_str()));
    }
    if attrs.rowspan != 1 {
        html_attrs.push(("rowspan", rowspan.as_str()));
    }
    if let Some(style) = &style {
        html_attrs.push(("style", style.as_str()));
    }
    create_element(tag, html_attrs)
}

fn code_block(attrs: Vec<(&str, &str)>, code: &str) -> Handle {
    let pre = create_element("pre", vec![]);
    let element = create_element("code", attrs);
    append(&element, create_text(code));
    append(&pre, element);
    pre
}

/// Add inline nodes to `parent`, opening one element per shared mark at
/// `depth` in the mark stacks.
fn add_inlines(parent: &Handle, nodes: &[Node], depth: usize) -> Result<(), FormatError> {
    let mut i = 0;
    while i < nodes.len() {
        let Some(mark) = nodes[i].marks.get(depth) else {
            add_inline(parent, &nodes[i])?;
            i += 1;
            continue;
        };
        let end = nodes[i..]
            .iter()
            .position(|node| node.marks.get(depth) != Some(mark))
            .map_or(nodes.len(), |offset| i + offset);
        let element = mark_element(mark);
        add_inlines(&element, &nodes[i..end], depth + 1)?;
        append(parent, element);
        i = end;
    }
    Ok(())
}

fn mark_element(mark: &Mark) -> Handle {
    match &mark.kind {
        MarkKind::Bold => create_element("strong", vec![]),
        MarkKind::Italic => create_element("em", vec![]),
        MarkKind::Strike => create_element("del", vec![]),
        MarkKind::Code => create_element("code", vec![]),
        MarkKind::Highlight => create_element("mark", vec![]),
        MarkKind::InlineDiff(diff) => {
            let class = format!("idiff {}", diff.name());
            create_element("span", vec![("class", class.as_str())])
        }
        MarkKind::Link(LinkAttrs { href, title, .. }) => {
            let mut attrs = vec![];
            if let Some(href) = href {
                attrs.push(("href", href.as_str()));
            }
            if let Some(title) = title {
                attrs.push(("title", title.as_str()));
            }
            attrs.push(("target", "_blank"));
            attrs.push(("rel", LINK_REL));
            create_element("a", attrs)
        }
    }
}

fn add_inline(parent: &Handle, node: &Node) -> Result<(), FormatError> {
    let element = match &node.kind {
        NodeKind::Text(text) => create_text(text),
        NodeKind::HardBreak => create_element("br", vec![]),
        NodeKind::Image(media) => media_element("img", media, &[]),
        NodeKind::Audio(media) => media_element("audio", media, &[("controls", "")]),
        NodeKind::Video(media) => media_element("video", media, &[("controls", "")]),
        NodeKind::FootnoteReference { label, .. } => {
            let href = format!("#fn-{label}");
            let sup = create_element("sup", vec![]);
            let a = create_element("a", vec![("href", href.as_str())]);
            append(&a, create_text(label));
            append(&sup, a);
            sup
        }
        _ => {
            return Err(FormatError::SerializationError(format!(
                "{} inside inline content",
                node.type_name()
            )))
        }
    };
    append(parent, element);
    Ok(())
}

fn media_element(tag: &str, media: &MediaAttrs, extra: &[(&str, &str)]) -> Handle {
    let mut attrs = vec![];
    if let Some(src) = &media.src {
        attrs.push(("src", src.as_str()));
    }
    if let Some(alt) = &media.alt {
        attrs.push(("alt", alt.as_str()));
    }
    if let Some(title) = &media.title {
        attrs.push(("title", title.as_str()));
    }
    if let Some(width) = &media.width {
        attrs.push(("width", width.as_str()));
    }
    if let Some(height) = &media.height {
        attrs.push(("height", height.as_str()));
    }
    attrs.extend_from_slice(extra);
    create_element(tag, attrs)
}

/// Heading anchor: lowercase words joined by dashes
fn slug(text: &str) -> String {
    let mut slug = String::new();
    for c in text.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() || c == '_' || c == '-' {
            slug.push(c);
        } else if c.is_whitespace() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug
}

fn append(parent: &Handle, child: Handle) {
    parent.children.borrow_mut().push(child);
}

/// Create an HTML element with attributes
fn create_element(tag: &str, attrs: Vec<(&str, &str)>) -> Handle {
    let qual_name = QualName::new(None, ns!(html), LocalName::from(tag));
    let attributes = attrs
        .into_iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(name)),
            value: value.to_string().into(),
        })
        .collect();

    Rc::new(DomNode {
        parent: Cell::new(None),
        children: RefCell::new(Vec::new()),
        data: NodeData::Element {
            name: qual_name,
            attrs: RefCell::new(attributes),
            template_contents: Default::default(),
            mathml_annotation_xml_integration_point: false,
        },
    })
}

/// Create a text node
fn create_text(text: &str) -> Handle {
    Rc::new(DomNode {
        parent: Cell::new(None),
        children: RefCell::new(Vec::new()),
        data: NodeData::Text {
            contents: RefCell::new(text.to_string().into()),
        },
    })
}

/// Serialize the DOM to an HTML string (just the inner content)
fn serialize_dom(dom: &RcDom) -> Result<String, FormatError> {
    let mut output = Vec::new();

    let container = dom
        .document
        .children
        .borrow()
        .first()
        .ok_or_else(|| FormatError::SerializationError("Empty document".to_string()))?
        .clone();

    // Use TraversalScope::IncludeNode to serialize the element AND its children
    let opts = SerializeOpts {
        traversal_scope: TraversalScope::IncludeNode,
        ..Default::default()
    };

    for child in container.children.borrow().iter() {
        let serializable = SerializableHandle::from(child.clone());
        serialize(&mut output, &serializable, opts.clone()).map_err(|e| {
            FormatError::SerializationError(format!("HTML serialization failed: {e}"))
        })?;
    }

    String::from_utf8(output)
        .map_err(|e| FormatError::SerializationError(format!("UTF-8 conversion failed: {e}")))
}

/// Wrap the content in a complete HTML document
fn wrap_in_document(body_html: &str, title: &str, options: &HtmlOptions) -> String {
    let custom_css = options.custom_css.as_deref().unwrap_or("");
    let escaped_title = html_escape(title);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="generator" content="gfm-babel">
  <title>{escaped_title}</title>
  <style>
{custom_css}
  </style>
</head>
<body>
{body_html}
</body>
</html>"#
    )
}

/// Escape HTML special characters in text
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
