//! HTML sanitizer
//!
//! Raw HTML found in Markdown is parsed with html5ever and rebuilt as
//! document nodes through the [`policy`] table. Anything the table does not
//! name is dropped with its whole subtree, so no disallowed tag, attribute or
//! dangerous URL survives into the tree.
//!
//! Source spans come from [`scan`]: scanned start tags are matched with the
//! elements of the parsed tree in document order. Elements the HTML parser
//! implied (`tbody`, `html`, `body`) have no start tag and stay synthesized.

pub mod policy;
pub mod scan;
pub mod url;

use crate::model::{
    merge_adjacent_text, CellAttrs, ContentRule, KeyGenerator, LinkAttrs, Mark, MarkKind,
    MediaAttrs, Node, NodeKind, SourceMap,
};
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use policy::{SanitizedAttrs, TagRule, TagTarget};
use scan::ElementSpan;
use std::ops::Range;

pub use policy::{lookup, sanitize_attributes, TAG_POLICY};
pub use self::url::sanitize_url;

/// Where a fragment appears in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    /// A raw HTML block: inline results are wrapped in paragraphs
    Block,
    /// Inside a paragraph: block results are flattened to their inline content
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentContext {
    pub kind: FragmentKind,
    /// Byte offset of the fragment in the parsed text
    pub offset: usize,
}

impl FragmentContext {
    pub fn block(offset: usize) -> Self {
        FragmentContext {
            kind: FragmentKind::Block,
            offset,
        }
    }

    pub fn inline(offset: usize) -> Self {
        FragmentContext {
            kind: FragmentKind::Inline,
            offset,
        }
    }
}

/// Result of sanitizing one fragment
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedFragment {
    pub nodes: Vec<Node>,
    /// Whether anything was removed
    pub dropped: bool,
    /// Whether a URL attribute was rejected
    pub rejected_url: bool,
}

/// Convert a raw HTML fragment into allowed nodes.
///
/// A block fragment whose content is dropped entirely yields one
/// synthesized empty paragraph.
pub fn sanitize(
    raw_html: &str,
    context: FragmentContext,
    keys: &mut KeyGenerator,
) -> SanitizedFragment {
    let dom = parse_document(RcDom::default(), Default::default()).one(raw_html);
    let mut builder = FragmentBuilder {
        html: raw_html,
        offset: context.offset,
        spans: scan::scan_elements(raw_html),
        next_span: 0,
        cursor: 0,
        keys,
        dropped: false,
        rejected_url: false,
    };
    let pieces = builder.children(&dom.document);
    let nodes = match context.kind {
        FragmentKind::Block => {
            let blocks = builder.blocks(pieces);
            if blocks.is_empty() {
                vec![Node::paragraph(Vec::new())]
            } else {
                blocks
            }
        }
        FragmentKind::Inline => builder.inlines(pieces),
    };
    SanitizedFragment {
        nodes,
        dropped: builder.dropped,
        rejected_url: builder.rejected_url,
    }
}

/// A converted node and the part of the fragment it covers
struct Piece {
    node: Node,
    span: Option<Range<usize>>,
}

struct FragmentBuilder<'a> {
    html: &'a str,
    offset: usize,
    spans: Vec<ElementSpan>,
    next_span: usize,
    /// Scan position, only ever moves forward
    cursor: usize,
    keys: &'a mut KeyGenerator,
    dropped: bool,
    rejected_url: bool,
}

impl FragmentBuilder<'_> {
    fn children(&mut self, handle: &Handle) -> Vec<Piece> {
        let mut pieces = Vec::new();
        for child in handle.children.borrow().iter() {
            match &child.data {
                NodeData::Text { contents } => {
                    let text = contents.borrow().to_string();
                    let span = self.locate_text(&text);
                    pieces.push(Piece {
                        node: Node::text(text),
                        span,
                    });
                }
                NodeData::Element { name, attrs, .. } => {
                    let tag = name.local.to_string();
                    let raw_attrs: Vec<(String, String)> = attrs
                        .borrow()
                        .iter()
                        .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
                        .collect();
                    pieces.extend(self.element(child, &tag, &raw_attrs));
                }
                NodeData::Comment { .. }
                | NodeData::ProcessingInstruction { .. }
                | NodeData::Doctype { .. } => {
                    tracing::debug!("dropped HTML comment or declaration");
                    self.dropped = true;
                }
                _ => {}
            }
        }
        pieces
    }

    fn element(
        &mut self,
        handle: &Handle,
        tag: &str,
        raw_attrs: &[(String, String)],
    ) -> Vec<Piece> {
        let span = self.take_span(tag);
        if let Some(span) = &span {
            self.cursor = self.cursor.max(span.inner.start);
        }

        let pieces = match policy::lookup(tag) {
            Some(rule) => {
                let attrs = policy::sanitize_attributes(rule, raw_attrs);
                self.rejected_url |= attrs.rejected_url();
                self.convert(handle, rule, &attrs, span.as_ref())
            }
            None => {
                if span.is_some() || !handle.children.borrow().is_empty() {
                    tracing::debug!(tag, "dropped disallowed element");
                    self.dropped = true;
                }
                self.skip_subtree(handle);
                Vec::new()
            }
        };

        if let Some(span) = &span {
            self.cursor = self.cursor.max(span.outer.end);
        }
        pieces
    }

    fn convert(
        &mut self,
        handle: &Handle,
        rule: &TagRule,
        attrs: &SanitizedAttrs,
        span: Option<&ElementSpan>,
    ) -> Vec<Piece> {
        let outer = span.map(|s| s.outer.clone());
        let source = match &outer {
            Some(range) => self.source(range.clone(), Some(rule.tag)),
            None => SourceMap::Synthesized,
        };

        let node = match rule.target {
            TagTarget::Transparent | TagTarget::TableSection => return self.children(handle),
            TagTarget::Bold
            | TagTarget::Italic
            | TagTarget::Strike
            | TagTarget::Code
            | TagTarget::Link
            | TagTarget::Highlight => {
                let mark = Mark {
                    kind: mark_kind(rule.target, attrs),
                    source,
                };
                let mut pieces = self.children(handle);
                for piece in &mut pieces {
                    apply_mark(&mut piece.node, &mark);
                    if outer.is_some() {
                        piece.span = outer.clone();
                    }
                }
                return pieces;
            }
            TagTarget::Image => Node::leaf(NodeKind::Image(media_attrs(attrs))),
            TagTarget::Audio => Node::leaf(NodeKind::Audio(media_attrs(attrs))),
            TagTarget::Video => Node::leaf(NodeKind::Video(media_attrs(attrs))),
            TagTarget::HardBreak => Node::hard_break(),
            TagTarget::HorizontalRule => Node::leaf(NodeKind::HorizontalRule),
            TagTarget::Paragraph => {
                let pieces = self.children(handle);
                Node::paragraph(self.inlines(pieces))
            }
            TagTarget::Heading(level) => {
                let pieces = self.children(handle);
                Node::heading(level, self.inlines(pieces))
            }
            TagTarget::Blockquote => {
                let pieces = self.children(handle);
                Node::blockquote(self.blocks(pieces))
            }
            TagTarget::Html(tag) => {
                let pieces = self.children(handle);
                Node::new(NodeKind::HtmlElement { tag }, self.blocks(pieces))
            }
            TagTarget::ListItem => {
                let pieces = self.children(handle);
                Node::list_item(self.blocks(pieces))
            }
            TagTarget::BulletList => {
                let pieces = self.children(handle);
                Node::new(NodeKind::BulletList { bullet: '*' }, self.list_items(pieces))
            }
            TagTarget::OrderedList => {
                let pieces = self.children(handle);
                let start = attrs.integer("start").map_or(1, u64::from);
                Node::new(
                    NodeKind::OrderedList {
                        start,
                        parens: false,
                    },
                    self.list_items(pieces),
                )
            }
            TagTarget::Table => {
                let rows = self
                    .children(handle)
                    .into_iter()
                    .map(|piece| piece.node)
                    .filter(|node| matches!(node.kind, NodeKind::TableRow))
                    .collect();
                Node::new(NodeKind::Table, rows)
            }
            TagTarget::TableRow => {
                let cells = self
                    .children(handle)
                    .into_iter()
                    .map(|piece| piece.node)
                    .filter(|node| node.kind.is_table_cell())
                    .collect();
                Node::new(NodeKind::TableRow, cells)
            }
            TagTarget::TableHeader | TagTarget::TableCell => {
                let cell = CellAttrs {
                    colspan: attrs.integer("colspan").unwrap_or(1),
                    rowspan: attrs.integer("rowspan").unwrap_or(1),
                    align: attrs.alignment("align"),
                };
                let pieces = self.children(handle);
                let mut content = self.blocks(pieces);
                if content.is_empty() {
                    content.push(Node::paragraph(Vec::new()));
                }
                let kind = if rule.target == TagTarget::TableHeader {
                    NodeKind::TableHeader(cell)
                } else {
                    NodeKind::TableCell(cell)
                };
                Node::new(kind, content)
            }
        };

        vec![Piece {
            node: node.with_source(source),
            span: outer,
        }]
    }

    /// Wrap runs of inline pieces into paragraphs.
    fn blocks(&mut self, pieces: Vec<Piece>) -> Vec<Node> {
        let mut out = Vec::new();
        let mut run: Vec<Piece> = Vec::new();
        for piece in pieces {
            if piece.node.is_inline() {
                run.push(piece);
            } else {
                self.flush_run(&mut run, &mut out);
                out.push(piece.node);
            }
        }
        self.flush_run(&mut run, &mut out);
        out
    }

    fn flush_run(&mut self, run: &mut Vec<Piece>, out: &mut Vec<Node>) {
        let pieces = std::mem::take(run);
        let blank = pieces.iter().all(|piece| {
            piece.node.marks.is_empty()
                && piece
                    .node
                    .as_text()
                    .is_some_and(|text| text.trim().is_empty())
        });
        if blank {
            return;
        }

        let start = pieces.iter().filter_map(|p| p.span.as_ref()).map(|s| s.start).min();
        let end = pieces.iter().filter_map(|p| p.span.as_ref()).map(|s| s.end).max();
        let mut content: Vec<Node> = pieces.into_iter().map(|piece| piece.node).collect();
        trim_run_edges(&mut content);

        let source = match (start, end) {
            (Some(start), Some(end)) => {
                let range = trim_range(self.html, start..end);
                self.source(range, None)
            }
            _ => SourceMap::Synthesized,
        };
        out.push(Node::paragraph(merge_adjacent_text(content)).with_source(source));
    }

    /// Flatten pieces to inline nodes, lifting the content of blocks.
    fn inlines(&mut self, pieces: Vec<Piece>) -> Vec<Node> {
        let mut out = Vec::new();
        for piece in pieces {
            collect_inlines(piece.node, &mut out);
        }
        merge_adjacent_text(out)
    }

    fn list_items(&mut self, pieces: Vec<Piece>) -> Vec<Node> {
        let mut items = Vec::new();
        let mut stray = Vec::new();
        for piece in pieces {
            if matches!(piece.node.kind, NodeKind::ListItem) {
                if !stray.is_empty() {
                    let content = self.blocks(std::mem::take(&mut stray));
                    if !content.is_empty() {
                        items.push(Node::list_item(content));
                    }
                }
                items.push(piece.node);
            } else {
                stray.push(piece);
            }
        }
        let content = self.blocks(stray);
        if !content.is_empty() {
            items.push(Node::list_item(content));
        }
        items
    }

    fn take_span(&mut self, tag: &str) -> Option<ElementSpan> {
        let span = self.spans.get(self.next_span)?;
        if span.name != tag {
            return None;
        }
        self.next_span += 1;
        Some(span.clone())
    }

    /// Consume the spans of a dropped element's descendants.
    fn skip_subtree(&mut self, handle: &Handle) {
        for child in handle.children.borrow().iter() {
            if let NodeData::Element { name, .. } = &child.data {
                if let Some(span) = self.take_span(&name.local) {
                    self.cursor = self.cursor.max(span.outer.end);
                }
                self.skip_subtree(child);
            }
        }
    }

    /// Find `text` between the cursor and the next tag.
    fn locate_text(&mut self, text: &str) -> Option<Range<usize>> {
        let rest = self.html.get(self.cursor..)?;
        let limit = rest.find('<').unwrap_or(rest.len());
        let found = rest[..limit].find(text).filter(|_| !text.is_empty())?;
        let start = self.cursor + found;
        self.cursor = start + text.len();
        Some(start..self.cursor)
    }

    fn source(&mut self, range: Range<usize>, tag: Option<&str>) -> SourceMap {
        let mut map = self.keys.recover_tagged(self.html, range, tag);
        if let SourceMap::Recovered(span) = &mut map {
            if let Some(range) = &mut span.range {
                *range = range.start + self.offset..range.end + self.offset;
            }
        }
        map
    }
}

pub(crate) fn mark_kind(target: TagTarget, attrs: &SanitizedAttrs) -> MarkKind {
    match target {
        TagTarget::Bold => MarkKind::Bold,
        TagTarget::Italic => MarkKind::Italic,
        TagTarget::Strike => MarkKind::Strike,
        TagTarget::Code => MarkKind::Code,
        TagTarget::Highlight => MarkKind::Highlight,
        _ => MarkKind::Link(LinkAttrs {
            href: attrs.url("href"),
            canonical_src: None,
            title: attrs.text("title"),
            is_reference: false,
        }),
    }
}

fn media_attrs(attrs: &SanitizedAttrs) -> MediaAttrs {
    MediaAttrs {
        src: attrs.url("src"),
        canonical_src: None,
        alt: attrs.text("alt"),
        title: attrs.text("title"),
        is_reference: false,
        width: attrs.text("width"),
        height: attrs.text("height"),
    }
}

/// Add `mark` outside the marks already on every inline node below `node`.
pub(crate) fn apply_mark(node: &mut Node, mark: &Mark) {
    if node.is_inline() {
        node.marks.insert(0, mark.clone());
        return;
    }
    if ContentRule::for_kind(&node.kind) == ContentRule::Text {
        return;
    }
    for child in &mut node.content {
        apply_mark(child, mark);
    }
}

fn collect_inlines(node: Node, out: &mut Vec<Node>) {
    if node.is_inline() {
        out.push(node);
        return;
    }
    for child in node.content {
        collect_inlines(child, out);
    }
}

/// Drop leading whitespace of the first and trailing whitespace of the last
/// unmarked text of a paragraph run.
fn trim_run_edges(content: &mut Vec<Node>) {
    if let Some(first) = content.first_mut() {
        if first.marks.is_empty() {
            if let NodeKind::Text(text) = &mut first.kind {
                *text = text.trim_start().to_string();
            }
        }
    }
    if let Some(last) = content.last_mut() {
        if last.marks.is_empty() {
            if let NodeKind::Text(text) = &mut last.kind {
                *text = text.trim_end().to_string();
            }
        }
    }
}

fn trim_range(text: &str, range: Range<usize>) -> Range<usize> {
    let Some(slice) = text.get(range.clone()) else {
        return range;
    };
    let start = range.start + (slice.len() - slice.trim_start().len());
    let end = range.end - (slice.len() - slice.trim_end().len());
    start..end.max(start)
}
