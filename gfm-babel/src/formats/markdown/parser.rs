//! Markdown parsing (Markdown → document tree)
//!
//! Pipeline: Markdown string → frontmatter split → Comrak AST → document
//! nodes. Every node and mark built from literal input keeps the slice of
//! input it came from, so the serializer can reproduce untouched parts byte
//! for byte.

use comrak::nodes::{
    AstNode, ListDelimType, ListType, NodeCode, NodeCodeBlock, NodeLink, NodeList, NodeValue,
    TableAlignment,
};
use comrak::{parse_document, Arena, ComrakOptions};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::ops::Range;
use url::Url;

use super::definitions::{self, normalize_label, Definition};
use super::source::{blank_out, detect_frontmatter, FrontmatterBlock, SourceText};
use crate::error::ParseError;
use crate::model::{
    merge_adjacent_text, Alignment, CellAttrs, CodeFence, DiffKind, Document, KeyGenerator,
    LinkAttrs, Mark, MarkKind, MediaAttrs, Node, NodeKind, SourceMap,
};
use crate::sanitizer::policy::TagTarget;
use crate::sanitizer::{self, apply_mark, mark_kind, scan, FragmentContext};

/// Fence languages rendered as diagrams
const DIAGRAM_LANGUAGES: &[&str] = &["mermaid", "plantuml"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "oga", "ogg", "spx", "wav"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "webm", "ogv"];
/// Markers a paragraph may consist of to request a table of contents
const TOC_MARKERS: &[&str] = &["[[_TOC_]]", "[TOC]"];

/// GFM extensions and limits used while parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserOptions {
    pub tables: bool,
    pub strikethrough: bool,
    pub autolinks: bool,
    pub task_lists: bool,
    pub footnotes: bool,
    pub multiline_blockquotes: bool,
    pub frontmatter: bool,
    /// Deepest container nesting accepted before giving up
    pub max_nesting: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            tables: true,
            strikethrough: true,
            autolinks: true,
            task_lists: true,
            footnotes: true,
            multiline_blockquotes: true,
            frontmatter: true,
            max_nesting: 256,
        }
    }
}

/// Parse GFM with the default options.
pub fn deserialize(markdown: &str) -> Result<Document, ParseError> {
    MarkdownParser::default().parse(markdown)
}

/// Parse GFM given as bytes, which must be UTF-8.
pub fn deserialize_bytes(bytes: &[u8]) -> Result<Document, ParseError> {
    let text = std::str::from_utf8(bytes).map_err(|e| ParseError::InvalidEncoding {
        valid_up_to: e.valid_up_to(),
    })?;
    deserialize(text)
}

#[derive(Debug, Clone, Default)]
pub struct MarkdownParser {
    options: ParserOptions,
}

impl MarkdownParser {
    pub fn new(options: ParserOptions) -> Self {
        MarkdownParser { options }
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Parse a Markdown string into a document tree
    pub fn parse(&self, markdown: &str) -> Result<Document, ParseError> {
        // Step 1: Split off frontmatter, which comrak would otherwise read as
        // a thematic break and a setext heading
        let frontmatter = if self.options.frontmatter {
            detect_frontmatter(markdown)
        } else {
            None
        };
        let input: Cow<str> = match &frontmatter {
            Some(block) => Cow::Owned(blank_out(markdown, block.range.clone())),
            None => Cow::Borrowed(markdown),
        };

        // Step 2: Parse the remaining text to a Comrak AST
        let arena = Arena::new();
        let root = parse_document(&arena, &input, &comrak_options(&self.options));

        // Step 3: Convert the AST, slicing sources from the original text
        let mut builder = TreeBuilder::new(markdown, self.options.clone(), KeyGenerator::new());
        let mut content = Vec::new();
        if let Some(block) = frontmatter {
            content.push(builder.frontmatter(block));
        }
        content.extend(builder.document(root)?);
        clear_neutralized(&mut content, &builder.neutralized);
        if content.is_empty() {
            content.push(Node::paragraph(Vec::new()));
        }
        record_gaps(&mut content, markdown);

        let document = Document::new(content);
        if let Err(violation) = document.validate() {
            tracing::warn!(%violation, "parsed tree breaks the document schema");
        }
        Ok(document)
    }
}

fn comrak_options(options: &ParserOptions) -> ComrakOptions<'static> {
    let mut comrak = ComrakOptions::default();
    comrak.extension.table = options.tables;
    comrak.extension.strikethrough = options.strikethrough;
    comrak.extension.autolink = options.autolinks;
    comrak.extension.tasklist = options.task_lists;
    comrak.extension.footnotes = options.footnotes;
    comrak.extension.multiline_block_quotes = options.multiline_blockquotes;
    comrak
}

/// Builds document nodes from one Comrak AST
struct TreeBuilder<'s> {
    source: SourceText<'s>,
    options: ParserOptions,
    keys: KeyGenerator,
    /// Input ranges holding a URL the sanitizer rejected
    neutralized: Vec<Range<usize>>,
}

impl<'s> TreeBuilder<'s> {
    fn new(text: &'s str, options: ParserOptions, keys: KeyGenerator) -> Self {
        TreeBuilder {
            source: SourceText::new(text),
            options,
            keys,
            neutralized: Vec::new(),
        }
    }

    fn enter(&self, depth: usize) -> Result<usize, ParseError> {
        let depth = depth + 1;
        if depth > self.options.max_nesting {
            return Err(ParseError::NestingTooDeep {
                depth,
                limit: self.options.max_nesting,
            });
        }
        Ok(depth)
    }

    // Sources

    fn range_of<'a>(&self, node: &'a AstNode<'a>) -> Option<Range<usize>> {
        self.source.range(&node.data.borrow().sourcepos)
    }

    fn slice_of<'a>(&self, node: &'a AstNode<'a>) -> Option<&'s str> {
        self.range_of(node).and_then(|range| self.source.slice(range))
    }

    fn recover(&mut self, range: Range<usize>) -> SourceMap {
        if range.is_empty() {
            return SourceMap::Synthesized;
        }
        let text = self.source.text();
        self.keys.recover(text, range)
    }

    fn recover_tagged(&mut self, range: Range<usize>, tag: &str) -> SourceMap {
        let text = self.source.text();
        self.keys.recover_tagged(text, range, Some(tag))
    }

    fn source_of<'a>(&mut self, node: &'a AstNode<'a>) -> SourceMap {
        match self.block_range(node) {
            Some(range) => self.recover(range),
            None => SourceMap::Synthesized,
        }
    }

    /// Range of a block including the indentation comrak leaves out of
    /// its position: all of it at the top level, and the four columns that
    /// make an indented code block anywhere else.
    fn block_range<'a>(&self, node: &'a AstNode<'a>) -> Option<Range<usize>> {
        let range = self.range_of(node)?;
        let line_start = self.source.line_start(range.start);
        let indent = self.source.slice(line_start..range.start)?;
        if !indent.bytes().all(|b| b == b' ' || b == b'\t') {
            return Some(range);
        }
        let top_level = node
            .parent()
            .is_some_and(|parent| matches!(parent.data.borrow().value, NodeValue::Document));
        let indented_code = matches!(
            &node.data.borrow().value,
            NodeValue::CodeBlock(code) if !code.fenced
        );
        let start = if top_level {
            line_start
        } else if indented_code {
            range.start - code_indent_len(indent)
        } else {
            range.start
        };
        Some(start..range.end)
    }

    /// Like [`Self::source_of`], without surrounding whitespace
    fn trimmed_source_of<'a>(&mut self, node: &'a AstNode<'a>) -> SourceMap {
        let Some(range) = self.range_of(node) else {
            return SourceMap::Synthesized;
        };
        let slice = self.source.slice(range.clone()).unwrap_or("");
        let start = range.start + slice.len() - slice.trim_start().len();
        self.recover(start..start + slice.trim().len())
    }

    /// Recover the source of `node` only when its slice passes `valid`.
    fn checked_source<'a>(
        &mut self,
        node: &'a AstNode<'a>,
        valid: fn(&str) -> bool,
    ) -> SourceMap {
        match self.range_of(node) {
            Some(range) if self.source.slice(range.clone()).is_some_and(valid) => {
                self.recover(range)
            }
            _ => {
                tracing::debug!("source slice does not match its construct");
                SourceMap::Synthesized
            }
        }
    }

    // Blocks

    fn document<'a>(&mut self, root: &'a AstNode<'a>) -> Result<Vec<Node>, ParseError> {
        let (footnotes, blocks): (Vec<_>, Vec<_>) = root
            .children()
            .partition(|child| {
                matches!(child.data.borrow().value, NodeValue::FootnoteDefinition(_))
            });

        let mut content = self.block_list(&blocks, 0)?;

        // comrak moves referenced footnote definitions to the end
        for footnote in footnotes {
            for node in self.block(footnote, 0)? {
                insert_in_source_order(&mut content, node);
            }
        }

        // Definitions comrak dropped live in the lines no block covers
        for definition in self.uncovered_definitions(&content) {
            if let Some(node) = self.definition(definition, 0)? {
                insert_in_source_order(&mut content, node);
            }
        }
        Ok(content)
    }

    fn children<'a>(
        &mut self,
        node: &'a AstNode<'a>,
        depth: usize,
    ) -> Result<Vec<Node>, ParseError> {
        let children: Vec<_> = node.children().collect();
        self.block_list(&children, depth)
    }

    /// Convert sibling blocks. A raw HTML block that opens an allowed
    /// element without closing it applies to the siblings up to the block
    /// holding its closing tag. A block may open an HTML container with the
    /// first children written after the tag, as in `<details>` followed by
    /// `<summary>`.
    fn block_list<'a>(
        &mut self,
        children: &[&'a AstNode<'a>],
        depth: usize,
    ) -> Result<Vec<Node>, ParseError> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < children.len() {
            let child = children[i];
            if let Some(opening) = opening_block(child) {
                let close = find_closing_block(children, i, &opening.tag.name);
                if let Some(wrapped) = self.wrap_siblings(children, i, close, &opening, depth)? {
                    out.extend(wrapped);
                    i = close.map_or(children.len(), |close| close + 1);
                    continue;
                }
            }
            out.extend(self.block(child, depth)?);
            i += 1;
        }
        Ok(out)
    }

    /// Apply the element opened at `children[open]` to the siblings before
    /// `close`. `None` when the element is not allowed here.
    fn wrap_siblings<'a>(
        &mut self,
        children: &[&'a AstNode<'a>],
        open: usize,
        close: Option<usize>,
        opening: &OpeningBlock,
        depth: usize,
    ) -> Result<Option<Vec<Node>>, ParseError> {
        let tag = &opening.tag;
        let Some(rule) = sanitizer::lookup(&tag.name) else {
            return Ok(None);
        };
        let has_rest = !opening.rest.trim().is_empty();
        let allowed = match rule.target {
            TagTarget::Html(_) => !has_rest || close.is_some(),
            target => target.is_mark() && !has_rest,
        };
        if !allowed {
            return Ok(None);
        }

        let child = children[open];
        let end = close.unwrap_or(children.len());
        let inner_depth = self.enter(depth)?;
        let mut inner = Vec::new();
        if has_rest {
            let offset = self.literal_offset(child, &opening.literal) + tag.range.end;
            let rest = opening.rest.trim_end();
            inner.extend(self.sanitize_fragment(rest, FragmentContext::block(offset)));
        }
        inner.extend(self.block_list(&children[open + 1..end], inner_depth)?);

        let span = close.and_then(|close| {
            let start = self.block_range(child)?.start;
            let end = self.range_of(children[close])?.end;
            Some(start..end)
        });
        let attrs = sanitizer::sanitize_attributes(rule, &tag.attrs);
        let source = match span {
            Some(span) if attrs.rejected_url() => {
                self.neutralized.push(span);
                SourceMap::Synthesized
            }
            Some(span) => self.recover_tagged(span, rule.tag),
            None => SourceMap::Synthesized,
        };

        let mut out = Vec::new();
        match rule.target {
            TagTarget::Html(html) => {
                out.push(Node::new(NodeKind::HtmlElement { tag: html }, inner).with_source(source));
            }
            target => {
                let single = inner.len() == 1;
                let block_source = if single {
                    source.clone()
                } else {
                    SourceMap::Synthesized
                };
                let mark = Mark {
                    kind: mark_kind(target, &attrs),
                    source,
                };
                for mut node in inner {
                    // The block's own source no longer shows the tag
                    if single {
                        node.source = block_source.clone();
                    } else {
                        clear_sources(&mut node);
                    }
                    apply_mark(&mut node, &mark);
                    out.push(node);
                }
            }
        }
        Ok(Some(out))
    }

    fn block<'a>(&mut self, node: &'a AstNode<'a>, depth: usize) -> Result<Vec<Node>, ParseError> {
        let depth = self.enter(depth)?;
        let value = node.data.borrow().value.clone();
        let converted = match value {
            NodeValue::Paragraph => self.paragraph(node, depth)?,
            NodeValue::Heading(heading) => {
                let content = self.inlines(node, depth)?;
                Node::new(
                    NodeKind::Heading {
                        level: heading.level,
                        setext: heading.setext,
                    },
                    content,
                )
                .with_source(self.source_of(node))
            }
            NodeValue::BlockQuote => {
                let content = self.children(node, depth)?;
                Node::new(NodeKind::Blockquote { multiline: false }, content)
                    .with_source(self.source_of(node))
            }
            NodeValue::MultilineBlockQuote(_) => {
                let content = self.children(node, depth)?;
                Node::new(NodeKind::Blockquote { multiline: true }, content)
                    .with_source(self.source_of(node))
            }
            NodeValue::List(list) => self.list(node, &list, depth)?,
            NodeValue::CodeBlock(code) => self.code_block(node, &code),
            NodeValue::HtmlBlock(html) => return Ok(self.html_block(node, &html.literal)),
            NodeValue::ThematicBreak => {
                Node::leaf(NodeKind::HorizontalRule).with_source(self.source_of(node))
            }
            NodeValue::Table(table) => self.table(node, &table.alignments, depth)?,
            NodeValue::FootnoteDefinition(definition) => {
                let slice = self.slice_of(node);
                let label = slice
                    .and_then(footnote_definition_label)
                    .map(str::to_string)
                    .unwrap_or_else(|| definition.name.clone());
                let content = self.children(node, depth)?;
                Node::new(
                    NodeKind::FootnoteDefinition {
                        identifier: normalize_label(&label),
                        label,
                    },
                    content,
                )
                .with_source(self.source_of(node))
            }
            NodeValue::Item(_) | NodeValue::TaskItem(..) => {
                let content = self.children(node, depth)?;
                Node::list_item(content).with_source(self.source_of(node))
            }
            other => {
                tracing::debug!(node = ?other, "no node kind for block, keeping its children");
                return self.children(node, depth);
            }
        };
        Ok(vec![converted])
    }

    fn paragraph<'a>(&mut self, node: &'a AstNode<'a>, depth: usize) -> Result<Node, ParseError> {
        let mut range = self.block_range(node);
        let slice = range.clone().and_then(|r| self.source.slice(r));
        if slice.is_some_and(|s| TOC_MARKERS.contains(&s.trim())) {
            let source = range.map_or(SourceMap::Synthesized, |r| self.recover(r));
            return Ok(Node::leaf(NodeKind::TableOfContents).with_source(source));
        }

        let in_task_item = node
            .parent()
            .is_some_and(|parent| matches!(parent.data.borrow().value, NodeValue::TaskItem(..)));
        if in_task_item {
            if let (Some(r), Some(s)) = (range.as_mut(), slice) {
                r.start += task_marker_len(s);
            }
        }

        let content = self.inlines(node, depth)?;
        let source = range.map_or(SourceMap::Synthesized, |r| self.recover(r));
        Ok(Node::paragraph(content).with_source(source))
    }

    fn list<'a>(
        &mut self,
        node: &'a AstNode<'a>,
        list: &NodeList,
        depth: usize,
    ) -> Result<Node, ParseError> {
        let items: Vec<_> = node.children().collect();
        let is_task_list = items
            .iter()
            .any(|item| matches!(item.data.borrow().value, NodeValue::TaskItem(..)));

        let mut content = Vec::with_capacity(items.len());
        for item in items {
            let item_depth = self.enter(depth)?;
            let blocks = self.children(item, item_depth)?;
            let kind = if is_task_list {
                let is_task = matches!(item.data.borrow().value, NodeValue::TaskItem(..));
                NodeKind::TaskItem {
                    checked: is_task && self.slice_of(item).is_some_and(task_checked),
                }
            } else {
                NodeKind::ListItem
            };
            content.push(Node::new(kind, blocks).with_source(self.source_of(item)));
        }

        let ordered = list.list_type == ListType::Ordered;
        let parens = list.delimiter == ListDelimType::Paren;
        let start = list.start as u64;
        let bullet = match list.bullet_char {
            b'-' | b'+' | b'*' => list.bullet_char as char,
            _ => '*',
        };
        let kind = if is_task_list {
            NodeKind::TaskList {
                numeric: ordered,
                start,
                parens,
                bullet,
            }
        } else if ordered {
            NodeKind::OrderedList { start, parens }
        } else {
            NodeKind::BulletList { bullet }
        };
        Ok(Node::new(kind, content).with_source(self.source_of(node)))
    }

    fn code_block<'a>(&mut self, node: &'a AstNode<'a>, code: &NodeCodeBlock) -> Node {
        let word = code.info.split_whitespace().next().unwrap_or("");
        let (language, params) = match word.split_once(':') {
            Some((language, params)) => (language, Some(params)),
            None => (word, None),
        };
        let body = code.literal.strip_suffix('\n').unwrap_or(&code.literal);
        let content = if body.is_empty() {
            Vec::new()
        } else {
            vec![Node::text(body)]
        };

        let kind = if code.fenced && DIAGRAM_LANGUAGES.contains(&language) {
            NodeKind::Diagram {
                language: language.to_string(),
            }
        } else {
            NodeKind::CodeBlock {
                language: Some(language.to_string()).filter(|l| !l.is_empty()),
                lang_params: params.map(str::to_string).filter(|p| !p.is_empty()),
                fence: code.fenced.then(|| CodeFence {
                    marker: code.fence_char as char,
                    length: code.fence_length,
                }),
            }
        };
        Node::new(kind, content).with_source(self.source_of(node))
    }

    fn html_block<'a>(&mut self, node: &'a AstNode<'a>, literal: &str) -> Vec<Node> {
        let offset = self.literal_offset(node, literal);
        self.sanitize_fragment(literal.trim_end(), FragmentContext::block(offset))
    }

    /// Byte offset of an HTML block's literal in the input. The literal
    /// keeps the indentation its position leaves out.
    fn literal_offset<'a>(&self, node: &'a AstNode<'a>, literal: &str) -> usize {
        let Some(range) = self.range_of(node) else {
            return 0;
        };
        let first_line = literal.split('\n').next().unwrap_or_default();
        let text = self.source.text();
        let line_start = self.source.line_start(range.start);
        let at = |offset: usize| {
            text.get(offset..)
                .is_some_and(|rest| rest.starts_with(first_line))
        };
        if !at(range.start) && at(line_start) {
            line_start
        } else {
            range.start
        }
    }

    /// Sanitize raw HTML found at `context.offset`. Ranges that do not
    /// locate their markdown in the input are dropped, and a fragment that
    /// lost a rejected URL gives up its sources.
    fn sanitize_fragment(&mut self, html: &str, context: FragmentContext) -> Vec<Node> {
        let offset = context.offset;
        let fragment = sanitizer::sanitize(html, context, &mut self.keys);
        if fragment.dropped {
            tracing::debug!(html, "dropped disallowed HTML");
        }
        let mut nodes = fragment.nodes;
        for node in &mut nodes {
            verify_ranges(node, self.source.text());
        }
        if fragment.rejected_url {
            self.neutralized.push(offset..offset + html.len());
            nodes.iter_mut().for_each(clear_sources);
        }
        nodes
    }

    fn table<'a>(
        &mut self,
        node: &'a AstNode<'a>,
        alignments: &[TableAlignment],
        depth: usize,
    ) -> Result<Node, ParseError> {
        let mut rows = Vec::new();
        for row in node.children() {
            let row_depth = self.enter(depth)?;
            let header = matches!(row.data.borrow().value, NodeValue::TableRow(true));
            let mut cells = Vec::new();
            for (column, cell) in row.children().enumerate() {
                let cell_depth = self.enter(row_depth)?;
                let attrs = CellAttrs {
                    align: match alignments.get(column) {
                        Some(TableAlignment::Left) => Some(Alignment::Left),
                        Some(TableAlignment::Center) => Some(Alignment::Center),
                        Some(TableAlignment::Right) => Some(Alignment::Right),
                        _ => None,
                    },
                    ..CellAttrs::default()
                };
                let content = self.inlines(cell, cell_depth)?;
                let paragraph = Node::paragraph(content).with_source(self.trimmed_source_of(cell));
                let kind = if header {
                    NodeKind::TableHeader(attrs)
                } else {
                    NodeKind::TableCell(attrs)
                };
                let source = self.trimmed_source_of(cell);
                cells.push(Node::new(kind, vec![paragraph]).with_source(source));
            }
            rows.push(Node::new(NodeKind::TableRow, cells).with_source(self.source_of(row)));
        }
        Ok(Node::new(NodeKind::Table, rows).with_source(self.source_of(node)))
    }

    fn frontmatter(&mut self, block: FrontmatterBlock) -> Node {
        let content = if block.body.is_empty() {
            Vec::new()
        } else {
            vec![Node::text(block.body)]
        };
        Node::new(
            NodeKind::Frontmatter {
                language: block.language,
            },
            content,
        )
        .with_source(self.recover(block.range))
    }

    fn uncovered_definitions(&self, content: &[Node]) -> Vec<Definition> {
        let text = self.source.text();
        let mut covered: Vec<Range<usize>> = content
            .iter()
            .filter_map(|node| node.source.range())
            .filter(|range| text.is_char_boundary(range.start) && text.is_char_boundary(range.end))
            .collect();
        covered.sort_by_key(|range| range.start);

        let mut gaps = Vec::new();
        let mut pos = 0;
        for range in covered {
            if range.start > pos {
                gaps.push(pos..range.start);
            }
            pos = pos.max(range.end);
        }
        if pos < self.source.len() {
            gaps.push(pos..self.source.len());
        }
        gaps.into_iter()
            .flat_map(|gap| definitions::scan_gap(&self.source, gap))
            .collect()
    }

    /// Build the node of a definition found between blocks. A reference
    /// definition whose URL is rejected is dropped.
    fn definition(
        &mut self,
        definition: Definition,
        depth: usize,
    ) -> Result<Option<Node>, ParseError> {
        match definition {
            Definition::Reference {
                label,
                url,
                title,
                range,
            } => {
                let Some(url) = sanitizer::sanitize_url(&url) else {
                    tracing::debug!(%label, "dropped reference definition with a rejected URL");
                    self.neutralized.push(range);
                    return Ok(None);
                };
                let line = self.source.slice(range.clone()).unwrap_or_default();
                let node = Node::new(
                    NodeKind::ReferenceDefinition {
                        identifier: label,
                        url,
                        title,
                    },
                    vec![Node::text(line)],
                )
                .with_source(self.recover(range));
                Ok(Some(node))
            }
            Definition::Footnote { label, body, range } => {
                let text = self.source.slice(body.clone()).unwrap_or_default();
                let content = self.fragment(text, body.start, depth)?;
                let node = Node::new(
                    NodeKind::FootnoteDefinition {
                        identifier: normalize_label(&label),
                        label,
                    },
                    content,
                )
                .with_source(self.recover(range));
                Ok(Some(node))
            }
        }
    }

    /// Parse a piece of the input on its own, keeping keys unique and ranges
    /// relative to the whole input.
    fn fragment(
        &mut self,
        text: &str,
        offset: usize,
        depth: usize,
    ) -> Result<Vec<Node>, ParseError> {
        let arena = Arena::new();
        let root = parse_document(&arena, text, &comrak_options(&self.options));
        let keys = std::mem::take(&mut self.keys);
        let mut nested = TreeBuilder::new(text, self.options.clone(), keys);
        let children: Vec<_> = root.children().collect();
        let result = nested.block_list(&children, depth);
        self.keys = nested.keys;
        self.neutralized.extend(
            nested
                .neutralized
                .into_iter()
                .map(|range| range.start + offset..range.end + offset),
        );

        let mut nodes = result?;
        for node in &mut nodes {
            shift_ranges(node, offset);
        }
        Ok(nodes)
    }

    // Inlines

    fn inlines<'a>(
        &mut self,
        node: &'a AstNode<'a>,
        depth: usize,
    ) -> Result<Vec<Node>, ParseError> {
        let children: Vec<_> = node.children().collect();
        let mut out = Vec::new();
        self.inline_run(&children, &[], &mut out, depth)?;
        let merged = merge_adjacent_text(out);
        Ok(match self.range_of(node) {
            Some(block) => self.inline_diffs(merged, block),
            None => merged,
        })
    }

    /// Split `{+added+}` and `{-removed-}` runs out of plain text. A run
    /// becomes a mark only where the block's source spells it unescaped.
    fn inline_diffs(&mut self, nodes: Vec<Node>, block: Range<usize>) -> Vec<Node> {
        let mut cursor = block.start;
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            let text = node
                .as_text()
                .filter(|text| !node.has_mark(&MarkKind::Code) && INLINE_DIFF.is_match(text))
                .map(str::to_string);
            let Some(text) = text else {
                out.push(node);
                continue;
            };
            let mut last = 0;
            for caps in INLINE_DIFF.captures_iter(&text) {
                let inner = caps.iter().skip(1).flatten().next();
                let (Some(whole), Some(inner)) = (caps.get(0), inner) else {
                    continue;
                };
                let Some(range) = self.unescaped_literal(whole.as_str(), cursor..block.end) else {
                    continue;
                };
                let diff = if whole.as_str().as_bytes()[1] == b'+' {
                    DiffKind::Addition
                } else {
                    DiffKind::Deletion
                };
                if whole.start() > last {
                    let before = &text[last..whole.start()];
                    out.push(Node::text(before).with_marks(node.marks.clone()));
                }
                let source = self.recover(range.clone());
                let mut stack = node.marks.clone();
                stack.push(Mark::new(MarkKind::InlineDiff(diff)).with_source(source));
                out.push(Node::text(inner.as_str()).with_marks(stack));
                cursor = range.end;
                last = whole.end();
            }
            if last < text.len() {
                out.push(Node::text(&text[last..]).with_marks(node.marks.clone()));
            }
        }
        merge_adjacent_text(out)
    }

    /// First occurrence of `literal` in `within` not preceded by a backslash
    fn unescaped_literal(&self, literal: &str, within: Range<usize>) -> Option<Range<usize>> {
        let text = self.source.text();
        let haystack = text.get(within.clone())?;
        let mut from = 0;
        while let Some(found) = haystack[from..].find(literal) {
            let at = within.start + from + found;
            if !is_escaped(text.as_bytes(), at) {
                return Some(at..at + literal.len());
            }
            // Diff delimiters open with an ASCII byte
            from += found + 1;
        }
        None
    }

    /// Convert sibling inlines under `marks`, pairing raw HTML open and
    /// close tags found among them.
    fn inline_run<'a>(
        &mut self,
        children: &[&'a AstNode<'a>],
        marks: &[Mark],
        out: &mut Vec<Node>,
        depth: usize,
    ) -> Result<(), ParseError> {
        let pairs = pair_html_tags(children);
        let mut i = 0;
        while i < children.len() {
            let child = children[i];
            let Some(raw) = html_inline(child) else {
                self.inline(child, marks, out, depth)?;
                i += 1;
                continue;
            };

            let tag = scan::parse_tag(&raw).filter(|tag| !tag.closing);
            let rule = tag.as_ref().and_then(|tag| sanitizer::lookup(&tag.name));
            match (tag, pairs.get(&i).copied()) {
                (Some(tag), Some(close)) => {
                    let inner = &children[i + 1..close];
                    match rule {
                        Some(rule) if rule.target.is_mark() => {
                            let span = self
                                .range_of(child)
                                .zip(self.range_of(children[close]))
                                .map(|(open, close)| open.start..close.end);
                            let attrs = sanitizer::sanitize_attributes(rule, &tag.attrs);
                            let source = match span {
                                Some(span) if attrs.rejected_url() => {
                                    self.neutralized.push(span);
                                    SourceMap::Synthesized
                                }
                                Some(span) => self.recover_tagged(span, rule.tag),
                                None => SourceMap::Synthesized,
                            };
                            let mut stack = marks.to_vec();
                            stack.push(Mark {
                                kind: mark_kind(rule.target, &attrs),
                                source,
                            });
                            let depth = self.enter(depth)?;
                            self.inline_run(inner, &stack, out, depth)?;
                        }
                        Some(_) => self.inline_run(inner, marks, out, depth)?,
                        None => {
                            tracing::debug!(tag = %tag.name, "dropped disallowed inline element");
                        }
                    }
                    i = close + 1;
                }
                (Some(tag), None)
                    if rule.is_some_and(|rule| rule.target.is_mark()) && !tag.is_void() =>
                {
                    // Unclosed: the mark runs to the end of the paragraph
                    let rule = rule.map(|rule| {
                        (rule.target, sanitizer::sanitize_attributes(rule, &tag.attrs))
                    });
                    let mut stack = marks.to_vec();
                    if let Some((target, attrs)) = rule {
                        if attrs.rejected_url() {
                            let range = self.range_of(child);
                            self.neutralized.extend(range);
                        }
                        stack.push(Mark::new(mark_kind(target, &attrs)));
                    }
                    let depth = self.enter(depth)?;
                    self.inline_run(&children[i + 1..], &stack, out, depth)?;
                    i = children.len();
                }
                _ => {
                    let offset = self.range_of(child).map_or(0, |range| range.start);
                    for mut node in self.sanitize_fragment(&raw, FragmentContext::inline(offset)) {
                        let mut stack = marks.to_vec();
                        stack.append(&mut node.marks);
                        node.marks = stack;
                        out.push(node);
                    }
                    i += 1;
                }
            }
        }
        Ok(())
    }

    fn inline<'a>(
        &mut self,
        node: &'a AstNode<'a>,
        marks: &[Mark],
        out: &mut Vec<Node>,
        depth: usize,
    ) -> Result<(), ParseError> {
        let value = node.data.borrow().value.clone();
        match value {
            NodeValue::Text(text) => out.push(Node::text(text).with_marks(marks.to_vec())),
            NodeValue::SoftBreak => out.push(Node::text("\n").with_marks(marks.to_vec())),
            NodeValue::LineBreak => {
                let source = self.hard_break_source(node);
                out.push(Node::hard_break().with_marks(marks.to_vec()).with_source(source));
            }
            NodeValue::Code(code) => {
                let source = self.code_span_source(node, &code);
                let mut stack = marks.to_vec();
                stack.push(Mark::code().with_source(source));
                out.push(Node::text(code.literal).with_marks(stack));
            }
            NodeValue::Emph => {
                let valid: fn(&str) -> bool = |s| delimited(s, "*") || delimited(s, "_");
                self.marked(node, MarkKind::Italic, valid, marks, out, depth)?;
            }
            NodeValue::Strong => {
                let valid: fn(&str) -> bool = |s| delimited(s, "**") || delimited(s, "__");
                self.marked(node, MarkKind::Bold, valid, marks, out, depth)?;
            }
            NodeValue::Strikethrough => {
                let valid: fn(&str) -> bool = |s| delimited(s, "~");
                self.marked(node, MarkKind::Strike, valid, marks, out, depth)?;
            }
            NodeValue::Link(link) => self.link(node, &link, marks, out, depth)?,
            NodeValue::Image(link) => out.push(self.image(node, &link, marks)),
            NodeValue::FootnoteReference(reference) => {
                let slice = self.slice_of(node);
                let found = slice.and_then(|s| s.strip_prefix("[^")?.strip_suffix(']'));
                let (label, source) = match (found, self.range_of(node)) {
                    (Some(label), Some(range)) => (label.to_string(), self.recover(range)),
                    _ => (reference.name.clone(), SourceMap::Synthesized),
                };
                out.push(
                    Node::leaf(NodeKind::FootnoteReference {
                        identifier: normalize_label(&label),
                        label,
                    })
                    .with_marks(marks.to_vec())
                    .with_source(source),
                );
            }
            _ => {
                let children: Vec<_> = node.children().collect();
                self.inline_run(&children, marks, out, depth)?;
            }
        }
        Ok(())
    }

    fn marked<'a>(
        &mut self,
        node: &'a AstNode<'a>,
        kind: MarkKind,
        valid: fn(&str) -> bool,
        marks: &[Mark],
        out: &mut Vec<Node>,
        depth: usize,
    ) -> Result<(), ParseError> {
        let depth = self.enter(depth)?;
        let source = self.checked_source(node, valid);
        let mut stack = marks.to_vec();
        stack.push(Mark { kind, source });
        let children: Vec<_> = node.children().collect();
        self.inline_run(&children, &stack, out, depth)
    }

    fn link<'a>(
        &mut self,
        node: &'a AstNode<'a>,
        link: &NodeLink,
        marks: &[Mark],
        out: &mut Vec<Node>,
        depth: usize,
    ) -> Result<(), ParseError> {
        let depth = self.enter(depth)?;
        let mut range = self.range_of(node);
        let slice = range.clone().and_then(|r| self.source.slice(r)).unwrap_or("");
        let text = plain_text(node);

        let mut attrs = LinkAttrs {
            href: sanitizer::sanitize_url(&link.url),
            canonical_src: Some(link.url.clone()),
            title: Some(link.title.clone()).filter(|t| !t.is_empty()),
            is_reference: false,
        };
        let syntax = match &range {
            Some(r) => LinkSyntax::classify(self.source.text(), r.clone(), &text),
            None => LinkSyntax::Unknown,
        };
        let recovered = match syntax {
            LinkSyntax::Bracketed => {
                if let Some(label) = reference_label(slice) {
                    attrs.canonical_src = Some(label);
                    attrs.is_reference = true;
                }
                true
            }
            LinkSyntax::Angle(angle) => {
                range = Some(angle);
                true
            }
            LinkSyntax::Bare => {
                attrs.canonical_src = Some(text.clone());
                let accepted = range
                    .as_ref()
                    .is_some_and(|r| bare_autolink_boundary(self.source.text(), r.start));
                if !accepted {
                    tracing::debug!(url = %link.url, "autolink has no literal source");
                }
                accepted
            }
            LinkSyntax::Unknown => false,
        };
        if attrs.href.is_none() {
            attrs.canonical_src = None;
            self.neutralized.extend(range.clone());
        }
        let source = match range {
            Some(range) if recovered && attrs.href.is_some() => self.recover(range),
            _ => SourceMap::Synthesized,
        };

        let mut stack = marks.to_vec();
        stack.push(Mark {
            kind: MarkKind::Link(attrs),
            source,
        });
        let children: Vec<_> = node.children().collect();
        self.inline_run(&children, &stack, out, depth)
    }

    fn image<'a>(&mut self, node: &'a AstNode<'a>, link: &NodeLink, marks: &[Mark]) -> Node {
        let range = self.range_of(node);
        let slice = range
            .clone()
            .and_then(|r| self.source.slice(r))
            .filter(|s| s.starts_with("!["));
        let reference = slice.and_then(reference_label);

        let alt = plain_text(node);
        let src = sanitizer::sanitize_url(&link.url);
        if src.is_none() {
            self.neutralized.extend(range.clone());
        }
        let canonical_src = src
            .as_ref()
            .map(|_| reference.clone().unwrap_or_else(|| link.url.clone()));
        let attrs = MediaAttrs {
            canonical_src,
            src,
            alt: Some(alt).filter(|a| !a.is_empty()),
            title: Some(link.title.clone()).filter(|t| !t.is_empty()),
            is_reference: reference.is_some(),
            width: None,
            height: None,
        };
        let rejected = attrs.src.is_none();
        let kind = match media_extension(&link.url).as_deref() {
            Some(ext) if AUDIO_EXTENSIONS.contains(&ext) => NodeKind::Audio(attrs),
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => NodeKind::Video(attrs),
            _ => NodeKind::Image(attrs),
        };
        let source = match (slice, range) {
            (Some(_), Some(range)) if !rejected => self.recover(range),
            _ => SourceMap::Synthesized,
        };
        Node::leaf(kind).with_marks(marks.to_vec()).with_source(source)
    }

    /// A code span is located from where it starts: comrak's end position
    /// for it is not reliable.
    fn code_span_source<'a>(&mut self, node: &'a AstNode<'a>, code: &NodeCode) -> SourceMap {
        let pos = node.data.borrow().sourcepos;
        if pos.start.line == 0 {
            return SourceMap::Synthesized;
        }
        let start = self.source.offset(pos.start.line, pos.start.column.saturating_sub(1));
        match code_span_at(self.source.text(), start, code.num_backticks, &code.literal) {
            Some(range) => self.recover(range),
            None => {
                tracing::debug!(code = %code.literal, "code span not found in the source");
                SourceMap::Synthesized
            }
        }
    }

    /// A hard break is the backslash or the trailing spaces before the end
    /// of its line, plus the newline.
    fn hard_break_source<'a>(&mut self, node: &'a AstNode<'a>) -> SourceMap {
        let pos = node.data.borrow().sourcepos;
        let start = self.source.offset(pos.start.line, pos.start.column.saturating_sub(1));
        let text = self.source.text();
        let line_end = start + self.source.line_from(start).len();
        if line_end >= text.len() {
            return SourceMap::Synthesized;
        }
        let before = &text.as_bytes()[..line_end];
        let break_start = if before.last() == Some(&b'\\') {
            line_end - 1
        } else {
            let spaces = before.iter().rev().take_while(|b| **b == b' ').count();
            if spaces < 2 {
                return SourceMap::Synthesized;
            }
            line_end - spaces
        };
        self.recover(break_start..line_end + 1)
    }
}

/// How a link was written
#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkSyntax {
    /// `[text](url)`, `[text][id]`, `[text][]` or `[text]`
    Bracketed,
    /// `<url>`, with the range of the brackets and everything between
    Angle(Range<usize>),
    /// A bare URL found by the autolink extension
    Bare,
    Unknown,
}

impl LinkSyntax {
    /// Classify the link comrak placed at `range` of `source`
    fn classify(source: &str, range: Range<usize>, text: &str) -> Self {
        let slice = source.get(range.clone()).unwrap_or("");
        if slice.starts_with('[') && (slice.ends_with(')') || slice.ends_with(']')) {
            return LinkSyntax::Bracketed;
        }
        if let Some(angle) = angle_autolink(source, range.start, text) {
            return LinkSyntax::Angle(angle);
        }
        if !slice.is_empty() && slice == text {
            LinkSyntax::Bare
        } else {
            LinkSyntax::Unknown
        }
    }
}

/// The `<…>` autolink holding `text` that starts at `start`, or just
/// before it when the reported position skips the bracket
fn angle_autolink(source: &str, start: usize, text: &str) -> Option<Range<usize>> {
    let open = if source.get(start..)?.starts_with('<') {
        start
    } else {
        start.checked_sub(1).filter(|&before| source.get(before..start) == Some("<"))?
    };
    let inner = open + 1;
    let close = inner + source.get(inner..)?.find('>')?;
    let target = &source[inner..close];
    (!target.is_empty() && target == text).then(|| open..close + 1)
}

/// Range of the code span holding `literal` whose opening run of `ticks`
/// backticks is the first one at `from` or after it.
fn code_span_at(text: &str, from: usize, ticks: usize, literal: &str) -> Option<Range<usize>> {
    let bytes = text.as_bytes();
    let run = |at: usize| bytes[at..].iter().take_while(|b| **b == b'`').count();
    let mut open = from.min(bytes.len());
    while open > 0 && bytes[open - 1] == b'`' {
        open -= 1;
    }
    open += text.get(open..)?.find('`')?;
    if run(open) != ticks {
        return None;
    }
    let inner = open + ticks;
    let mut close = inner;
    loop {
        close += text.get(close..)?.find('`')?;
        let length = run(close);
        if length == ticks {
            break;
        }
        close += length;
    }
    (code_span_content(&text[inner..close]) == literal).then(|| open..close + ticks)
}

/// The text of a code span as written between its backtick runs
fn code_span_content(raw: &str) -> String {
    let content = raw.replace("\r\n", " ").replace('\n', " ");
    let padded = content.len() >= 2
        && content.starts_with(' ')
        && content.ends_with(' ')
        && !content.bytes().all(|b| b == b' ');
    if padded {
        content[1..content.len() - 1].to_string()
    } else {
        content
    }
}

/// Whether a literal autolink may start at `start`: at the start of text,
/// after whitespace or after one of `( * _ ~`.
fn bare_autolink_boundary(text: &str, start: usize) -> bool {
    match text.get(..start).and_then(|before| before.chars().last()) {
        None => true,
        Some(c) => c.is_whitespace() || matches!(c, '(' | '*' | '_' | '~'),
    }
}

/// Identifier of a reference link or image written as `[t][id]`, `[t][]`
/// or `[t]`. Inline links have none.
fn reference_label(slice: &str) -> Option<String> {
    let body = slice.strip_prefix('!').unwrap_or(slice);
    if !body.starts_with('[') || !body.ends_with(']') {
        return None;
    }
    let open = matching_open_bracket(body)?;
    let last = &body[open + 1..body.len() - 1];
    if open == 0 {
        return Some(last.to_string());
    }
    if !body[..open].ends_with(']') {
        return None;
    }
    if last.is_empty() {
        return body.get(1..open - 1).map(str::to_string);
    }
    Some(last.to_string())
}

/// Index of the `[` matching the final `]` of `text`
fn matching_open_bracket(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    for i in (0..bytes.len()).rev() {
        if is_escaped(bytes, i) {
            continue;
        }
        match bytes[i] {
            b']' => depth += 1,
            b'[' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn delimited(source: &str, delimiter: &str) -> bool {
    source.starts_with(delimiter) && source.ends_with(delimiter)
}

static INLINE_DIFF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\+(.+?)\+\}|\{-(.+?)-\}|\[\+(.+?)\+\]|\[-(.+?)-\]")
        .expect("Invalid inline diff regex")
});

fn is_escaped(bytes: &[u8], i: usize) -> bool {
    bytes[..i].iter().rev().take_while(|b| **b == b'\\').count() % 2 == 1
}

fn footnote_definition_label(slice: &str) -> Option<&str> {
    let rest = slice.trim_start().strip_prefix("[^")?;
    let end = rest.find("]:")?;
    Some(&rest[..end])
}

/// Bytes at the end of `indent` that fill the four columns of an indented
/// code block
fn code_indent_len(indent: &str) -> usize {
    let mut columns = 0;
    let mut len = 0;
    for b in indent.bytes().rev() {
        if columns >= 4 {
            break;
        }
        columns += if b == b'\t' { 4 } else { 1 };
        len += 1;
    }
    len
}

/// Length of a leading `[ ] ` task marker
fn task_marker_len(slice: &str) -> usize {
    let bytes = slice.as_bytes();
    if bytes.len() >= 3 && bytes[0] == b'[' && bytes[2] == b']' {
        let spaces = bytes[3..]
            .iter()
            .take_while(|b| **b == b' ' || **b == b'\t')
            .count();
        if spaces > 0 || bytes.len() == 3 {
            return 3 + spaces;
        }
    }
    0
}

/// Whether a task item's source has a checked box
fn task_checked(item: &str) -> bool {
    let Some(open) = item.find('[') else {
        return false;
    };
    let mut chars = item[open + 1..].chars();
    matches!((chars.next(), chars.next()), (Some(mark), Some(']')) if mark != ' ' && mark != '\t')
}

/// An HTML block that starts with an open tag it leaves unclosed
struct OpeningBlock {
    tag: scan::Tag,
    /// The whole block
    literal: String,
    /// What follows the tag in the block
    rest: String,
}

fn opening_block<'a>(node: &'a AstNode<'a>) -> Option<OpeningBlock> {
    let data = node.data.borrow();
    let NodeValue::HtmlBlock(html) = &data.value else {
        return None;
    };
    let tag = scan::leading_tag(&html.literal)?;
    if tag.closing || tag.is_void() || !scan::leaves_open(&html.literal, &tag.name) {
        return None;
    }
    Some(OpeningBlock {
        rest: html.literal[tag.range.end..].to_string(),
        literal: html.literal.clone(),
        tag,
    })
}

fn lone_tag<'a>(node: &'a AstNode<'a>) -> Option<scan::Tag> {
    let data = node.data.borrow();
    match &data.value {
        NodeValue::HtmlBlock(html) => scan::parse_tag(&html.literal),
        _ => None,
    }
}

/// The sibling block closing the element opened at `open`: a block holding
/// only its end tag.
fn find_closing_block<'a>(children: &[&'a AstNode<'a>], open: usize, name: &str) -> Option<usize> {
    let mut nested = 0usize;
    for (i, child) in children.iter().enumerate().skip(open + 1) {
        if opening_block(child).is_some_and(|opening| opening.tag.name == name) {
            nested += 1;
            continue;
        }
        let Some(tag) = lone_tag(child) else { continue };
        if tag.name != name || !tag.closing {
            continue;
        }
        if nested == 0 {
            return Some(i);
        }
        nested -= 1;
    }
    None
}

fn html_inline<'a>(node: &'a AstNode<'a>) -> Option<String> {
    let data = node.data.borrow();
    match &data.value {
        NodeValue::HtmlInline(raw) => Some(raw.clone()),
        _ => None,
    }
}

/// Match open and close tags among sibling inlines, innermost first.
fn pair_html_tags<'a>(children: &[&'a AstNode<'a>]) -> HashMap<usize, usize> {
    let mut pairs = HashMap::new();
    let mut open: Vec<(String, usize)> = Vec::new();
    for (i, child) in children.iter().enumerate() {
        let Some(tag) = html_inline(child).and_then(|raw| scan::parse_tag(&raw)) else {
            continue;
        };
        if tag.is_void() {
            continue;
        }
        if tag.closing {
            if let Some(pos) = open.iter().rposition(|(name, _)| *name == tag.name) {
                pairs.insert(open[pos].1, i);
                open.truncate(pos);
            }
        } else {
            open.push((tag.name, i));
        }
    }
    pairs
}

fn plain_text<'a>(node: &'a AstNode<'a>) -> String {
    let mut out = String::new();
    for descendant in node.descendants().skip(1) {
        match &descendant.data.borrow().value {
            NodeValue::Text(text) => out.push_str(text),
            NodeValue::Code(code) => out.push_str(&code.literal),
            NodeValue::SoftBreak | NodeValue::LineBreak => out.push('\n'),
            _ => {}
        }
    }
    out
}

/// Lowercased file extension of a media path, resolved the way a browser
/// would resolve it against a page URL
fn media_extension(src: &str) -> Option<String> {
    let url = Url::parse("https://gitlab.invalid/")
        .and_then(|base| base.join(src))
        .ok()?;
    let file = url.path_segments()?.next_back()?;
    let (_, extension) = file.rsplit_once('.')?;
    Some(extension.to_ascii_lowercase())
}

/// Insert `node` before the first top-level node that starts after it.
fn insert_in_source_order(content: &mut Vec<Node>, node: Node) {
    let Some(start) = node.source.range().map(|range| range.start) else {
        content.push(node);
        return;
    };
    let position = content
        .iter()
        .position(|other| other.source.range().is_some_and(|range| range.start > start))
        .unwrap_or(content.len());
    content.insert(position, node);
}

fn clear_sources(node: &mut Node) {
    node.source = SourceMap::Synthesized;
    for mark in &mut node.marks {
        mark.source = SourceMap::Synthesized;
    }
    for child in &mut node.content {
        clear_sources(child);
    }
}

/// Record how many newlines separate each node from its previous sibling
/// when only whitespace and blockquote markers lie between them.
fn record_gaps(nodes: &mut [Node], text: &str) {
    for i in 0..nodes.len() {
        if i > 0 {
            let gap = match (nodes[i - 1].source.range(), nodes[i].source.range()) {
                (Some(prev), Some(next)) if prev.end <= next.start => text
                    .get(prev.end..next.start)
                    .filter(|gap| gap.chars().all(|c| c.is_whitespace() || c == '>'))
                    .map(|gap| gap.matches('\n').count()),
                _ => None,
            };
            if let SourceMap::Recovered(span) = &mut nodes[i].source {
                span.newlines_before = gap;
            }
        }
        record_gaps(&mut nodes[i].content, text);
    }
}

/// Forget byte ranges that do not hold the recorded markdown in `text`.
fn verify_ranges(node: &mut Node, text: &str) {
    verify_range(&mut node.source, text);
    for mark in &mut node.marks {
        verify_range(&mut mark.source, text);
    }
    for child in &mut node.content {
        verify_ranges(child, text);
    }
}

fn verify_range(source: &mut SourceMap, text: &str) {
    if let SourceMap::Recovered(span) = source {
        let located = span
            .range
            .as_ref()
            .is_some_and(|range| text.get(range.clone()) == Some(span.markdown.as_str()));
        if !located {
            span.range = None;
        }
    }
}

/// Drop the sources of nodes and marks whose text overlaps a neutralized
/// range, so a rejected value is never written back.
fn clear_neutralized(nodes: &mut [Node], neutralized: &[Range<usize>]) {
    let tainted = |source: &SourceMap| {
        source.range().is_some_and(|range| {
            neutralized
                .iter()
                .any(|bad| bad.start < range.end && range.start < bad.end)
        })
    };
    for node in nodes {
        if tainted(&node.source) {
            node.source = SourceMap::Synthesized;
        }
        for mark in &mut node.marks {
            if tainted(&mark.source) {
                mark.source = SourceMap::Synthesized;
            }
        }
        clear_neutralized(&mut node.content, neutralized);
    }
}

fn shift_ranges(node: &mut Node, offset: usize) {
    shift_source(&mut node.source, offset);
    for mark in &mut node.marks {
        shift_source(&mut mark.source, offset);
    }
    for child in &mut node.content {
        shift_ranges(child, offset);
    }
}

fn shift_source(source: &mut SourceMap, offset: usize) {
    if let SourceMap::Recovered(span) = source {
        if let Some(range) = &mut span.range {
            *range = range.start + offset..range.end + offset;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(markdown: &str) -> Document {
        deserialize(markdown).unwrap()
    }

    fn first(markdown: &str) -> Node {
        parse(markdown).content.remove(0)
    }

    #[test]
    fn headings_keep_their_source() {
        let heading = first("## Heading *two*\n");
        assert_eq!(heading.kind, NodeKind::Heading { level: 2, setext: false });
        assert_eq!(heading.source.markdown(), Some("## Heading *two*"));
        assert_eq!(heading.content[1].marks[0].source.markdown(), Some("*two*"));

        let setext = first("Title\n=====\n");
        assert_eq!(setext.kind, NodeKind::Heading { level: 1, setext: true });
        assert_eq!(setext.source.markdown(), Some("Title\n====="));
    }

    #[test]
    fn bold_wraps_code() {
        let paragraph = first("**`inline code bold`**");
        assert_eq!(paragraph.content.len(), 1);
        let text = &paragraph.content[0];
        assert_eq!(text.as_text(), Some("inline code bold"));
        let kinds: Vec<_> = text.marks.iter().map(|m| m.kind.type_name()).collect();
        assert_eq!(kinds, vec!["bold", "code"]);
        assert_eq!(text.marks[0].source.markdown(), Some("**`inline code bold`**"));
        assert_eq!(text.marks[1].source.markdown(), Some("`inline code bold`"));
    }

    #[test]
    fn reference_links_point_at_their_definition() {
        let doc = parse("[GitLab][gitlab-url]\n\n[gitlab-url]: https://gitlab.com \"GitLab\"\n");
        assert_eq!(doc.content.len(), 2);
        let link = &doc.content[0].content[0];
        assert_eq!(
            link.marks[0].kind,
            MarkKind::Link(LinkAttrs {
                href: Some("https://gitlab.com".into()),
                canonical_src: Some("gitlab-url".into()),
                title: Some("GitLab".into()),
                is_reference: true,
            })
        );
        assert_eq!(link.marks[0].source.markdown(), Some("[GitLab][gitlab-url]"));

        let definition = &doc.content[1];
        assert_eq!(
            definition.kind,
            NodeKind::ReferenceDefinition {
                identifier: "gitlab-url".into(),
                url: "https://gitlab.com".into(),
                title: Some("GitLab".into()),
            }
        );
        assert_eq!(
            definition.source.markdown(),
            Some("[gitlab-url]: https://gitlab.com \"GitLab\"")
        );
    }

    #[test]
    fn reference_labels_come_from_the_source() {
        assert_eq!(reference_label("[t][id]").as_deref(), Some("id"));
        assert_eq!(reference_label("[t][]").as_deref(), Some("t"));
        assert_eq!(reference_label("[t]").as_deref(), Some("t"));
        assert_eq!(reference_label("![alt][img]").as_deref(), Some("img"));
        assert_eq!(reference_label("[t](url)"), None);
        assert_eq!(reference_label("[a \\] b][c]").as_deref(), Some("c"));
    }

    #[test]
    fn inline_links_keep_the_written_destination() {
        let paragraph = first("[docs](https://docs.gitlab.com \"Docs\")");
        let MarkKind::Link(attrs) = &paragraph.content[0].marks[0].kind else {
            panic!("expected a link");
        };
        assert_eq!(attrs.href.as_deref(), Some("https://docs.gitlab.com"));
        assert_eq!(attrs.canonical_src.as_deref(), Some("https://docs.gitlab.com"));
        assert!(!attrs.is_reference);
    }

    #[test]
    fn dangerous_link_targets_are_nulled() {
        let paragraph = first("[click](javascript:alert(1))");
        let mark = &paragraph.content[0].marks[0];
        let MarkKind::Link(attrs) = &mark.kind else {
            panic!("expected a link");
        };
        assert_eq!(attrs.href, None);
        assert_eq!(attrs.canonical_src, None);
        assert!(!mark.source.is_recovered());
        assert!(!paragraph.source.is_recovered());

        let image = first("text ![i](javascript:alert(1))");
        let NodeKind::Image(attrs) = &image.content[1].kind else {
            panic!("expected an image");
        };
        assert_eq!(attrs.src, None);
        assert_eq!(attrs.canonical_src, None);
    }

    #[test]
    fn code_spans_keep_their_source() {
        let paragraph = first("a `x` b ``y ` z`` c");
        let sources: Vec<_> = paragraph
            .content
            .iter()
            .filter(|node| !node.marks.is_empty())
            .map(|node| node.marks[0].source.markdown())
            .collect();
        assert_eq!(sources, vec![Some("`x`"), Some("``y ` z``")]);
    }

    #[test]
    fn inline_diffs_become_marks() {
        let paragraph = first("a {+added+} b [-gone-] c\n");
        let marked: Vec<_> = paragraph
            .content
            .iter()
            .filter(|node| !node.marks.is_empty())
            .map(|node| {
                let mark = &node.marks[0];
                (node.as_text(), mark.kind.clone(), mark.source.markdown())
            })
            .collect();
        assert_eq!(
            marked,
            vec![
                (Some("added"), MarkKind::InlineDiff(DiffKind::Addition), Some("{+added+}")),
                (Some("gone"), MarkKind::InlineDiff(DiffKind::Deletion), Some("[-gone-]")),
            ]
        );
    }

    #[test]
    fn escaped_and_coded_diffs_stay_text() {
        let paragraph = first("\\{+kept+} `{-code-}`\n");
        assert_eq!(paragraph.content[0].as_text(), Some("{+kept+} "));
        assert!(paragraph.content[0].marks.is_empty());
        assert_eq!(paragraph.content[1].marks.len(), 1);
        assert_eq!(paragraph.content[1].marks[0].kind, MarkKind::Code);
    }

    #[test]
    fn mark_tags_become_highlights() {
        let paragraph = first("some <mark>lit</mark> text\n");
        let lit = &paragraph.content[1];
        assert_eq!(lit.as_text(), Some("lit"));
        assert_eq!(lit.marks[0].kind, MarkKind::Highlight);
        assert_eq!(lit.marks[0].source.markdown(), Some("<mark>lit</mark>"));
    }

    #[test]
    fn code_span_ranges_follow_backtick_runs() {
        let text = "a ` b` `` c ``";
        assert_eq!(code_span_at(text, 2, 1, " b"), Some(2..6));
        assert_eq!(code_span_at(text, 7, 2, "c"), Some(7..14));
        assert_eq!(code_span_at(text, 8, 2, "c"), Some(7..14));
        assert_eq!(code_span_at(text, 2, 2, " b"), None);
        assert_eq!(code_span_at("`open", 0, 1, "open"), None);
    }

    #[test]
    fn angle_autolinks_keep_their_brackets() {
        let paragraph = first("see <https://gitlab.com> and <me@example.com>");
        let sources: Vec<_> = paragraph
            .content
            .iter()
            .filter(|node| !node.marks.is_empty())
            .map(|node| node.marks[0].source.markdown())
            .collect();
        assert_eq!(
            sources,
            vec![Some("<https://gitlab.com>"), Some("<me@example.com>")]
        );
        assert_eq!(angle_autolink("<x>", 1, "x"), Some(0..3));
        assert_eq!(angle_autolink("<x>", 0, "x"), Some(0..3));
        assert_eq!(angle_autolink("(x)", 1, "x"), None);
    }

    #[test]
    fn indented_code_keeps_its_indentation() {
        assert_eq!(first("    code\n").source.markdown(), Some("    code"));
        assert_eq!(parse("para\n\n\tcode").content[1].source.markdown(), Some("\tcode"));

        let list = first("- item\n\n      code\n");
        let code = &list.content[0].content[1];
        assert_eq!(code.type_name(), "codeBlock");
        assert_eq!(code.source.markdown(), Some("    code"));
    }

    #[test]
    fn top_level_indentation_is_kept() {
        let doc = parse("x\n\n (");
        assert_eq!(doc.content[1].source.markdown(), Some(" ("));
        assert_eq!(doc.content[1].text_content(), "(");
    }

    #[test]
    fn html_ranges_never_split_characters() {
        for input in [
            "\n  <!-->>>>~日本<b>---&#",
            "  <div>日本</div>\n\n[a]: /a",
            "> <p>日本</p>\n> <b>語</b>",
        ] {
            assert!(!parse(input).content.is_empty(), "{input:?}");
        }
    }

    #[test]
    fn autolink_boundaries() {
        assert!(bare_autolink_boundary("https://x", 0));
        assert!(bare_autolink_boundary("see https://x", 4));
        assert!(bare_autolink_boundary("(https://x)", 1));
        assert!(!bare_autolink_boundary("[https://x>", 1));
    }

    #[test]
    fn malformed_links_degrade_without_errors() {
        let paragraph = first("[https://gitlab.com>");
        assert_eq!(paragraph.text_content(), "[https://gitlab.com>");
        for node in &paragraph.content {
            for mark in &node.marks {
                assert!(!mark.source.is_recovered());
            }
        }
    }

    #[test]
    fn lists_keep_markers_and_tasks() {
        let list = first("- [ ] todo\n- [x] done\n");
        assert_eq!(
            list.kind,
            NodeKind::TaskList {
                numeric: false,
                start: 1,
                parens: false,
                bullet: '-'
            }
        );
        assert_eq!(list.content[0].kind, NodeKind::TaskItem { checked: false });
        assert_eq!(list.content[1].kind, NodeKind::TaskItem { checked: true });
        assert_eq!(list.content[0].content[0].text_content(), "todo");

        let ordered = first("3) three\n4) four\n");
        assert_eq!(ordered.kind, NodeKind::OrderedList { start: 3, parens: true });
    }

    #[test]
    fn code_fences_split_language_params() {
        let code = first("```javascript:foo\nlet a;\n```\n");
        assert_eq!(
            code.kind,
            NodeKind::CodeBlock {
                language: Some("javascript".into()),
                lang_params: Some("foo".into()),
                fence: Some(CodeFence { marker: '`', length: 3 }),
            }
        );
        assert_eq!(code.text_content(), "let a;");

        let diagram = first("~~~mermaid\ngraph TD\n~~~\n");
        assert_eq!(diagram.kind, NodeKind::Diagram { language: "mermaid".into() });
    }

    #[test]
    fn media_extensions_choose_the_node() {
        assert_eq!(first("![a](song.mp3)").content[0].type_name(), "audio");
        assert_eq!(first("![a](clip.webm?x=1)").content[0].type_name(), "video");
        assert_eq!(first("![a](pic.png)").content[0].type_name(), "image");
    }

    #[test]
    fn toc_markers_become_table_of_contents() {
        assert_eq!(first("[[_TOC_]]").kind, NodeKind::TableOfContents);
        assert_eq!(first("[TOC]").kind, NodeKind::TableOfContents);
    }

    #[test]
    fn html_comments_become_an_empty_paragraph() {
        let doc = parse("<!-- HTML comment -->");
        assert_eq!(doc.content, vec![Node::paragraph(vec![])]);
    }

    #[test]
    fn inline_html_marks_are_paired() {
        let paragraph = first("a <strong>Bold</strong> b <foo>gone</foo> c");
        assert_eq!(paragraph.text_content(), "a Bold b  c");
        let bold = &paragraph.content[1];
        assert_eq!(bold.marks[0].kind, MarkKind::Bold);
        assert_eq!(bold.marks[0].source.markdown(), Some("<strong>Bold</strong>"));
        assert_eq!(bold.marks[0].source.tag_name(), Some("strong"));
    }

    #[test]
    fn lone_html_tags_wrap_following_blocks() {
        let doc = parse("<del>\n\n*foo*\n\n</del>\n");
        assert_eq!(doc.content.len(), 1);
        let text = &doc.content[0].content[0];
        let kinds: Vec<_> = text.marks.iter().map(|m| m.kind.type_name()).collect();
        assert_eq!(kinds, vec!["strike", "italic"]);
        assert_eq!(text.marks[0].source.markdown(), Some("<del>\n\n*foo*\n\n</del>"));
        assert_eq!(doc.content[0].source.markdown(), Some("<del>\n\n*foo*\n\n</del>"));

        let doc = parse("<div>\n\n**md**\n\n</div>\n");
        assert_eq!(doc.content[0].type_name(), "div");
        assert_eq!(doc.content[0].content[0].text_content(), "md");
    }

    #[test]
    fn frontmatter_is_split_before_parsing() {
        let doc = parse("---\ntitle: Page\n---\n\n# Body\n");
        assert_eq!(
            doc.content[0].kind,
            NodeKind::Frontmatter {
                language: crate::model::FrontmatterLanguage::Yaml
            }
        );
        assert_eq!(doc.content[0].text_content(), "title: Page");
        assert_eq!(doc.content[0].source.markdown(), Some("---\ntitle: Page\n---"));
        assert_eq!(doc.content[1].source.markdown(), Some("# Body"));
    }

    #[test]
    fn footnotes_stay_in_place() {
        let doc = parse("Text[^1]\n\n[^1]: The note\n\nAfter\n");
        let names: Vec<_> = doc.content.iter().map(Node::type_name).collect();
        assert_eq!(names, vec!["paragraph", "footnoteDefinition", "paragraph"]);
        assert_eq!(
            doc.content[0].content[1].kind,
            NodeKind::FootnoteReference {
                identifier: "1".into(),
                label: "1".into()
            }
        );
        assert_eq!(doc.content[1].source.markdown(), Some("[^1]: The note"));
    }

    #[test]
    fn tables_record_alignment() {
        let table = first("| a | b |\n|:--|--:|\n| 1 | 2 |\n");
        assert_eq!(table.content.len(), 2);
        let header = &table.content[0].content[0];
        assert_eq!(header.kind.cell_attrs().and_then(|a| a.align), Some(Alignment::Left));
        assert_eq!(header.text_content(), "a");
        assert!(matches!(table.content[1].content[1].kind, NodeKind::TableCell(_)));
    }

    #[test]
    fn invalid_utf8_is_a_parse_error() {
        assert_eq!(
            deserialize_bytes(b"ok\xff"),
            Err(ParseError::InvalidEncoding { valid_up_to: 2 })
        );
    }

    #[test]
    fn nesting_is_bounded() {
        let parser = MarkdownParser::new(ParserOptions {
            max_nesting: 8,
            ..ParserOptions::default()
        });
        let deep = format!("{}deep", "> ".repeat(20));
        assert!(matches!(
            parser.parse(&deep),
            Err(ParseError::NestingTooDeep { limit: 8, .. })
        ));
    }

    #[test]
    fn empty_input_is_one_empty_paragraph() {
        assert_eq!(parse("").content, vec![Node::paragraph(vec![])]);
        assert_eq!(parse("\n\n").content, vec![Node::paragraph(vec![])]);
    }

    #[test]
    fn gaps_between_siblings_are_counted() {
        let doc = parse("a\n\n\nb\n\n> c\n>\n> d\n");
        let gaps: Vec<_> = doc
            .content
            .iter()
            .map(|node| node.source.span().and_then(|s| s.newlines_before))
            .collect();
        assert_eq!(gaps, vec![None, Some(3), Some(2)]);
        let quote = &doc.content[2];
        assert_eq!(quote.content[1].source.span().and_then(|s| s.newlines_before), Some(2));
    }

    #[test]
    fn every_node_from_plain_markdown_is_recovered() {
        let doc = parse("# Title\n\nSome *text* and a [link](https://x.y).\n\n> quote\n");
        for node in doc.descendants() {
            if node.as_text().is_none() {
                assert!(node.source.is_recovered(), "{}", node.type_name());
            }
        }
    }
}
