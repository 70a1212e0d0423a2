//! Markdown serialization (document tree → Markdown)
//!
//! Nodes and marks that carry a source map and are unchanged compared with
//! the pristine document are written back as their original text. Anything
//! else is regenerated from the tree, reusing the delimiters the author chose
//! when the source remembers them.
//!
//! Unchanged means: same kind and attributes, same marks, same source key
//! and markdown, and the same holds recursively for the content. Positions
//! are ignored so a tree that went through JSON still passes through.
//!
//! Regeneration rules:
//!
//!     | Node            | Markdown                                            |
//!     |-----------------|-----------------------------------------------------|
//!     | paragraph       | inline content                                      |
//!     | heading         | `#` × level, or setext underline when recorded      |
//!     | blockquote      | `> ` prefix, or `>>>` fences when multiline          |
//!     | lists           | recorded bullet / number, continuation = marker width |
//!     | taskItem        | `[ ]` / `[x]` after the marker                      |
//!     | codeBlock       | recorded fence, four spaces when it was indented    |
//!     | table           | pipe table when simple, `<table>` HTML otherwise     |
//!     | html element    | `<tag>text</tag>` or tags around blank-line blocks  |
//!     | footnote def.   | `[^label]: ` then indented content                  |
//!     | image           | `![alt](src "title"){width=… height=…}`             |

use std::collections::HashMap;

use super::inline::{
    code_span, escape_cell_text, escape_text, html_attr, html_text, link_destination,
    longest_run, quote_title, split_padding,
};
use super::writer::MarkdownWriter;
use crate::error::FormatError;
use crate::model::{
    Alignment, CellAttrs, Document, LinkAttrs, Mark, MarkKind, MediaAttrs, Node, NodeKind,
    SourceMapKey,
};
use crate::sanitizer::sanitize_url;

/// Choices for regenerated syntax
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializerOptions {
    /// Bullet for lists built without a recorded marker
    pub bullet: char,
    pub emphasis: String,
    pub strong: String,
    /// Fence for code blocks built without a recorded fence
    pub fence: String,
    pub horizontal_rule: String,
    /// Reuse the source of unchanged nodes
    pub passthrough: bool,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        SerializerOptions {
            bullet: '*',
            emphasis: "_".to_string(),
            strong: "**".to_string(),
            fence: "```".to_string(),
            horizontal_rule: "---".to_string(),
            passthrough: true,
        }
    }
}

/// Serialize `doc`, passing through everything unchanged compared with
/// `pristine`. Without a pristine document the tree's own sources are
/// trusted.
pub fn serialize(
    doc: &Document,
    pristine: Option<&Document>,
    options: &SerializerOptions,
) -> Result<String, FormatError> {
    MarkdownSerializer::new(options.clone()).serialize(doc, pristine)
}

#[derive(Debug, Clone, Default)]
pub struct MarkdownSerializer {
    options: SerializerOptions,
}

impl MarkdownSerializer {
    pub fn new(options: SerializerOptions) -> Self {
        MarkdownSerializer { options }
    }

    pub fn options(&self) -> &SerializerOptions {
        &self.options
    }

    pub fn serialize(
        &self,
        doc: &Document,
        pristine: Option<&Document>,
    ) -> Result<String, FormatError> {
        let original = pristine.unwrap_or(doc);
        let mut state = State {
            options: &self.options,
            index: PristineIndex::build(original),
            writer: MarkdownWriter::new(),
        };
        state.blocks(&doc.content, None)?;

        let has_definitions = doc
            .descendants()
            .any(|node| matches!(node.kind, NodeKind::ReferenceDefinition { .. }));
        if let Some(definitions) = &original.attrs.reference_definitions {
            if !has_definitions && !definitions.trim().is_empty() {
                state.writer.separate(2);
                state.writer.write(definitions.trim_end());
            }
        }
        Ok(state.writer.finish())
    }
}

/// Where the nodes of the pristine document sit
#[derive(Default)]
struct PristineIndex<'p> {
    nodes: HashMap<&'p SourceMapKey, &'p Node>,
    /// Key of the previous sibling of each keyed node
    previous: HashMap<&'p SourceMapKey, &'p SourceMapKey>,
    /// Nodes carrying each keyed mark, in document order
    marks: HashMap<&'p SourceMapKey, Vec<&'p Node>>,
}

impl<'p> PristineIndex<'p> {
    fn build(doc: &'p Document) -> Self {
        let mut index = PristineIndex::default();
        index.add_siblings(&doc.content);
        index
    }

    fn add_siblings(&mut self, nodes: &'p [Node]) {
        let mut previous: Option<&'p SourceMapKey> = None;
        for node in nodes {
            let key = node.source.key();
            if let Some(key) = key {
                self.nodes.insert(key, node);
                if let Some(previous) = previous {
                    self.previous.insert(key, previous);
                }
            }
            previous = key;
            for mark in &node.marks {
                if let Some(key) = mark.source.key() {
                    self.marks.entry(key).or_default().push(node);
                }
            }
            self.add_siblings(&node.content);
        }
    }
}

/// Equal for passthrough purposes
fn same_node(a: &Node, b: &Node) -> bool {
    a.kind == b.kind
        && a.source.same_origin(&b.source)
        && a.marks.len() == b.marks.len()
        && a.marks
            .iter()
            .zip(&b.marks)
            .all(|(x, y)| x.kind == y.kind && x.source.same_origin(&y.source))
        && a.content.len() == b.content.len()
        && a.content.iter().zip(&b.content).all(|(x, y)| same_node(x, y))
}

/// Drop the container prefixes repeated on continuation lines, up to the
/// column the text started at.
fn dedent(markdown: &str, column: usize) -> String {
    let mut lines = markdown.split('\n');
    let mut out = lines.next().unwrap_or_default().to_string();
    for line in lines {
        out.push('\n');
        let prefix = line
            .bytes()
            .take(column)
            .take_while(|b| matches!(b, b' ' | b'\t' | b'>'))
            .count();
        out.push_str(&line[prefix..]);
    }
    out
}

fn is_blank_paragraph(node: &Node) -> bool {
    node.kind == NodeKind::Paragraph && node.content.is_empty()
}

/// Marks of `node` with code moved innermost
fn ordered_marks(node: &Node) -> Vec<&Mark> {
    let (code, other): (Vec<&Mark>, Vec<&Mark>) =
        node.marks.iter().partition(|mark| mark.kind == MarkKind::Code);
    other.into_iter().chain(code).collect()
}

/// Where inline content is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Paragraph,
    Heading,
    Cell,
}

type Run<'n> = (&'n Node, Vec<&'n Mark>);

struct State<'a> {
    options: &'a SerializerOptions,
    index: PristineIndex<'a>,
    writer: MarkdownWriter,
}

impl State<'_> {
    // Passthrough

    /// The original text of `node` when it may be reused
    fn passthrough(&self, node: &Node) -> Option<String> {
        if !self.options.passthrough {
            return None;
        }
        let span = node.source.span()?;
        let original = self.index.nodes.get(&span.key)?;
        if !same_node(node, original) {
            tracing::trace!(key = %span.key, node = node.type_name(), "node changed, regenerating");
            return None;
        }
        Some(dedent(&span.markdown, span.column))
    }

    /// The original text of a mark whose whole run is unchanged
    fn mark_passthrough(&self, mark: &Mark, group: &[Run]) -> Option<String> {
        if !self.options.passthrough {
            return None;
        }
        let span = mark.source.span()?;
        let original = self.index.marks.get(&span.key)?;
        let unchanged = original.len() == group.len()
            && original.iter().zip(group).all(|(a, (b, _))| same_node(a, b));
        // A tag wrapping whole blocks cannot be written inside one
        let spans_blocks = span
            .markdown
            .split('\n')
            .skip(1)
            .any(|line| line.trim_matches(|c: char| c == '>' || c.is_whitespace()).is_empty());
        (unchanged && !spans_blocks).then(|| dedent(&span.markdown, span.column))
    }

    /// Newlines between two sibling blocks
    fn separator(&self, prev: &Node, node: &Node, parent: Option<&Node>) -> usize {
        if self.options.passthrough {
            if let (Some(prev_key), Some(span)) = (prev.source.key(), node.source.span()) {
                let adjacent = self.index.previous.get(&span.key) == Some(&prev_key);
                if let (true, Some(newlines)) = (adjacent, span.newlines_before) {
                    return newlines.max(1);
                }
            }
        }
        match (&prev.kind, &node.kind, parent.map(|parent| &parent.kind)) {
            (_, _, Some(parent)) if parent.is_list() => 1,
            (NodeKind::Paragraph, kind, Some(NodeKind::ListItem | NodeKind::TaskItem { .. }))
                if kind.is_list() =>
            {
                1
            }
            (NodeKind::ReferenceDefinition { .. }, NodeKind::ReferenceDefinition { .. }, _) => 1,
            (
                NodeKind::HtmlElement { .. },
                NodeKind::HtmlElement { .. },
                Some(NodeKind::HtmlElement { .. }),
            ) => 1,
            _ => 2,
        }
    }

    // Blocks

    fn blocks(&mut self, nodes: &[Node], parent: Option<&Node>) -> Result<(), FormatError> {
        let mut previous: Option<&Node> = None;
        for node in nodes {
            if is_blank_paragraph(node) {
                continue;
            }
            if let Some(prev) = previous {
                let newlines = self.separator(prev, node, parent);
                self.writer.separate(newlines);
            }
            self.block(node)?;
            previous = Some(node);
        }
        Ok(())
    }

    fn container(
        &mut self,
        delim: &str,
        first: &str,
        f: impl FnOnce(&mut Self) -> Result<(), FormatError>,
    ) -> Result<(), FormatError> {
        let outer = self.writer.open(delim, first);
        let result = f(self);
        self.writer.close(outer);
        result
    }

    fn block(&mut self, node: &Node) -> Result<(), FormatError> {
        if let Some(markdown) = self.passthrough(node) {
            self.writer.write(&markdown);
            return Ok(());
        }
        match &node.kind {
            NodeKind::Paragraph => {
                let text = self.inlines(&node.content, Context::Paragraph)?;
                self.writer.write(&text);
            }
            NodeKind::Heading { level, setext } => self.heading(node, *level, *setext)?,
            NodeKind::Blockquote { multiline: true } => {
                self.writer.write(">>>");
                self.writer.separate(1);
                self.blocks(&node.content, Some(node))?;
                self.writer.separate(1);
                self.writer.write(">>>");
            }
            NodeKind::Blockquote { multiline: false } => {
                self.container("> ", "> ", |state| state.blocks(&node.content, Some(node)))?;
            }
            NodeKind::BulletList { .. }
            | NodeKind::OrderedList { .. }
            | NodeKind::TaskList { .. } => {
                self.list(node)?
            }
            NodeKind::CodeBlock {
                language,
                lang_params,
                fence,
            } => {
                let code = node.text_content();
                match fence {
                    None if !code.is_empty() => {
                        let indented: Vec<String> = code
                            .split('\n')
                            .map(|line| {
                                if line.is_empty() {
                                    String::new()
                                } else {
                                    format!("    {line}")
                                }
                            })
                            .collect();
                        self.writer.write(&indented.join("\n"));
                    }
                    _ => {
                        let mut info = language.clone().unwrap_or_default();
                        if let Some(params) = lang_params {
                            info.push(':');
                            info.push_str(params);
                        }
                        let fence = fence.as_ref().map(|fence| (fence.marker, fence.length));
                        self.fenced(&info, &code, fence);
                    }
                }
            }
            NodeKind::Diagram { language } => {
                self.fenced(language, &node.text_content(), None);
            }
            NodeKind::Table => self.table(node)?,
            NodeKind::HorizontalRule => self.writer.write(&self.options.horizontal_rule),
            NodeKind::Frontmatter { language } => {
                let delimiter = language.delimiter();
                let body = node.text_content();
                if body.is_empty() {
                    self.writer.write(&format!("{delimiter}\n{delimiter}"));
                } else {
                    self.writer.write(&format!("{delimiter}\n{body}\n{delimiter}"));
                }
            }
            NodeKind::FootnoteDefinition { label, .. } => {
                let first = format!("[^{label}]: ");
                self.container("    ", &first, |state| state.blocks(&node.content, Some(node)))?;
            }
            NodeKind::ReferenceDefinition {
                identifier,
                url,
                title,
            } => {
                let text = node.text_content();
                if text.trim().is_empty() {
                    let title = title
                        .as_deref()
                        .map(|title| format!(" {}", quote_title(title)))
                        .unwrap_or_default();
                    self.writer.write(&format!("[{identifier}]: {}{title}", link_destination(url)));
                } else {
                    self.writer.write(text.trim_end());
                }
            }
            NodeKind::TableOfContents => self.writer.write("[[_TOC_]]"),
            NodeKind::HtmlElement { tag } => self.html_element(node, tag.name())?,
            NodeKind::ListItem
            | NodeKind::TaskItem { .. }
            | NodeKind::TableRow
            | NodeKind::TableHeader(_)
            | NodeKind::TableCell(_)
            | NodeKind::Text(_)
            | NodeKind::HardBreak
            | NodeKind::Image(_)
            | NodeKind::Audio(_)
            | NodeKind::Video(_)
            | NodeKind::FootnoteReference { .. } => {
                return Err(FormatError::SerializationError(format!(
                    "{} cannot appear where a block is expected",
                    node.type_name()
                )));
            }
        }
        Ok(())
    }

    fn heading(&mut self, node: &Node, level: u8, setext: bool) -> Result<(), FormatError> {
        if setext && level <= 2 {
            let text = self.inlines(&node.content, Context::Paragraph)?;
            let width = text.lines().map(|line| line.chars().count()).max().unwrap_or(0).max(3);
            let underline = if level == 1 { "=" } else { "-" }.repeat(width);
            self.writer.write(&format!("{text}\n{underline}"));
        } else {
            let text = self.inlines(&node.content, Context::Heading)?;
            let hashes = "#".repeat(usize::from(level.clamp(1, 6)));
            let line = format!("{hashes} {}", text.replace('\n', " "));
            self.writer.write(line.trim_end());
        }
        Ok(())
    }

    fn fenced(&mut self, info: &str, code: &str, fence: Option<(char, usize)>) {
        let (marker, length) = fence.unwrap_or_else(|| {
            let marker = self.options.fence.chars().next().unwrap_or('`');
            (marker, self.options.fence.chars().count())
        });
        let length = length.max(3).max(longest_run(code, marker) + 1);
        let fence = marker.to_string().repeat(length);
        if code.is_empty() {
            self.writer.write(&format!("{fence}{info}\n{fence}"));
        } else {
            self.writer.write(&format!("{fence}{info}\n{code}\n{fence}"));
        }
    }

    fn list_marker(&self, list: &Node, index: usize) -> String {
        let ordered = |start: u64, parens: bool| {
            let number = start + index as u64;
            format!("{number}{} ", if parens { ')' } else { '.' })
        };
        let bullet = |bullet: char| {
            if list.source.is_recovered() {
                format!("{bullet} ")
            } else {
                format!("{} ", self.options.bullet)
            }
        };
        match &list.kind {
            NodeKind::OrderedList { start, parens } => ordered(*start, *parens),
            NodeKind::TaskList {
                numeric: true,
                start,
                parens,
                ..
            } => ordered(*start, *parens),
            NodeKind::BulletList { bullet: b } | NodeKind::TaskList { bullet: b, .. } => bullet(*b),
            _ => bullet(self.options.bullet),
        }
    }

    fn list(&mut self, node: &Node) -> Result<(), FormatError> {
        let mut previous: Option<&Node> = None;
        for (index, item) in node.content.iter().enumerate() {
            if let Some(prev) = previous {
                let newlines = self.separator(prev, item, Some(node));
                self.writer.separate(newlines);
            }
            previous = Some(item);

            if let Some(markdown) = self.passthrough(item) {
                self.writer.write(&markdown);
                continue;
            }
            let marker = self.list_marker(node, index);
            let indent = " ".repeat(marker.len());
            match &item.kind {
                NodeKind::ListItem => {
                    self.container(&indent, &marker, |state| {
                        state.blocks(&item.content, Some(item))
                    })?;
                }
                NodeKind::TaskItem { checked } => {
                    let first = format!("{marker}[{}] ", if *checked { 'x' } else { ' ' });
                    let empty = item.content.iter().all(is_blank_paragraph);
                    self.container(&indent, &first, |state| {
                        if empty {
                            // A bare `[ ]` is not a task
                            state.writer.write("&nbsp;");
                            Ok(())
                        } else {
                            state.blocks(&item.content, Some(item))
                        }
                    })?;
                }
                _ => {
                    return Err(FormatError::SerializationError(format!(
                        "{} cannot appear inside {}",
                        item.type_name(),
                        node.type_name()
                    )));
                }
            }
        }
        Ok(())
    }

    fn html_element(&mut self, node: &Node, name: &str) -> Result<(), FormatError> {
        if let Some(text) = plain_paragraph_text(&node.content) {
            self.writer.write(&format!("<{name}>{}</{name}>", html_text(&text)));
            return Ok(());
        }
        self.writer.write(&format!("<{name}>"));
        self.writer.separate(2);
        self.blocks(&node.content, Some(node))?;
        self.writer.separate(2);
        self.writer.write(&format!("</{name}>"));
        Ok(())
    }

    // Tables

    fn table(&mut self, node: &Node) -> Result<(), FormatError> {
        if is_pipe_table(node) {
            self.pipe_table(node)
        } else {
            self.html_table(node)
        }
    }

    fn pipe_table(&mut self, node: &Node) -> Result<(), FormatError> {
        let mut rows = Vec::with_capacity(node.content.len());
        for row in &node.content {
            let mut cells = Vec::with_capacity(row.content.len());
            for cell in &row.content {
                let inlines = cell.content.first().map_or(&[][..], |p| &p.content[..]);
                cells.push(self.inlines(inlines, Context::Cell)?);
            }
            rows.push(cells);
        }
        let width = rows.first().map_or(0, Vec::len);
        let alignments: Vec<Option<Alignment>> = node.content[0]
            .content
            .iter()
            .map(|cell| cell.kind.cell_attrs().and_then(|attrs| attrs.align))
            .collect();

        let mut lines = Vec::with_capacity(rows.len() + 1);
        for (i, cells) in rows.iter().enumerate() {
            let mut line = String::from("|");
            for column in 0..width {
                let text = cells.get(column).map_or("", String::as_str);
                line.push(' ');
                if !text.is_empty() {
                    line.push_str(text);
                    line.push(' ');
                }
                line.push('|');
            }
            lines.push(line);
            if i == 0 {
                let mut delimiter = String::from("|");
                for (column, header) in cells.iter().enumerate() {
                    let dashes = (header.chars().count() + 2).max(3);
                    let align = alignments.get(column).copied().flatten();
                    delimiter.push_str(&delimiter_cell(dashes, align));
                    delimiter.push('|');
                }
                lines.push(delimiter);
            }
        }
        self.writer.write(&lines.join("\n"));
        Ok(())
    }

    fn html_table(&mut self, node: &Node) -> Result<(), FormatError> {
        self.writer.write("<table>");
        for row in &node.content {
            self.writer.separate(1);
            self.writer.write("<tr>");
            for cell in &row.content {
                let (tag, attrs) = match &cell.kind {
                    NodeKind::TableHeader(attrs) => ("th", attrs),
                    NodeKind::TableCell(attrs) => ("td", attrs),
                    _ => {
                        return Err(FormatError::SerializationError(format!(
                            "{} cannot appear inside tableRow",
                            cell.type_name()
                        )));
                    }
                };
                let open = format!("<{tag}{}>", cell_attributes(attrs));
                self.writer.separate(1);
                match plain_paragraph_text(&cell.content) {
                    Some(text) => {
                        self.writer.write(&format!("{open}{}</{tag}>", html_text(&text)));
                    }
                    None if cell.content.iter().all(is_blank_paragraph) => {
                        self.writer.write(&format!("{open}</{tag}>"));
                    }
                    None => {
                        self.writer.write(&open);
                        self.writer.separate(2);
                        self.blocks(&cell.content, Some(cell))?;
                        self.writer.separate(2);
                        self.writer.write(&format!("</{tag}>"));
                    }
                }
            }
            self.writer.separate(1);
            self.writer.write("</tr>");
        }
        self.writer.separate(1);
        self.writer.write("</table>");
        Ok(())
    }

    // Inlines

    fn inlines(&self, nodes: &[Node], context: Context) -> Result<String, FormatError> {
        let runs: Vec<Run> = nodes.iter().map(|node| (node, ordered_marks(node))).collect();
        let mut out = String::new();
        self.inline_run(&runs, 0, context, &mut out)?;
        Ok(out)
    }

    /// Write `runs`, grouping neighbours that share the mark at `depth`.
    fn inline_run(
        &self,
        runs: &[Run],
        depth: usize,
        context: Context,
        out: &mut String,
    ) -> Result<(), FormatError> {
        let mut i = 0;
        while i < runs.len() {
            let Some(mark) = runs[i].1.get(depth).copied() else {
                let line_start = out.ends_with('\n') || (out.is_empty() && depth == 0);
                let line_start = line_start && context == Context::Paragraph;
                self.inline_leaf(runs[i].0, context, line_start, out)?;
                i += 1;
                continue;
            };
            let len = runs[i..]
                .iter()
                .take_while(|(_, marks)| marks.get(depth).is_some_and(|m| *m == mark))
                .count();
            self.marked(mark, &runs[i..i + len], depth, context, out)?;
            i += len;
        }
        Ok(())
    }

    fn inline_leaf(
        &self,
        node: &Node,
        context: Context,
        line_start: bool,
        out: &mut String,
    ) -> Result<(), FormatError> {
        match &node.kind {
            NodeKind::Text(text) => match context {
                Context::Cell => out.push_str(&escape_cell_text(text)),
                _ => out.push_str(&escape_text(text, line_start)),
            },
            NodeKind::HardBreak if context == Context::Cell => out.push_str("<br>"),
            NodeKind::HardBreak => match self.passthrough(node) {
                Some(markdown) => out.push_str(&markdown),
                None => out.push_str("\\\n"),
            },
            NodeKind::Image(attrs) | NodeKind::Audio(attrs) | NodeKind::Video(attrs) => {
                match self.passthrough(node) {
                    Some(markdown) => out.push_str(&markdown),
                    None => out.push_str(&media(node, attrs)),
                }
            }
            NodeKind::FootnoteReference { label, .. } => match self.passthrough(node) {
                Some(markdown) => out.push_str(&markdown),
                None => out.push_str(&format!("[^{label}]")),
            },
            _ => {
                return Err(FormatError::SerializationError(format!(
                    "{} cannot appear inline",
                    node.type_name()
                )));
            }
        }
        Ok(())
    }

    fn marked(
        &self,
        mark: &Mark,
        group: &[Run],
        depth: usize,
        context: Context,
        out: &mut String,
    ) -> Result<(), FormatError> {
        if let Some(markdown) = self.mark_passthrough(mark, group) {
            out.push_str(&markdown);
            return Ok(());
        }
        let tag = mark.source.tag_name();

        if mark.kind == MarkKind::Code {
            let code: String = group.iter().map(|(node, _)| node.text_content()).collect();
            let rendered = match tag {
                Some(tag) => format!("<{tag}>{}</{tag}>", html_text(&code)),
                None => code_span(&code),
            };
            match context {
                Context::Cell => out.push_str(&rendered.replace('|', "\\|")),
                _ => out.push_str(&rendered),
            }
            return Ok(());
        }

        if let (MarkKind::Link(attrs), None) = (&mark.kind, tag) {
            if let Some(bare) = bare_link(mark, attrs, group, depth) {
                out.push_str(&bare);
                return Ok(());
            }
            let mut inner = String::new();
            self.inline_run(group, depth + 1, context, &mut inner)?;
            out.push('[');
            out.push_str(&inner);
            out.push_str(&link_tail(attrs));
            return Ok(());
        }

        let mut inner = String::new();
        self.inline_run(group, depth + 1, context, &mut inner)?;
        let (lead, core, trail) = split_padding(&inner);
        if core.is_empty() {
            out.push_str(&inner);
            return Ok(());
        }
        let (open, close) = match tag {
            Some(tag) => (html_open(tag, &mark.kind), format!("</{tag}>")),
            None => self.delimiters(mark),
        };
        out.push_str(lead);
        out.push_str(&open);
        out.push_str(core);
        out.push_str(&close);
        out.push_str(trail);
        Ok(())
    }

    fn delimiters(&self, mark: &Mark) -> (String, String) {
        match mark.kind {
            MarkKind::InlineDiff(diff) => {
                let (open, close) = diff.delimiters();
                (open.to_string(), close.to_string())
            }
            MarkKind::Highlight => ("<mark>".to_string(), "</mark>".to_string()),
            _ => {
                let delimiter = self.delimiter(mark);
                (delimiter.clone(), delimiter)
            }
        }
    }

    /// Delimiter of a regenerated emphasis mark, as written when known
    fn delimiter(&self, mark: &Mark) -> String {
        let written = mark.source.markdown().unwrap_or_default();
        let recorded = match mark.kind {
            MarkKind::Bold => ["**", "__"].into_iter().find(|d| written.starts_with(d)),
            MarkKind::Italic => ["*", "_"].into_iter().find(|d| written.starts_with(d)),
            MarkKind::Strike => ["~~", "~"].into_iter().find(|d| written.starts_with(d)),
            MarkKind::Code
            | MarkKind::Link(_)
            | MarkKind::InlineDiff(_)
            | MarkKind::Highlight => None,
        };
        match (recorded, &mark.kind) {
            (Some(recorded), _) => recorded.to_string(),
            (None, MarkKind::Bold) => self.options.strong.clone(),
            (None, MarkKind::Italic) => self.options.emphasis.clone(),
            _ => "~~".to_string(),
        }
    }
}

/// A bare URL when the link text is its own target
fn bare_link(mark: &Mark, attrs: &LinkAttrs, group: &[Run], depth: usize) -> Option<String> {
    if attrs.title.is_some() || attrs.is_reference {
        return None;
    }
    let plain = group
        .iter()
        .all(|(node, marks)| marks.len() == depth + 1 && node.as_text().is_some());
    if !plain {
        return None;
    }
    let text: String = group.iter().filter_map(|(node, _)| node.as_text()).collect();
    let is_target = attrs.href.as_deref() == Some(text.as_str())
        || attrs.canonical_src.as_deref() == Some(text.as_str());
    if !is_target {
        return None;
    }
    let angle = mark.source.markdown().is_some_and(|m| m.starts_with('<'));
    if angle {
        Some(format!("<{text}>"))
    } else if ["http://", "https://", "www."].iter().any(|p| text.starts_with(p)) {
        Some(text)
    } else {
        None
    }
}

/// Everything after the link text: `][id]` or `](url "title")`
fn link_tail(attrs: &LinkAttrs) -> String {
    if let (true, Some(label)) = (attrs.is_reference, attrs.canonical_src.as_deref()) {
        return format!("][{label}]");
    }
    let target = safe_target(attrs.canonical_src.as_deref(), attrs.href.as_deref());
    let destination = if target.is_empty() {
        String::new()
    } else {
        link_destination(target)
    };
    match attrs.title.as_deref() {
        Some(title) => format!("]({destination} {})", quote_title(title)),
        None => format!("]({destination})"),
    }
}

/// The destination to write: the one recorded from the source unless it
/// would carry a rejected scheme, else the sanitized one
fn safe_target<'a>(canonical: Option<&'a str>, sanitized: Option<&'a str>) -> &'a str {
    canonical
        .filter(|target| sanitize_url(target).is_some())
        .or(sanitized)
        .unwrap_or_default()
}

fn html_open(tag: &str, kind: &MarkKind) -> String {
    let MarkKind::Link(attrs) = kind else {
        return format!("<{tag}>");
    };
    let mut open = format!("<{tag}");
    if let Some(href) = &attrs.href {
        open.push_str(&format!(" href=\"{}\"", html_attr(href)));
    }
    if let Some(title) = &attrs.title {
        open.push_str(&format!(" title=\"{}\"", html_attr(title)));
    }
    open.push('>');
    open
}

fn media(node: &Node, attrs: &MediaAttrs) -> String {
    if let Some(tag) = node.source.tag_name() {
        let mut html = format!("<{tag}");
        let named = [
            ("src", &attrs.src),
            ("alt", &attrs.alt),
            ("title", &attrs.title),
            ("width", &attrs.width),
            ("height", &attrs.height),
        ];
        for (name, value) in named {
            if let Some(value) = value {
                html.push_str(&format!(" {name}=\"{}\"", html_attr(value)));
            }
        }
        html.push('>');
        if tag != "img" {
            html.push_str(&format!("</{tag}>"));
        }
        return html;
    }

    let alt = escape_text(attrs.alt.as_deref().unwrap_or_default(), false);
    let target = safe_target(attrs.canonical_src.as_deref(), attrs.src.as_deref());
    let mut out = if attrs.is_reference {
        format!("![{alt}][{target}]")
    } else {
        let inline_data = target.starts_with("data:") || target.starts_with("blob:");
        let destination = if target.is_empty() || inline_data {
            String::new()
        } else {
            link_destination(target)
        };
        match attrs.title.as_deref() {
            Some(title) => format!("![{alt}]({destination} {})", quote_title(title)),
            None => format!("![{alt}]({destination})"),
        }
    };
    let sizes: Vec<String> = [("width", &attrs.width), ("height", &attrs.height)]
        .into_iter()
        .filter_map(|(name, value)| value.as_ref().map(|value| format!("{name}={value}")))
        .collect();
    if !sizes.is_empty() {
        out.push_str(&format!("{{{}}}", sizes.join(" ")));
    }
    out
}

/// Text of content that is one paragraph of unmarked text
fn plain_paragraph_text(content: &[Node]) -> Option<String> {
    let [paragraph] = content else { return None };
    if paragraph.kind != NodeKind::Paragraph || paragraph.content.is_empty() {
        return None;
    }
    let plain = paragraph
        .content
        .iter()
        .all(|node| node.marks.is_empty() && node.as_text().is_some());
    plain.then(|| paragraph.text_content())
}

/// Whether a table fits pipe syntax: one header row first, single
/// paragraph cells, no spans.
fn is_pipe_table(table: &Node) -> bool {
    let Some((header, body)) = table.content.split_first() else {
        return false;
    };
    let width = header.content.len();
    let simple_cell = |cell: &Node| {
        cell.kind
            .cell_attrs()
            .is_some_and(|attrs| attrs.colspan <= 1 && attrs.rowspan <= 1)
            && match cell.content.as_slice() {
                [] => true,
                [paragraph] => paragraph.kind == NodeKind::Paragraph,
                _ => false,
            }
    };
    width > 0
        && table.content.iter().all(|row| row.kind == NodeKind::TableRow)
        && header
            .content
            .iter()
            .all(|cell| matches!(cell.kind, NodeKind::TableHeader(_)) && simple_cell(cell))
        && body.iter().all(|row| {
            row.content.len() <= width
                && row
                    .content
                    .iter()
                    .all(|cell| matches!(cell.kind, NodeKind::TableCell(_)) && simple_cell(cell))
        })
}

fn delimiter_cell(width: usize, align: Option<Alignment>) -> String {
    match align {
        Some(Alignment::Left) => format!(":{}", "-".repeat(width - 1)),
        Some(Alignment::Right) => format!("{}:", "-".repeat(width - 1)),
        Some(Alignment::Center) => format!(":{}:", "-".repeat(width - 2)),
        None => "-".repeat(width),
    }
}

fn cell_attributes(attrs: &CellAttrs) -> String {
    let mut out = String::new();
    if attrs.colspan > 1 {
        out.push_str(&format!(" colspan=\"{}\"", attrs.colspan));
    }
    if attrs.rowspan > 1 {
        out.push_str(&format!(" rowspan=\"{}\"", attrs.rowspan));
    }
    if let Some(align) = attrs.align {
        out.push_str(&format!(" align=\"{}\"", align.as_str()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::markdown::parser::deserialize;
    use crate::model::{CodeFence, DiffKind, HtmlTag, SourceMap};

    fn regenerate(doc: &Document) -> String {
        let options = SerializerOptions {
            passthrough: false,
            ..SerializerOptions::default()
        };
        serialize(doc, None, &options).unwrap()
    }

    fn roundtrip(markdown: &str) -> String {
        let doc = deserialize(markdown).unwrap();
        serialize(&doc, Some(&doc), &SerializerOptions::default()).unwrap()
    }

    fn text(value: &str) -> Node {
        Node::text(value)
    }

    #[test]
    fn unchanged_documents_come_back_verbatim() {
        let sources = [
            "# Heading\n\nSome __bold__ and *em* text.\n\n* one\n* two",
            "> quote\n>\n> - nested\n>   continued",
            "1) first\n\n2) second",
            "[GitLab][gitlab-url]\n\n[gitlab-url]: https://gitlab.com \"GitLab\"",
            "| a | b |\n|:--|--:|\n| 1 | 2 |",
            "---\ntitle: Page\n---\n\nBody",
            "~~~ruby\nputs 1\n~~~",
            "<div>\n\n**md**\n\n</div>",
            "Text[^1]\n\n[^1]: The note",
        ];
        for source in sources {
            assert_eq!(roundtrip(source), source);
        }
    }

    #[test]
    fn empty_paragraph_serializes_to_nothing() {
        assert_eq!(roundtrip("<!-- HTML comment -->"), "");
        assert_eq!(regenerate(&Document::new(vec![Node::paragraph(vec![])])), "");
    }

    #[test]
    fn edited_nodes_are_regenerated_and_neighbours_kept() {
        let pristine = deserialize("Some   *odd*   spacing\n\n\n\nsecond  __para__").unwrap();
        let mut edited = pristine.clone();
        edited.content[1].content[0] = text("changed ");
        let out = serialize(&edited, Some(&pristine), &SerializerOptions::default()).unwrap();
        assert_eq!(out, "Some   *odd*   spacing\n\n\n\nchanged __para__");
    }

    #[test]
    fn untouched_marks_keep_their_source_inside_edited_paragraphs() {
        let pristine = deserialize("a **`code`** b").unwrap();
        let mut edited = pristine.clone();
        edited.content[0].content[0] = text("start ");
        let out = serialize(&edited, Some(&pristine), &SerializerOptions::default()).unwrap();
        assert_eq!(out, "start **`code`** b");
    }

    #[test]
    fn regenerated_marks_reuse_recorded_delimiters() {
        let pristine = deserialize("__strong__ and _em_ and ~~gone~~").unwrap();
        let mut edited = pristine.clone();
        for node in &mut edited.content[0].content {
            if let NodeKind::Text(value) = &mut node.kind {
                *value = value.to_uppercase();
            }
        }
        let out = serialize(&edited, Some(&pristine), &SerializerOptions::default()).unwrap();
        assert_eq!(out, "__STRONG__ AND _EM_ AND ~~GONE~~");
    }

    #[test]
    fn whitespace_moves_outside_marks() {
        let doc = Document::new(vec![Node::paragraph(vec![
            text("a"),
            text(" bold ").with_marks(vec![Mark::bold()]),
            text("b"),
        ])]);
        assert_eq!(regenerate(&doc), "a **bold** b");
    }

    #[test]
    fn code_is_always_innermost() {
        let doc = Document::new(vec![Node::paragraph(vec![
            text("x").with_marks(vec![Mark::code(), Mark::bold()])
        ])]);
        assert_eq!(regenerate(&doc), "**`x`**");
    }

    #[test]
    fn text_is_escaped() {
        let doc = Document::new(vec![Node::paragraph(vec![text(
            "# not *a* heading\n1. nor a list",
        )])]);
        assert_eq!(regenerate(&doc), "\\# not \\*a\\* heading\n1\\. nor a list");
    }

    #[test]
    fn html_sourced_marks_keep_their_tags() {
        let pristine = deserialize("<strong>Bold</strong> text").unwrap();
        let mut edited = pristine.clone();
        let marks = pristine.content[0].content[0].marks.clone();
        edited.content[0].content[0] = text("Bolder").with_marks(marks);
        let out = serialize(&edited, Some(&pristine), &SerializerOptions::default()).unwrap();
        assert_eq!(out, "<strong>Bolder</strong> text");
    }

    #[test]
    fn links_choose_their_syntax() {
        let link = |href: &str, label: &str| text(label).with_marks(vec![Mark::link(href)]);
        let doc = Document::new(vec![Node::paragraph(vec![
            link("https://gitlab.com", "https://gitlab.com"),
            text(" "),
            link("/docs", "docs"),
            text(" "),
            link("./a b", "space"),
        ])]);
        assert_eq!(
            regenerate(&doc),
            "https://gitlab.com [docs](/docs) [space](<./a b>)"
        );

        let reference = text("GitLab").with_marks(vec![Mark::new(MarkKind::Link(LinkAttrs {
            href: Some("https://gitlab.com".into()),
            canonical_src: Some("gitlab-url".into()),
            title: None,
            is_reference: true,
        }))]);
        let doc = Document::new(vec![Node::paragraph(vec![reference])]);
        assert_eq!(regenerate(&doc), "[GitLab][gitlab-url]");
    }

    #[test]
    fn rejected_destinations_are_never_written() {
        let link = text("x").with_marks(vec![Mark::new(MarkKind::Link(LinkAttrs {
            href: None,
            canonical_src: Some("javascript:alert(1)".into()),
            title: None,
            is_reference: false,
        }))]);
        let doc = Document::new(vec![Node::paragraph(vec![link])]);
        assert_eq!(regenerate(&doc), "[x]()");

        let image = Node::leaf(NodeKind::Image(MediaAttrs {
            src: Some("/safe.png".into()),
            canonical_src: Some("JaVaScRiPt:alert(1)".into()),
            alt: Some("i".into()),
            ..MediaAttrs::default()
        }));
        let doc = Document::new(vec![Node::paragraph(vec![image])]);
        assert_eq!(regenerate(&doc), "![i](/safe.png)");
    }

    #[test]
    fn inline_diffs_and_highlights_are_written() {
        let addition = Mark::new(MarkKind::InlineDiff(DiffKind::Addition));
        let deletion = Mark::new(MarkKind::InlineDiff(DiffKind::Deletion));
        let doc = Document::new(vec![Node::paragraph(vec![
            text("+30 lines").with_marks(vec![addition]),
            text("-10 lines").with_marks(vec![deletion]),
        ])]);
        assert_eq!(regenerate(&doc), "{++30 lines+}{--10 lines-}");

        let doc = Document::new(vec![Node::paragraph(vec![
            text("this is some "),
            text("highlighted").with_marks(vec![Mark::new(MarkKind::Highlight)]),
            text(" text"),
        ])]);
        assert_eq!(regenerate(&doc), "this is some <mark>highlighted</mark> text");
    }

    #[test]
    fn diff_lookalike_text_is_escaped() {
        let doc = Document::new(vec![Node::paragraph(vec![text("{+kept+} and {-this-}")])]);
        let written = regenerate(&doc);
        assert_eq!(written, "\\{+kept+} and \\{-this-}");
        let reparsed = deserialize(&written).unwrap();
        assert_eq!(reparsed.content[0].content, vec![text("{+kept+} and {-this-}")]);
    }

    #[test]
    fn images_write_sizes_and_skip_inline_data() {
        let mut image = MediaAttrs {
            src: Some("img.png".into()),
            alt: Some("alt".into()),
            title: Some("Title".into()),
            width: Some("100".into()),
            height: Some("50%".into()),
            ..MediaAttrs::default()
        };
        let figure = Node::leaf(NodeKind::Image(image.clone()));
        let doc = Document::new(vec![Node::paragraph(vec![figure])]);
        assert_eq!(regenerate(&doc), "![alt](img.png \"Title\"){width=100 height=50%}");

        image = MediaAttrs {
            src: Some("data:image/png;base64,AAAA".into()),
            alt: Some("inline".into()),
            ..MediaAttrs::default()
        };
        let doc = Document::new(vec![Node::paragraph(vec![Node::leaf(NodeKind::Image(image))])]);
        assert_eq!(regenerate(&doc), "![inline]()");
    }

    #[test]
    fn lists_indent_continuations_by_marker_width() {
        let doc = Document::new(vec![Node::ordered_list(
            9,
            vec![
                Node::list_item(vec![Node::paragraph(vec![text("nine")])]),
                Node::list_item(vec![
                    Node::paragraph(vec![text("ten")]),
                    Node::bullet_list(vec![Node::list_item(vec![Node::paragraph(vec![text(
                        "inner",
                    )])])]),
                ]),
            ],
        )]);
        assert_eq!(regenerate(&doc), "9. nine\n10. ten\n    * inner");
    }

    #[test]
    fn task_items_write_checkboxes() {
        let task =
            |checked: bool, content: Vec<Node>| Node::new(NodeKind::TaskItem { checked }, content);
        let doc = Document::new(vec![Node::new(
            NodeKind::TaskList {
                numeric: false,
                start: 1,
                parens: false,
                bullet: '-',
            },
            vec![
                task(true, vec![Node::paragraph(vec![text("done")])]),
                task(false, vec![]),
            ],
        )]);
        assert_eq!(regenerate(&doc), "* [x] done\n* [ ] &nbsp;");
    }

    #[test]
    fn quotes_prefix_every_line() {
        let doc = Document::new(vec![
            Node::blockquote(vec![
                Node::paragraph(vec![text("a\nb")]),
                Node::paragraph(vec![text("c")]),
            ]),
            Node::new(
                NodeKind::Blockquote { multiline: true },
                vec![Node::paragraph(vec![text("multi")])],
            ),
        ]);
        assert_eq!(regenerate(&doc), "> a\n> b\n>\n> c\n\n>>>\nmulti\n>>>");
    }

    #[test]
    fn headings_and_code_blocks() {
        let setext = Node::new(NodeKind::Heading { level: 2, setext: true }, vec![text("Hi")]);
        let tilde = Node::new(
            NodeKind::CodeBlock {
                language: Some("js".into()),
                lang_params: Some("run".into()),
                fence: Some(CodeFence { marker: '~', length: 4 }),
            },
            vec![text("let a;")],
        );
        let indented = Node::new(
            NodeKind::CodeBlock {
                language: None,
                lang_params: None,
                fence: None,
            },
            vec![text("x\n\ny")],
        );
        let doc = Document::new(vec![
            Node::heading(3, vec![text("Three")]),
            setext,
            tilde,
            indented,
        ]);
        assert_eq!(
            regenerate(&doc),
            "### Three\n\nHi\n---\n\n~~~~js:run\nlet a;\n~~~~\n\n    x\n\n    y"
        );
    }

    #[test]
    fn fences_outgrow_their_content() {
        let doc = Document::new(vec![Node::code_block(None, "```\ninner\n```")]);
        assert_eq!(regenerate(&doc), "````\n```\ninner\n```\n````");
    }

    #[test]
    fn simple_tables_use_pipes() {
        let cell = |kind: fn(CellAttrs) -> NodeKind, align, content: Vec<Node>| {
            Node::new(
                kind(CellAttrs {
                    align,
                    ..CellAttrs::default()
                }),
                vec![Node::paragraph(content)],
            )
        };
        let doc = Document::new(vec![Node::new(
            NodeKind::Table,
            vec![
                Node::new(
                    NodeKind::TableRow,
                    vec![
                        cell(NodeKind::TableHeader, Some(Alignment::Center), vec![text("Name")]),
                        cell(NodeKind::TableHeader, None, vec![text("V")]),
                    ],
                ),
                Node::new(
                    NodeKind::TableRow,
                    vec![
                        cell(NodeKind::TableCell, Some(Alignment::Center), vec![text("a|b")]),
                        cell(
                            NodeKind::TableCell,
                            None,
                            vec![text("1"), Node::hard_break(), text("2")],
                        ),
                    ],
                ),
            ],
        )]);
        assert_eq!(
            regenerate(&doc),
            "| Name | V |\n|:----:|---|\n| a\\|b | 1<br>2 |"
        );
    }

    #[test]
    fn complex_tables_fall_back_to_html() {
        let doc = Document::new(vec![Node::new(
            NodeKind::Table,
            vec![Node::new(
                NodeKind::TableRow,
                vec![
                    Node::new(
                        NodeKind::TableCell(CellAttrs {
                            colspan: 2,
                            ..CellAttrs::default()
                        }),
                        vec![Node::paragraph(vec![text("wide")])],
                    ),
                    Node::new(
                        NodeKind::TableCell(CellAttrs::default()),
                        vec![Node::bullet_list(vec![Node::list_item(vec![Node::paragraph(
                            vec![text("item")],
                        )])])],
                    ),
                ],
            )],
        )]);
        assert_eq!(
            regenerate(&doc),
            "<table>\n<tr>\n<td colspan=\"2\">wide</td>\n<td>\n\n* item\n\n</td>\n</tr>\n</table>"
        );
    }

    #[test]
    fn html_elements_wrap_text_or_blocks() {
        let doc = Document::new(vec![
            Node::new(
                NodeKind::HtmlElement { tag: HtmlTag::Div },
                vec![Node::paragraph(vec![text("plain")])],
            ),
            Node::new(
                NodeKind::HtmlElement { tag: HtmlTag::Div },
                vec![Node::paragraph(vec![text("bold").with_marks(vec![Mark::bold()])])],
            ),
        ]);
        assert_eq!(regenerate(&doc), "<div>plain</div>\n\n<div>\n\n**bold**\n\n</div>");
    }

    #[test]
    fn definitions_are_written_back() {
        let footnote = Node::new(
            NodeKind::FootnoteDefinition {
                identifier: "note".into(),
                label: "note".into(),
            },
            vec![Node::paragraph(vec![text("One")]), Node::paragraph(vec![text("Two")])],
        );
        let reference = Node::leaf(NodeKind::ReferenceDefinition {
            identifier: "id".into(),
            url: "https://x.y".into(),
            title: Some("T".into()),
        });
        let doc = Document::new(vec![footnote, reference]);
        assert_eq!(regenerate(&doc), "[^note]: One\n\n    Two\n\n[id]: https://x.y \"T\"");
    }

    #[test]
    fn pristine_reference_definitions_are_appended() {
        let mut pristine = Document::new(vec![Node::paragraph(vec![text("body")])]);
        pristine.attrs.reference_definitions = Some("[a]: /a\n[b]: /b\n".into());
        let out = serialize(&pristine, Some(&pristine), &SerializerOptions::default()).unwrap();
        assert_eq!(out, "body\n\n[a]: /a\n[b]: /b");
    }

    #[test]
    fn inline_nodes_at_block_level_are_errors() {
        let doc = Document::new(vec![text("loose")]);
        assert!(matches!(
            serialize(&doc, None, &SerializerOptions::default()),
            Err(FormatError::SerializationError(_))
        ));
    }

    #[test]
    fn moved_nodes_drop_original_indentation() {
        let pristine = deserialize("> quoted\n> lines").unwrap();
        let paragraph = pristine.content[0].content[0].clone();
        let edited = Document::new(vec![paragraph]);
        let out = serialize(&edited, Some(&pristine), &SerializerOptions::default()).unwrap();
        assert_eq!(out, "quoted\nlines");
    }

    #[test]
    fn synthesized_sources_never_pass_through() {
        let mut doc = deserialize("*keep*").unwrap();
        doc.content[0].source = SourceMap::Synthesized;
        doc.content[0].content[0].marks[0].source = SourceMap::Synthesized;
        assert_eq!(serialize(&doc, None, &SerializerOptions::default()).unwrap(), "_keep_");
    }
}
