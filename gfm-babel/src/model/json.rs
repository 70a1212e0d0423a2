//! Canonical JSON shape of a document
//!
//! Nodes serialize as `{type, attrs, content}` and text nodes as
//! `{type: "text", text, marks}`. Source-map attributes are spelled
//! `sourceMapKey`, `sourceMarkdown` and `sourceTagName`, with `null` for
//! synthesized nodes. This is the shape snapshot fixtures compare against.

use super::nodes::{
    Alignment, CellAttrs, CodeFence, DiffKind, Document, DocumentAttrs, FrontmatterLanguage,
    HtmlTag, LinkAttrs, Mark, MarkKind, MediaAttrs, Node, NodeKind,
};
use super::source_map::{SourceMap, SourceMapKey, SourceSpan};
use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Serialize, Deserialize)]
struct JsonNode {
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    attrs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    content: Vec<JsonNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    marks: Vec<JsonMark>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonMark {
    #[serde(rename = "type")]
    mark_type: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    attrs: Map<String, Value>,
}

impl Document {
    /// Canonical JSON value of the document
    pub fn to_json(&self) -> Value {
        let mut doc = JsonNode {
            node_type: "doc".to_string(),
            attrs: Map::new(),
            content: self.content.iter().map(node_to_json).collect(),
            text: None,
            marks: Vec::new(),
        };
        if let Some(definitions) = &self.attrs.reference_definitions {
            doc.attrs
                .insert("referenceDefinitions".into(), json!(definitions));
        }
        serde_json::to_value(doc).unwrap_or(Value::Null)
    }

    /// Read a document back from its canonical JSON value
    pub fn from_json(value: &Value) -> Result<Document, ParseError> {
        let doc: JsonNode = serde_json::from_value(value.clone())
            .map_err(|err| ParseError::InvalidJson(err.to_string()))?;
        if doc.node_type != "doc" {
            return Err(ParseError::InvalidJson(format!(
                "expected a doc node, found '{}'",
                doc.node_type
            )));
        }
        let content = doc
            .content
            .iter()
            .map(node_from_json)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Document {
            content,
            attrs: DocumentAttrs {
                reference_definitions: string_attr(&doc.attrs, "referenceDefinitions"),
            },
        })
    }
}

impl Node {
    pub fn to_json(&self) -> Value {
        serde_json::to_value(node_to_json(self)).unwrap_or(Value::Null)
    }
}

fn node_to_json(node: &Node) -> JsonNode {
    let mut attrs = Map::new();
    let mut text = None;
    match &node.kind {
        NodeKind::Text(value) => text = Some(value.clone()),
        NodeKind::Heading { level, setext } => {
            attrs.insert("level".into(), json!(level));
            if *setext {
                attrs.insert("setext".into(), json!(true));
            }
        }
        NodeKind::Blockquote { multiline } => {
            attrs.insert("multiline".into(), json!(multiline));
        }
        NodeKind::BulletList { bullet } => {
            attrs.insert("bullet".into(), json!(bullet.to_string()));
        }
        NodeKind::OrderedList { start, parens } => {
            attrs.insert("start".into(), json!(start));
            attrs.insert("parens".into(), json!(parens));
        }
        NodeKind::TaskList {
            numeric,
            start,
            parens,
            bullet,
        } => {
            attrs.insert("numeric".into(), json!(numeric));
            attrs.insert("start".into(), json!(start));
            attrs.insert("parens".into(), json!(parens));
            attrs.insert("bullet".into(), json!(bullet.to_string()));
        }
        NodeKind::TaskItem { checked } => {
            attrs.insert("checked".into(), json!(checked));
        }
        NodeKind::CodeBlock {
            language,
            lang_params,
            fence,
        } => {
            attrs.insert("language".into(), json!(language));
            attrs.insert("langParams".into(), json!(lang_params));
            if let Some(fence) = fence {
                attrs.insert(
                    "fence".into(),
                    json!(fence.marker.to_string().repeat(fence.length)),
                );
            }
        }
        NodeKind::Diagram { language } => {
            attrs.insert("language".into(), json!(language));
        }
        NodeKind::TableHeader(cell) | NodeKind::TableCell(cell) => {
            attrs.insert("colspan".into(), json!(cell.colspan));
            attrs.insert("rowspan".into(), json!(cell.rowspan));
            attrs.insert("align".into(), json!(cell.align.map(Alignment::as_str)));
        }
        NodeKind::Frontmatter { language } => {
            attrs.insert("language".into(), json!(language.as_str()));
        }
        NodeKind::FootnoteDefinition { identifier, label }
        | NodeKind::FootnoteReference { identifier, label } => {
            attrs.insert("identifier".into(), json!(identifier));
            attrs.insert("label".into(), json!(label));
        }
        NodeKind::ReferenceDefinition {
            identifier,
            url,
            title,
        } => {
            attrs.insert("identifier".into(), json!(identifier));
            attrs.insert("url".into(), json!(url));
            attrs.insert("title".into(), json!(title));
        }
        NodeKind::Image(media) | NodeKind::Audio(media) | NodeKind::Video(media) => {
            attrs.insert("src".into(), json!(media.src));
            attrs.insert("canonicalSrc".into(), json!(media.canonical_src));
            attrs.insert("alt".into(), json!(media.alt));
            attrs.insert("title".into(), json!(media.title));
            attrs.insert("isReference".into(), json!(media.is_reference));
            if let Some(width) = &media.width {
                attrs.insert("width".into(), json!(width));
            }
            if let Some(height) = &media.height {
                attrs.insert("height".into(), json!(height));
            }
        }
        NodeKind::Paragraph
        | NodeKind::ListItem
        | NodeKind::Table
        | NodeKind::TableRow
        | NodeKind::HorizontalRule
        | NodeKind::TableOfContents
        | NodeKind::HtmlElement { .. }
        | NodeKind::HardBreak => {}
    }
    if text.is_none() {
        insert_source_attrs(&mut attrs, &node.source);
    }
    JsonNode {
        node_type: node.type_name().to_string(),
        attrs,
        content: node.content.iter().map(node_to_json).collect(),
        text,
        marks: node.marks.iter().map(mark_to_json).collect(),
    }
}

fn mark_to_json(mark: &Mark) -> JsonMark {
    let mut attrs = Map::new();
    match &mark.kind {
        MarkKind::Link(link) => {
            attrs.insert("href".into(), json!(link.href));
            attrs.insert("canonicalSrc".into(), json!(link.canonical_src));
            attrs.insert("title".into(), json!(link.title));
            attrs.insert("isReference".into(), json!(link.is_reference));
        }
        MarkKind::InlineDiff(diff) => {
            attrs.insert("type".into(), json!(diff.name()));
        }
        _ => {}
    }
    insert_source_attrs(&mut attrs, &mark.source);
    JsonMark {
        mark_type: mark.kind.type_name().to_string(),
        attrs,
    }
}

fn insert_source_attrs(attrs: &mut Map<String, Value>, source: &SourceMap) {
    match source {
        SourceMap::Recovered(span) => {
            attrs.insert("sourceMapKey".into(), json!(span.key.as_str()));
            attrs.insert("sourceMarkdown".into(), json!(span.markdown));
            if let Some(tag) = &span.tag_name {
                attrs.insert("sourceTagName".into(), json!(tag));
            }
        }
        SourceMap::Synthesized => {
            attrs.insert("sourceMapKey".into(), Value::Null);
            attrs.insert("sourceMarkdown".into(), Value::Null);
        }
    }
}

fn source_from_attrs(attrs: &Map<String, Value>) -> SourceMap {
    match (
        string_attr(attrs, "sourceMapKey"),
        string_attr(attrs, "sourceMarkdown"),
    ) {
        (Some(key), Some(markdown)) => SourceMap::Recovered(SourceSpan {
            key: SourceMapKey::new(key),
            markdown,
            tag_name: string_attr(attrs, "sourceTagName"),
            range: None,
            column: 0,
            newlines_before: None,
        }),
        _ => SourceMap::Synthesized,
    }
}

fn string_attr(attrs: &Map<String, Value>, name: &str) -> Option<String> {
    attrs.get(name).and_then(Value::as_str).map(str::to_string)
}

fn u64_attr(attrs: &Map<String, Value>, name: &str) -> Option<u64> {
    attrs.get(name).and_then(Value::as_u64)
}

fn bool_attr(attrs: &Map<String, Value>, name: &str) -> bool {
    attrs.get(name).and_then(Value::as_bool).unwrap_or(false)
}

fn char_attr(attrs: &Map<String, Value>, name: &str, default: char) -> char {
    string_attr(attrs, name)
        .and_then(|value| value.chars().next())
        .unwrap_or(default)
}

fn cell_from_json(attrs: &Map<String, Value>) -> CellAttrs {
    CellAttrs {
        colspan: u64_attr(attrs, "colspan").map_or(1, |v| v as u32),
        rowspan: u64_attr(attrs, "rowspan").map_or(1, |v| v as u32),
        align: string_attr(attrs, "align").and_then(|a| Alignment::from_name(&a)),
    }
}

fn media_from_json(attrs: &Map<String, Value>) -> MediaAttrs {
    MediaAttrs {
        src: string_attr(attrs, "src"),
        canonical_src: string_attr(attrs, "canonicalSrc"),
        alt: string_attr(attrs, "alt"),
        title: string_attr(attrs, "title"),
        is_reference: bool_attr(attrs, "isReference"),
        width: string_attr(attrs, "width"),
        height: string_attr(attrs, "height"),
    }
}

fn node_from_json(json: &JsonNode) -> Result<Node, ParseError> {
    let attrs = &json.attrs;
    let kind = match json.node_type.as_str() {
        "text" => NodeKind::Text(json.text.clone().unwrap_or_default()),
        "paragraph" => NodeKind::Paragraph,
        "heading" => NodeKind::Heading {
            level: u64_attr(attrs, "level").map_or(1, |v| v.clamp(1, 6) as u8),
            setext: bool_attr(attrs, "setext"),
        },
        "blockquote" => NodeKind::Blockquote {
            multiline: bool_attr(attrs, "multiline"),
        },
        "bulletList" => NodeKind::BulletList {
            bullet: char_attr(attrs, "bullet", '*'),
        },
        "orderedList" => NodeKind::OrderedList {
            start: u64_attr(attrs, "start").unwrap_or(1),
            parens: bool_attr(attrs, "parens"),
        },
        "listItem" => NodeKind::ListItem,
        "taskList" => NodeKind::TaskList {
            numeric: bool_attr(attrs, "numeric"),
            start: u64_attr(attrs, "start").unwrap_or(1),
            parens: bool_attr(attrs, "parens"),
            bullet: char_attr(attrs, "bullet", '*'),
        },
        "taskItem" => NodeKind::TaskItem {
            checked: bool_attr(attrs, "checked"),
        },
        "codeBlock" => NodeKind::CodeBlock {
            language: string_attr(attrs, "language"),
            lang_params: string_attr(attrs, "langParams"),
            fence: string_attr(attrs, "fence").and_then(|fence| {
                fence.chars().next().map(|marker| CodeFence {
                    marker,
                    length: fence.chars().count(),
                })
            }),
        },
        "diagram" => NodeKind::Diagram {
            language: string_attr(attrs, "language").unwrap_or_default(),
        },
        "table" => NodeKind::Table,
        "tableRow" => NodeKind::TableRow,
        "tableHeader" => NodeKind::TableHeader(cell_from_json(attrs)),
        "tableCell" => NodeKind::TableCell(cell_from_json(attrs)),
        "horizontalRule" => NodeKind::HorizontalRule,
        "frontmatter" => NodeKind::Frontmatter {
            language: string_attr(attrs, "language")
                .and_then(|name| FrontmatterLanguage::from_name(&name))
                .unwrap_or(FrontmatterLanguage::Yaml),
        },
        "footnoteDefinition" => NodeKind::FootnoteDefinition {
            identifier: string_attr(attrs, "identifier").unwrap_or_default(),
            label: string_attr(attrs, "label").unwrap_or_default(),
        },
        "footnoteReference" => NodeKind::FootnoteReference {
            identifier: string_attr(attrs, "identifier").unwrap_or_default(),
            label: string_attr(attrs, "label").unwrap_or_default(),
        },
        "referenceDefinition" => NodeKind::ReferenceDefinition {
            identifier: string_attr(attrs, "identifier").unwrap_or_default(),
            url: string_attr(attrs, "url").unwrap_or_default(),
            title: string_attr(attrs, "title"),
        },
        "tableOfContents" => NodeKind::TableOfContents,
        "hardBreak" => NodeKind::HardBreak,
        "image" => NodeKind::Image(media_from_json(attrs)),
        "audio" => NodeKind::Audio(media_from_json(attrs)),
        "video" => NodeKind::Video(media_from_json(attrs)),
        other => match HtmlTag::from_name(other) {
            Some(tag) => NodeKind::HtmlElement { tag },
            None => {
                return Err(ParseError::InvalidJson(format!(
                    "unknown node type '{other}'"
                )))
            }
        },
    };
    let content = json
        .content
        .iter()
        .map(node_from_json)
        .collect::<Result<Vec<_>, _>>()?;
    let marks = json
        .marks
        .iter()
        .map(mark_from_json)
        .collect::<Result<Vec<_>, _>>()?;
    let source = if matches!(kind, NodeKind::Text(_)) {
        SourceMap::Synthesized
    } else {
        source_from_attrs(attrs)
    };
    Ok(Node {
        kind,
        content,
        marks,
        source,
    })
}

fn mark_from_json(json: &JsonMark) -> Result<Mark, ParseError> {
    let attrs = &json.attrs;
    let kind = match json.mark_type.as_str() {
        "bold" => MarkKind::Bold,
        "italic" => MarkKind::Italic,
        "strike" => MarkKind::Strike,
        "code" => MarkKind::Code,
        "link" => MarkKind::Link(LinkAttrs {
            href: string_attr(attrs, "href"),
            canonical_src: string_attr(attrs, "canonicalSrc"),
            title: string_attr(attrs, "title"),
            is_reference: bool_attr(attrs, "isReference"),
        }),
        "inlineDiff" => {
            let name = string_attr(attrs, "type").unwrap_or_default();
            let diff = DiffKind::from_name(&name).ok_or_else(|| {
                ParseError::InvalidJson(format!("unknown inline diff type '{name}'"))
            })?;
            MarkKind::InlineDiff(diff)
        }
        "highlight" => MarkKind::Highlight,
        other => {
            return Err(ParseError::InvalidJson(format!(
                "unknown mark type '{other}'"
            )))
        }
    };
    Ok(Mark {
        kind,
        source: source_from_attrs(attrs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_nodes_carry_marks_without_source_attrs() {
        let node = Node::text("bold").with_marks(vec![Mark::bold()]);
        assert_eq!(
            node.to_json(),
            json!({
                "type": "text",
                "text": "bold",
                "marks": [{"type": "bold", "attrs": {"sourceMapKey": null, "sourceMarkdown": null}}]
            })
        );
    }

    #[test]
    fn keys_keep_their_written_order() {
        let heading = Node::heading(2, vec![Node::text("Title")]);
        let json = heading.to_json();
        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["type", "attrs", "content"]);

        let link = Node::text("docs").with_marks(vec![Mark::link("https://docs.gitlab.com")]);
        let json = link.to_json();
        let attrs: Vec<_> = json["marks"][0]["attrs"]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(
            attrs,
            vec!["href", "canonicalSrc", "title", "isReference", "sourceMapKey", "sourceMarkdown"]
        );
    }

    #[test]
    fn table_cell_spans_are_integers() {
        let cell = Node::new(
            NodeKind::TableHeader(CellAttrs {
                colspan: 2,
                rowspan: 5,
                align: None,
            }),
            vec![],
        );
        let json = cell.to_json();
        assert_eq!(json["attrs"]["colspan"], json!(2));
        assert_eq!(json["attrs"]["rowspan"], json!(5));
    }

    #[test]
    fn documents_read_back_from_json() {
        let doc = Document::new(vec![
            Node::heading(2, vec![Node::text("Title")]),
            Node::paragraph(vec![
                Node::text("see "),
                Node::text("docs").with_marks(vec![Mark::link("https://docs.gitlab.com")]),
            ]),
            Node::new(
                NodeKind::HtmlElement { tag: HtmlTag::Div },
                vec![Node::paragraph(vec![Node::text("div")])],
            ),
        ]);
        let restored = Document::from_json(&doc.to_json()).unwrap();
        assert_eq!(restored, doc);
    }

    #[test]
    fn inline_diffs_name_their_side() {
        let node = Node::text("gone")
            .with_marks(vec![Mark::new(MarkKind::InlineDiff(DiffKind::Deletion))]);
        let json = node.to_json();
        assert_eq!(json["marks"][0]["type"], "inlineDiff");
        assert_eq!(json["marks"][0]["attrs"]["type"], "deletion");

        let doc = Document::new(vec![Node::paragraph(vec![
            node,
            Node::text("lit").with_marks(vec![Mark::new(MarkKind::Highlight)]),
        ])]);
        assert_eq!(Document::from_json(&doc.to_json()).unwrap(), doc);

        let value = json!({"type": "doc", "content": [{"type": "paragraph", "content": [{
            "type": "text",
            "text": "x",
            "marks": [{"type": "inlineDiff", "attrs": {"type": "moved"}}]
        }]}]});
        assert!(Document::from_json(&value).is_err());
    }

    #[test]
    fn unknown_types_are_rejected() {
        let value = json!({"type": "doc", "content": [{"type": "marquee"}]});
        assert!(matches!(
            Document::from_json(&value),
            Err(ParseError::InvalidJson(_))
        ));
    }
}
