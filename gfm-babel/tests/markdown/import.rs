//! Import tests for Markdown format (Markdown → document tree)
//!
//! These tests verify that Markdown documents are correctly converted by
//! checking the resulting tree structure and source maps.

use crate::common::{fixture, parse, roundtrip};
use gfm_babel::formats::treeviz::to_treeviz_str;
use gfm_babel::model::{LinkAttrs, MediaAttrs};
use gfm_babel::{MarkKind, Node, NodeKind};
use insta::assert_snapshot;

fn types(nodes: &[Node]) -> Vec<&'static str> {
    nodes.iter().map(Node::type_name).collect()
}

#[test]
fn test_block_structure() {
    let doc = parse("# Title\n\n> quote\n\n1. one\n2. two\n\n---\n");
    assert_snapshot!(to_treeviz_str(&doc), @r"
    ⧉ Document (4 blocks)
    ├─ § h1 Title
    ├─ ❝ quote
    │ └─ ¶ quote
    ├─ ☰ 2 items
    │ ├─ • item
    │ │ └─ ¶ one
    │ └─ • item
    │   └─ ¶ two
    └─ ⎯ rule
    ");
}

#[test]
fn test_marks_are_ordered_outermost_first() {
    let doc = parse("Some **bold _and italic_** text");
    let paragraph = &doc.content[0];
    let nested = paragraph
        .content
        .iter()
        .find(|node| node.as_text() == Some("and italic"))
        .expect("italic text");
    let kinds: Vec<_> = nested.marks.iter().map(|m| m.kind.type_name()).collect();
    assert_eq!(kinds, vec!["bold", "italic"]);
    assert_eq!(nested.marks[0].source.markdown(), Some("**bold _and italic_**"));
    assert_eq!(nested.marks[1].source.markdown(), Some("_and italic_"));
}

#[test]
fn test_reference_image() {
    let doc = parse("![logo][img]\n\n[img]: /logo.png \"Logo\"\n");
    assert_eq!(types(&doc.content), vec!["paragraph", "referenceDefinition"]);
    assert_eq!(
        doc.content[0].content[0].kind,
        NodeKind::Image(MediaAttrs {
            src: Some("/logo.png".into()),
            canonical_src: Some("img".into()),
            alt: Some("logo".into()),
            title: Some("Logo".into()),
            is_reference: true,
            width: None,
            height: None,
        })
    );
}

#[test]
fn test_bare_and_angle_autolinks() {
    let doc = parse("Visit https://gitlab.com or <https://docs.gitlab.com>");
    let links: Vec<_> = doc.content[0]
        .content
        .iter()
        .filter_map(|node| match node.marks.first().map(|m| &m.kind) {
            Some(MarkKind::Link(attrs)) => Some((attrs.clone(), node.marks[0].source.markdown())),
            _ => None,
        })
        .collect();
    assert_eq!(links.len(), 2);
    assert_eq!(links[0].0.href.as_deref(), Some("https://gitlab.com"));
    assert_eq!(links[0].0.canonical_src.as_deref(), Some("https://gitlab.com"));
    assert_eq!(links[1].1, Some("<https://docs.gitlab.com>"));
}

#[test]
fn test_unsafe_link_targets_are_removed() {
    let doc = parse("[x](vbscript:msgbox)");
    let mark = &doc.content[0].content[0].marks[0];
    assert_eq!(
        mark.kind,
        MarkKind::Link(LinkAttrs {
            href: None,
            canonical_src: None,
            title: None,
            is_reference: false,
        })
    );
    assert!(!mark.source.is_recovered());
    assert!(!doc.content[0].source.is_recovered());
}

#[test]
fn test_unsafe_targets_are_never_written_back() {
    let sources = [
        "[x](javascript:alert(1))",
        "![i](javascript:alert(1))",
        "[x][r]\n\n[r]: javascript:alert(1)",
        "a <a href=\"javascript:alert(1)\">b</a> c",
        "<p><a href=\"javascript:alert(1)\">x</a></p>",
    ];
    for source in sources {
        let doc = parse(source);
        let written = roundtrip(source);
        assert!(!written.contains("javascript"), "{source:?} gave {written:?}");
        let json = serde_json::to_string(&doc.to_json()).unwrap();
        assert!(!json.contains("javascript"), "{source:?} gave {json}");
    }
}

#[test]
fn test_unsafe_reference_definitions_are_dropped() {
    let doc = parse("[x][r]\n\n[r]: javascript:alert(1)\n");
    assert_eq!(types(&doc.content), vec!["paragraph"]);
}

#[test]
fn test_raw_html_blocks_are_sanitized() {
    let doc = parse("<script>alert(1)</script>\n\nafter\n");
    assert_eq!(types(&doc.content), vec!["paragraph", "paragraph"]);
    assert!(doc.content[0].content.is_empty());
    assert!(!doc.content[0].source.is_recovered());
    assert_eq!(doc.content[1].text_content(), "after");
}

#[test]
fn test_details_wraps_the_blocks_up_to_its_end_tag() {
    let source = "<details>\n<summary>s</summary>\n\nbody\n\n</details>\n\nafter";
    let doc = parse(source);
    assert_eq!(types(&doc.content), vec!["details", "paragraph"]);
    let details = &doc.content[0];
    assert_eq!(types(&details.content), vec!["summary", "paragraph"]);
    assert_eq!(details.content[0].text_content(), "s");
    assert_eq!(details.content[1].text_content(), "body");
    assert_eq!(
        details.source.markdown(),
        Some("<details>\n<summary>s</summary>\n\nbody\n\n</details>")
    );
    assert_eq!(doc.content[1].text_content(), "after");
}

#[test]
fn test_multiline_blockquote() {
    let doc = parse(">>>\nquoted\n\nparagraphs\n>>>\n");
    assert_eq!(doc.content[0].kind, NodeKind::Blockquote { multiline: true });
    assert_eq!(types(&doc.content[0].content), vec!["paragraph", "paragraph"]);
}

#[test]
fn test_kitchensink_blocks() {
    let doc = parse(&fixture("kitchensink.md"));
    assert_eq!(
        types(&doc.content),
        vec![
            "frontmatter",
            "heading",
            "paragraph",
            "bulletList",
            "blockquote",
            "orderedList",
            "taskList",
            "paragraph",
            "table",
            "codeBlock",
            "diagram",
            "div",
            "horizontalRule",
            "tableOfContents",
            "footnoteDefinition",
            "referenceDefinition",
        ]
    );
    assert!(doc.validate().is_ok());
}
