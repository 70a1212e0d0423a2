//! Frontmatter tests: YAML, TOML and JSON dialects

use crate::common::{map_text, parse, roundtrip, write};
use gfm_babel::model::FrontmatterLanguage;
use gfm_babel::NodeKind;

#[test]
fn test_dialects_are_detected_by_delimiter() {
    let cases = [
        ("---\ntitle: x\n---\n\nBody", FrontmatterLanguage::Yaml, "title: x"),
        ("+++\ntitle = \"x\"\n+++\n\nBody", FrontmatterLanguage::Toml, "title = \"x\""),
        (";;;\n{\"title\": \"x\"}\n;;;\n\nBody", FrontmatterLanguage::Json, "{\"title\": \"x\"}"),
    ];
    for (source, language, body) in cases {
        let doc = parse(source);
        assert_eq!(doc.content[0].kind, NodeKind::Frontmatter { language }, "{source:?}");
        assert_eq!(doc.content[0].text_content(), body);
        assert_eq!(doc.content[1].text_content(), "Body");
        assert_eq!(roundtrip(source), source);
    }
}

#[test]
fn test_frontmatter_only_at_the_start() {
    let doc = parse("Intro\n\n---\ntitle: x\n---\n");
    assert!(doc
        .content
        .iter()
        .all(|node| !matches!(node.kind, NodeKind::Frontmatter { .. })));
}

#[test]
fn test_empty_frontmatter() {
    let doc = parse("---\n---\n\nBody\n");
    assert_eq!(
        doc.content[0].kind,
        NodeKind::Frontmatter {
            language: FrontmatterLanguage::Yaml
        }
    );
    assert!(doc.content[0].content.is_empty());
}

#[test]
fn test_edited_frontmatter_is_rewritten() {
    let pristine = parse("+++\ntitle = \"x\"\n+++\n\nBody\n");
    let mut edited = pristine.clone();
    map_text(&mut edited.content[0].content, &|_| "title = \"y\"".to_string());
    assert_eq!(write(&edited, &pristine), "+++\ntitle = \"y\"\n+++\n\nBody");
}
