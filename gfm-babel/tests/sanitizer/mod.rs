//! Sanitizer tests
//!
//! Whatever the input, no disallowed element and no dangerous URL may reach
//! the document tree.

use gfm_babel::model::KeyGenerator;
use gfm_babel::sanitizer::{sanitize, sanitize_url, FragmentContext};
use gfm_babel::{deserialize, Document, MarkKind, Node, NodeKind};
use proptest::prelude::*;

fn links(nodes: &[Node]) -> Vec<Option<String>> {
    let mut out = Vec::new();
    for node in nodes {
        for mark in &node.marks {
            if let MarkKind::Link(attrs) = &mark.kind {
                out.push(attrs.href.clone());
            }
        }
        if let Some(media) = node.kind.media_attrs() {
            out.push(media.src.clone());
        }
        out.extend(links(&node.content));
    }
    out
}

fn is_dangerous(url: &str) -> bool {
    let normalized: String = url
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    normalized.starts_with("javascript:") || normalized.starts_with("vbscript:")
}

/// `javascript:` spelled with random case, inner whitespace and an encoded colon
fn obfuscated_scheme() -> impl Strategy<Value = String> {
    let letters = "javascript"
        .chars()
        .map(|c| {
            (any::<bool>(), prop::sample::select(vec!["", "", " ", "\t", "\n"])).prop_map(
                move |(upper, gap)| {
                    let c = if upper { c.to_ascii_uppercase() } else { c };
                    format!("{c}{gap}")
                },
            )
        })
        .collect::<Vec<_>>();
    let colon = prop::sample::select(vec![":", "&colon;", "&#58;", "&#x3A;", "&#0058"]);
    let lead = prop::sample::select(vec!["", " ", "\t"]);
    (lead, letters, colon)
        .prop_map(|(lead, letters, colon)| format!("{lead}{}{colon}alert(1)", letters.concat()))
}

proptest! {
    #[test]
    fn prop_obfuscated_schemes_are_rejected(url in obfuscated_scheme()) {
        prop_assert_eq!(sanitize_url(&url), None);
    }

    #[test]
    fn prop_no_dangerous_link_survives_html(url in obfuscated_scheme()) {
        let attr = url.replace('"', "&quot;");
        let html = format!("<a href=\"{attr}\">x</a> <img src=\"{attr}\">");
        let fragment = sanitize(&html, FragmentContext::block(0), &mut KeyGenerator::new());
        for href in links(&fragment.nodes).into_iter().flatten() {
            prop_assert!(!is_dangerous(&href), "{href:?}");
        }
    }

    #[test]
    fn prop_no_dangerous_link_survives_markdown(url in obfuscated_scheme()) {
        let markdown = format!(
            "[x](<{}>)\n\n<a href=\"{}\">y</a>\n",
            url.replace('\n', ""),
            url.replace('"', "")
        );
        let doc = deserialize(&markdown).unwrap();
        for href in links(&doc.content).into_iter().flatten() {
            prop_assert!(!is_dangerous(&href), "{href:?}");
        }
    }
}

#[test]
fn test_safe_urls_are_kept() {
    let urls = [
        "https://gitlab.com",
        "/relative/path",
        "#anchor",
        "mailto:a@b.c",
        "data:image/png;base64,AA",
    ];
    for url in urls {
        assert_eq!(sanitize_url(url).as_deref(), Some(url));
    }
}

#[test]
fn test_disallowed_elements_leave_an_empty_paragraph() {
    for html in [
        "<script>alert(1)</script>",
        "<iframe src=\"https://evil.example\"></iframe>",
        "<style>p { color: red }</style>",
        "<object data=\"x\"></object>",
    ] {
        let fragment = sanitize(html, FragmentContext::block(0), &mut KeyGenerator::new());
        assert_eq!(fragment.nodes, vec![Node::paragraph(vec![])], "{html}");
        assert!(fragment.dropped);
    }
}

#[test]
fn test_event_handlers_are_stripped() {
    let doc = deserialize("<a href=\"/docs\" onclick=\"steal()\" class=\"x\">docs</a>\n").unwrap();
    let text = &doc.content[0].content[0];
    let MarkKind::Link(attrs) = &text.marks[0].kind else {
        panic!("expected a link, got {:?}", text.marks);
    };
    assert_eq!(attrs.href.as_deref(), Some("/docs"));
    assert_eq!(attrs.title, None);
}

#[test]
fn test_allowed_block_html_becomes_nodes() {
    let markdown = "<details>\n<summary>More</summary>\n<p>Hidden <b>text</b></p>\n</details>\n";
    let doc = deserialize(markdown).unwrap();
    let details = &doc.content[0];
    assert_eq!(details.type_name(), "details");
    let names: Vec<_> = details.content.iter().map(Node::type_name).collect();
    assert_eq!(names, vec!["summary", "paragraph"]);
    assert_eq!(details.content[1].text_content(), "Hidden text");
    assert!(doc.validate().is_ok());
}

#[test]
fn test_sanitized_tree_is_valid() {
    let markdown = "<table><tr><td><ul><li>x</li></ul></td></tr></table>\n\n\
                    <blockquote><h2>Q</h2></blockquote>\n";
    let doc: Document = deserialize(markdown).unwrap();
    assert!(doc.validate().is_ok());
    assert!(doc
        .descendants()
        .any(|node| matches!(node.kind, NodeKind::TableCell(_))));
}
