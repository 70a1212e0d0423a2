//! HTML format tests
//!
//! Markdown is parsed and rendered through the registry, the way the cli
//! converts files.

use gfm_babel::formats::html::{serialize_to_html, serialize_to_html_with_options, HtmlOptions};
use gfm_babel::{deserialize, FormatRegistry};
use std::collections::HashMap;

fn markdown_to_html(markdown: &str) -> String {
    FormatRegistry::default()
        .convert(markdown, "markdown", "html", &HashMap::new())
        .expect("Should convert to HTML")
}

#[test]
fn test_document_outline() {
    let html = markdown_to_html("# Release notes\n\nFixed *three* bugs.\n\n1. one\n2. two\n");
    assert_eq!(
        html,
        "<h1 id=\"release-notes\">Release notes</h1>\
         <p>Fixed <em>three</em> bugs.</p>\
         <ol><li><p>one</p></li><li><p>two</p></li></ol>"
    );
}

#[test]
fn test_ordered_list_start() {
    let html = markdown_to_html("3. three\n4. four\n");
    assert!(html.starts_with("<ol start=\"3\">"));
}

#[test]
fn test_unsafe_content_never_renders() {
    let html = markdown_to_html(
        "<script>alert(1)</script>\n\n[click](javascript:alert(1))\n\n<img src=\"x\" onerror=\"alert(1)\">\n",
    );
    assert!(!html.contains("<script"));
    assert!(!html.contains("javascript:"));
    assert!(!html.contains("onerror"));
}

#[test]
fn test_footnotes_link_to_their_definition() {
    let html = markdown_to_html("Text[^note]\n\n[^note]: Explained\n");
    assert!(html.contains("<sup"));
    assert!(html.contains("href=\"#fn-note\""));
    assert!(html.contains("id=\"fn-note\""));
}

#[test]
fn test_media_elements() {
    let html = markdown_to_html("![logo](/logo.png) ![talk](/talk.mp4)\n");
    assert!(html.contains("<img"));
    assert!(html.contains("src=\"/logo.png\""));
    assert!(html.contains("<video"));
    assert!(html.contains("controls"));
}

#[test]
fn test_reference_definitions_are_not_rendered() {
    let html = markdown_to_html("[GitLab][gl]\n\n[gl]: https://gitlab.com\n");
    assert!(html.contains("href=\"https://gitlab.com\""));
    assert!(!html.contains("[gl]"));
}

#[test]
fn test_standalone_page() {
    let doc = deserialize("# Page\n\nBody\n").unwrap();
    let fragment = serialize_to_html(&doc).unwrap();
    let page = serialize_to_html_with_options(&doc, &HtmlOptions::standalone()).unwrap();
    assert!(page.starts_with("<!DOCTYPE html>"));
    assert!(page.contains(&fragment));
    assert!(page.contains("<title>Page</title>"));
}

#[test]
fn test_unknown_parameters_are_rejected() {
    let mut options = HashMap::new();
    options.insert("theme".to_string(), "dark".to_string());
    assert!(FormatRegistry::default()
        .convert("x", "markdown", "html", &options)
        .is_err());
}
