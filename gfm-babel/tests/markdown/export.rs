//! Export tests for Markdown format (edited document tree → Markdown)
//!
//! Every test parses a pristine document, edits a copy of the tree and
//! checks that only the edited part of the output changed.

use crate::common::{fixture, map_text, parse, write};
use gfm_babel::{Document, Node};

#[test]
fn test_edit_keeps_the_rest_of_the_file() {
    let source = fixture("kitchensink.md");
    let pristine = parse(&source);
    let mut edited = pristine.clone();
    let heading = edited
        .content
        .iter_mut()
        .find(|node| node.type_name() == "heading")
        .expect("heading");
    map_text(&mut heading.content, &|text| text.to_uppercase());

    let expected = source
        .replacen("# Kitchen sink", "# KITCHEN SINK", 1)
        .trim_end()
        .to_string();
    assert_eq!(write(&edited, &pristine), expected);
}

#[test]
fn test_inserted_blocks_use_default_spacing() {
    let pristine = parse("first\n\n\n\nlast\n");
    let mut edited = pristine.clone();
    edited
        .content
        .insert(1, Node::paragraph(vec![Node::text("middle")]));
    assert_eq!(write(&edited, &pristine), "first\n\nmiddle\n\nlast");
}

#[test]
fn test_removed_blocks_close_the_gap() {
    let pristine = parse("a\n\n\n\nb\n\nc\n");
    let mut edited = pristine.clone();
    edited.content.remove(1);
    assert_eq!(write(&edited, &pristine), "a\n\nc");
}

#[test]
fn test_reordered_list_items_keep_their_text() {
    let pristine = parse("- one\n- **two**\n");
    let mut edited = pristine.clone();
    edited.content[0].content.swap(0, 1);
    assert_eq!(write(&edited, &pristine), "- **two**\n- one");
}

#[test]
fn test_edited_link_text_keeps_the_destination() {
    let pristine = parse("Read [the docs](https://docs.gitlab.com \"Docs\") now\n");
    let mut edited = pristine.clone();
    map_text(&mut edited.content, &|text| text.to_uppercase());
    assert_eq!(
        write(&edited, &pristine),
        "READ [THE DOCS](https://docs.gitlab.com \"Docs\") NOW"
    );
}

#[test]
fn test_edited_reference_link_keeps_its_label() {
    let pristine = parse("[GitLab][gitlab-url] rocks\n\n[gitlab-url]: https://gitlab.com\n");
    let mut edited = pristine.clone();
    map_text(&mut edited.content[0].content, &|text| text.replace("GitLab", "GitLab.com"));
    assert_eq!(
        write(&edited, &pristine),
        "[GitLab.com][gitlab-url] rocks\n\n[gitlab-url]: https://gitlab.com"
    );
}

#[test]
fn test_edited_table_cell_regenerates_the_table() {
    let pristine = parse("Intro\n\n| a | b |\n|:--|--:|\n| 1 | 2 |\n");
    let mut edited = pristine.clone();
    let cell = &mut edited.content[1].content[1].content[0];
    map_text(&mut cell.content, &|_| "one".to_string());
    assert_eq!(
        write(&edited, &pristine),
        "Intro\n\n| a | b |\n|:--|--:|\n| one | 2 |"
    );
}

#[test]
fn test_nested_edit_inside_blockquote() {
    let pristine = parse("> keep\n>\n> - item\n");
    let mut edited = pristine.clone();
    let list = &mut edited.content[0].content[1];
    map_text(&mut list.content, &|_| "changed".to_string());
    assert_eq!(write(&edited, &pristine), "> keep\n>\n> - changed");
}

#[test]
fn test_document_built_from_scratch() {
    let doc = Document::new(vec![
        Node::heading(2, vec![Node::text("Notes")]),
        Node::bullet_list(vec![
            Node::list_item(vec![Node::paragraph(vec![Node::text("first")])]),
            Node::list_item(vec![Node::paragraph(vec![Node::text("second")])]),
        ]),
        Node::code_block(Some("rust"), "fn main() {}"),
    ]);
    assert_eq!(
        gfm_babel::serialize(&doc, None).unwrap(),
        "## Notes\n\n* first\n* second\n\n```rust\nfn main() {}\n```"
    );
}
