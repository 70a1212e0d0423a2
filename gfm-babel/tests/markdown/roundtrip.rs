//! Round trip tests: unchanged documents come back byte for byte

use crate::common::{fixture, map_text, parse, roundtrip, write};
use gfm_babel::{Document, Node};
use proptest::prelude::*;

#[test]
fn test_kitchensink_is_unchanged() {
    let source = fixture("kitchensink.md");
    assert_eq!(roundtrip(&source), source.trim_end());
}

#[test]
fn test_unusual_spacing_survives() {
    let sources = [
        "Title\n=====\n\n\n\nText   with   spaces",
        "*  loose\n\n*  items",
        "    indented code\n\nafter",
        "para\n\n\tcode",
        "x\n\n (",
        "> quote\n> \n\nafter",
        "Line with two spaces  \nand a backslash\\\nbreak",
        ">>>\nmultiline\n>>>",
        "<details>\n<summary>s</summary>\n\nbody\n\n</details>",
        "Changes: {+added+} and [-gone-], <mark>lit</mark>",
    ];
    for source in sources {
        assert_eq!(roundtrip(source), source, "{source:?}");
    }
}

#[test]
fn test_json_round_trip_keeps_passthrough() {
    let source = "Some __bold__ and [a link][ref]\n\n[ref]: https://gitlab.com";
    let pristine = parse(source);
    let restored = Document::from_json(&pristine.to_json()).unwrap();
    assert_eq!(gfm_babel::serialize(&restored, Some(&pristine)).unwrap(), source);
}

#[test]
fn test_indented_code_stays_code() {
    let doc = parse("para\n\n\tcode");
    let kinds: Vec<_> = doc.content.iter().map(|node| node.type_name()).collect();
    assert_eq!(kinds, vec!["paragraph", "codeBlock"]);
    let reparsed = parse(&roundtrip("para\n\n\tcode"));
    assert_eq!(reparsed.content[1].type_name(), "codeBlock");
    assert_eq!(reparsed.content[1].text_content(), "code");
}

#[test]
fn test_edited_details_keep_their_structure() {
    let pristine = parse("<details>\n<summary>s</summary>\n\nbody\n\n</details>");
    let mut edited = pristine.clone();
    map_text(&mut edited.content[0].content[1].content, &|text| text.replace("body", "new body"));
    let written = write(&edited, &pristine);
    let reparsed = parse(&written);
    assert_eq!(reparsed.content.len(), 1, "{written:?}");
    let details = &reparsed.content[0];
    assert_eq!(details.type_name(), "details");
    assert_eq!(details.content[0].text_content(), "s");
    assert_eq!(details.content[1].text_content(), "new body");
}

#[test]
fn test_html_looking_text_stays_text() {
    let texts = [
        "a <script>x</script> b",
        "&copy; sign",
        "1 < 2 & 3 > 2",
        "<!-- not a comment -->",
    ];
    for text in texts {
        let doc = parse(&plain_regenerate(text));
        assert_eq!(doc.content[0].text_content(), text, "{text:?}");
    }
}

fn plain_regenerate(text: &str) -> String {
    let doc = Document::new(vec![Node::paragraph(vec![Node::text(text)])]);
    gfm_babel::serialize(&doc, None).unwrap()
}

proptest! {
    #[test]
    fn prop_plain_paragraphs_pass_through(
        paragraphs in prop::collection::vec("[a-z]{1,8}( [a-z]{1,8}){0,6}", 1..5)
    ) {
        let source = paragraphs.join("\n\n");
        prop_assert_eq!(roundtrip(&source), source);
    }

    #[test]
    fn prop_escaped_text_reads_back(
        text in "[a-zA-Z0-9*_#.!?~<>&;{}+\\[\\]-]{1,10}( [a-zA-Z0-9*_#.!?~<>&;{}+\\[\\]-]{1,10}){0,4}"
    ) {
        let written = plain_regenerate(&text);
        let doc = parse(&written);
        prop_assert_eq!(doc.content.len(), 1);
        prop_assert_eq!(doc.content[0].text_content(), text);
    }
}
