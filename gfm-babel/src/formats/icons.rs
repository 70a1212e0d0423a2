//! Icon mapping for the tree visualization format
//!
//! Keyed by the canonical type names of nodes and marks.

/// Get the Unicode icon for a node or mark type name
///
/// Returns a single Unicode character that visually represents the type.
pub fn get_icon(type_name: &str) -> &'static str {
    match type_name {
        "doc" => "⧉",
        "paragraph" => "¶",
        "heading" => "§",
        "blockquote" => "❝",
        "bulletList" | "orderedList" | "taskList" => "☰",
        "listItem" => "•",
        "taskItem" => "☐",
        "codeBlock" => "𝒱",
        "diagram" => "◇",
        "table" => "▦",
        "tableRow" => "═",
        "tableHeader" | "tableCell" => "▢",
        "horizontalRule" => "⎯",
        "frontmatter" => "⊤",
        "footnoteDefinition" => "³",
        "footnoteReference" => "†",
        "referenceDefinition" => "≔",
        "tableOfContents" => "#",
        "div" | "pre" | "details" | "summary" | "figure" | "figcaption" | "dl" | "dt" | "dd" => {
            "<>"
        }
        "text" => "◦",
        "hardBreak" => "↵",
        "image" | "audio" | "video" => "▣",
        // Marks
        "bold" => "𝐁",
        "italic" => "𝐼",
        "strike" => "∓",
        "code" => "ƒ",
        "link" => "⊕",
        _ => "○",
    }
}
