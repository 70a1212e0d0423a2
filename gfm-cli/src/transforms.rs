//! Inspect transforms
//!
//! Each transform is a stage + format combination (e.g. "doc-treeviz", "doc-json").
//! The only stage is `doc`, the parsed document tree; the format picks how the
//! tree is shown:
//!
//! - `doc-treeviz`: Tree visualization with Unicode icons (default)
//! - `doc-json`: Canonical JSON, source maps included
//! - `doc-html`: The HTML the editor would render
//!
//! ## Extra Parameters
//!
//! - `ast-full`: list inline nodes with their marks
//! - `show-source`: append source map keys and byte ranges to tree lines
//!
//! Example: `gfm inspect file.md doc-treeviz --extra-ast-full`

use gfm_babel::formats::html::serialize_to_html;
use gfm_babel::formats::treeviz::to_treeviz_str_with_params;
use gfm_babel::{MarkdownParser, ParserOptions};
use std::collections::HashMap;

/// All available inspect transforms
pub const AVAILABLE_TRANSFORMS: &[&str] = &["doc-treeviz", "doc-json", "doc-html"];

pub const DEFAULT_TRANSFORM: &str = "doc-treeviz";

/// Execute a named transform on Markdown source
///
/// Parameters meant for another transform are ignored.
pub fn execute_transform(
    source: &str,
    transform_name: &str,
    parser: &ParserOptions,
    extra_params: &HashMap<String, String>,
) -> Result<String, String> {
    let doc = MarkdownParser::new(parser.clone())
        .parse(source)
        .map_err(|e| format!("Transform failed: {e}"))?;

    match transform_name {
        "doc-treeviz" => Ok(to_treeviz_str_with_params(&doc, extra_params)),
        "doc-json" => serde_json::to_string_pretty(&doc.to_json())
            .map_err(|e| format!("JSON serialization failed: {e}")),
        "doc-html" => serialize_to_html(&doc).map_err(|e| format!("Transform failed: {e}")),
        _ => Err(format!("Unknown transform: {transform_name}")),
    }
}
