//! Definitions comrak keeps out of its tree
//!
//! comrak resolves link reference definitions and drops them, and it drops
//! footnote definitions that nothing references. Both are recovered by
//! scanning the input lines no block covers.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

use super::source::SourceText;

static REFERENCE_DEFINITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^ {0,3}\[((?:[^\[\]\\]|\\.)+)\]:[ \t]*(<[^<>\n]*>|\S+)(?:[ \t]+("(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|\((?:[^()\\]|\\.)*\)))?[ \t]*$"#,
    )
    .expect("Invalid reference definition regex")
});

static FOOTNOTE_DEFINITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^ {0,3}\[\^([^\]\s]+)\]:[ \t]*").expect("Invalid footnote definition regex")
});

/// A definition found between blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Definition {
    Reference {
        label: String,
        url: String,
        title: Option<String>,
        range: Range<usize>,
    },
    Footnote {
        label: String,
        /// Definition text after `[^label]:`, continuation lines included
        body: Range<usize>,
        range: Range<usize>,
    },
}

impl Definition {
    pub fn range(&self) -> Range<usize> {
        match self {
            Definition::Reference { range, .. } | Definition::Footnote { range, .. } => {
                range.clone()
            }
        }
    }
}

/// Find the definitions on the lines of `gap`.
pub fn scan_gap(source: &SourceText, gap: Range<usize>) -> Vec<Definition> {
    let lines = source.lines_in(gap);
    let mut definitions = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line_range = lines[i].clone();
        let line = source.slice(line_range.clone()).unwrap_or("");
        i += 1;

        if let Some(caps) = FOOTNOTE_DEFINITION.captures(line) {
            let (Some(label), Some(head)) = (caps.get(1), caps.get(0)) else {
                continue;
            };
            let mut end = line_range.end;
            while let Some(next) = lines.get(i) {
                let text = source.slice(next.clone()).unwrap_or("");
                if text.trim().is_empty() || is_definition(text) {
                    break;
                }
                end = next.end;
                i += 1;
            }
            let body_start = line_range.start + head.end();
            definitions.push(Definition::Footnote {
                label: label.as_str().to_string(),
                body: body_start..end.max(body_start),
                range: line_range.start..end,
            });
            continue;
        }

        if let Some(definition) = parse_reference_definition(line, line_range.clone()) {
            definitions.push(definition);
        } else if !line.trim().is_empty() {
            tracing::debug!(line, "uncovered line is not a definition");
        }
    }
    definitions
}

fn is_definition(line: &str) -> bool {
    FOOTNOTE_DEFINITION.is_match(line) || REFERENCE_DEFINITION.is_match(line)
}

fn parse_reference_definition(line: &str, range: Range<usize>) -> Option<Definition> {
    let caps = REFERENCE_DEFINITION.captures(line)?;
    let label = caps.get(1)?.as_str();
    if label.starts_with('^') || label.trim().is_empty() {
        return None;
    }
    let destination = caps.get(2)?.as_str();
    let url = destination
        .strip_prefix('<')
        .and_then(|d| d.strip_suffix('>'))
        .unwrap_or(destination);
    let title = caps.get(3).map(|m| {
        let quoted = m.as_str();
        quoted[1..quoted.len() - 1].to_string()
    });
    let start = range.start + (line.len() - line.trim_start().len());
    Some(Definition::Reference {
        label: label.to_string(),
        url: url.to_string(),
        title,
        range: start..range.end - (line.len() - line.trim_end().len()),
    })
}

/// Identifier used to pair footnote references with definitions
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
