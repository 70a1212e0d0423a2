//! Source spans of raw HTML tags
//!
//! html5ever builds a clean tree but forgets where each element came from.
//! The scanner walks the same fragment lexically and records, for every
//! start tag in document order, the byte range of the whole element.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

use super::url::decode_character_references;

static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)<!--.*?-->|<!\[CDATA\[.*?\]\]>|<[!?][^>]*>|<(/?)([A-Za-z][A-Za-z0-9-]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#,
    )
    .expect("Invalid tag regex")
});

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("Invalid attribute regex")
});

/// Elements that never have a closing tag
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose content is raw text, never markup
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title", "xmp"];

/// A lexically scanned start or end tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub closing: bool,
    pub self_closing: bool,
    pub attrs: Vec<(String, String)>,
    pub range: Range<usize>,
}

impl Tag {
    pub fn is_void(&self) -> bool {
        self.self_closing || VOID_ELEMENTS.contains(&self.name.as_str())
    }
}

/// Parse `raw` if it is exactly one start or end tag.
pub fn parse_tag(raw: &str) -> Option<Tag> {
    leading_tag(raw).filter(|tag| raw[tag.range.end..].trim().is_empty())
}

/// The start or end tag `raw` begins with, leading whitespace aside
pub fn leading_tag(raw: &str) -> Option<Tag> {
    let offset = raw.len() - raw.trim_start().len();
    let caps = TAG.captures(&raw[offset..])?;
    let whole = caps.get(0)?;
    if whole.start() != 0 {
        return None;
    }
    let name = caps.get(2)?.as_str().to_ascii_lowercase();
    let rest = caps.get(3).map_or("", |m| m.as_str());
    Some(Tag {
        closing: caps.get(1).is_some_and(|m| !m.as_str().is_empty()),
        self_closing: rest.trim_end().ends_with('/'),
        attrs: parse_attributes(rest),
        name,
        range: offset..offset + whole.end(),
    })
}

/// Whether `html` opens more `name` elements than it closes
pub fn leaves_open(html: &str, name: &str) -> bool {
    let mut depth = 0usize;
    for caps in TAG.captures_iter(html) {
        let Some(tag) = caps.get(2) else { continue };
        if !tag.as_str().eq_ignore_ascii_case(name) {
            continue;
        }
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let self_closing = caps.get(3).is_some_and(|m| m.as_str().trim_end().ends_with('/'));
        if closing {
            depth = depth.saturating_sub(1);
        } else if !self_closing {
            depth += 1;
        }
    }
    depth > 0
}

/// Attributes of a start tag, names lowercased and values decoded
pub fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    ATTRIBUTE
        .captures_iter(raw)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map_or("", |m| m.as_str());
            Some((name, decode_character_references(value)))
        })
        .collect()
}

/// Span of one element in the scanned fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSpan {
    pub name: String,
    /// Start tag through end tag (or the start tag alone for void elements)
    pub outer: Range<usize>,
    /// Between the start and end tag
    pub inner: Range<usize>,
}

/// Scan `html` and return one span per start tag, in document order.
pub fn scan_elements(html: &str) -> Vec<ElementSpan> {
    let mut spans: Vec<ElementSpan> = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let end = html.trim_end().len();
    let mut pos = 0;

    while let Some(caps) = TAG.captures_at(html, pos) {
        let Some(whole) = caps.get(0) else { break };
        pos = whole.end();
        let Some(name) = caps.get(2) else { continue };
        let name = name.as_str().to_ascii_lowercase();
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());

        if closing {
            if let Some(depth) = open.iter().rposition(|&i| spans[i].name == name) {
                for &i in &open[depth + 1..] {
                    spans[i].outer.end = whole.start();
                    spans[i].inner.end = whole.start();
                }
                let i = open[depth];
                spans[i].inner.end = whole.start();
                spans[i].outer.end = whole.end();
                open.truncate(depth);
            }
            continue;
        }

        let attrs = caps.get(3).map_or("", |m| m.as_str());
        let self_closing = attrs.trim_end().ends_with('/');
        let index = spans.len();
        spans.push(ElementSpan {
            name: name.clone(),
            outer: whole.start()..whole.end(),
            inner: whole.end()..whole.end(),
        });

        if self_closing || VOID_ELEMENTS.contains(&name.as_str()) {
            continue;
        }
        if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            let close = format!("</{name}");
            let lower = html[pos..].to_ascii_lowercase();
            match lower.find(&close) {
                Some(found) => {
                    let close_start = pos + found;
                    let close_end = html[close_start..]
                        .find('>')
                        .map_or(html.len(), |gt| close_start + gt + 1);
                    spans[index].inner.end = close_start;
                    spans[index].outer.end = close_end;
                    pos = close_end;
                }
                None => {
                    spans[index].inner.end = end;
                    spans[index].outer.end = end;
                    pos = html.len();
                }
            }
            continue;
        }
        open.push(index);
    }

    for i in open {
        spans[i].inner.end = end.max(spans[i].inner.start);
        spans[i].outer.end = end.max(spans[i].outer.end);
    }
    spans
}
