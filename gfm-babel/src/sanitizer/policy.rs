//! Tag policy
//!
//! One table decides what raw HTML may become: each allowed tag maps to a
//! node or mark target and lists the attributes it keeps, each with a
//! validator. Tags missing from the table are dropped together with their
//! content; attributes missing from a rule are stripped.

use crate::model::{Alignment, HtmlTag};

use super::url::sanitize_url;

/// What an allowed tag turns into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagTarget {
    Paragraph,
    Heading(u8),
    Blockquote,
    BulletList,
    OrderedList,
    ListItem,
    HorizontalRule,
    Table,
    /// `thead`, `tbody` and `tfoot`: rows are lifted into the table
    TableSection,
    TableRow,
    TableHeader,
    TableCell,
    Html(HtmlTag),
    Image,
    Audio,
    Video,
    HardBreak,
    Bold,
    Italic,
    Strike,
    Code,
    Link,
    Highlight,
    /// Kept for its children only
    Transparent,
}

impl TagTarget {
    pub fn is_mark(self) -> bool {
        matches!(
            self,
            TagTarget::Bold
                | TagTarget::Italic
                | TagTarget::Strike
                | TagTarget::Code
                | TagTarget::Link
                | TagTarget::Highlight
        )
    }

    /// Targets that produce inline content
    pub fn is_inline(self) -> bool {
        self.is_mark()
            || matches!(
                self,
                TagTarget::Image
                    | TagTarget::Audio
                    | TagTarget::Video
                    | TagTarget::HardBreak
                    | TagTarget::Transparent
            )
    }
}

/// How an attribute value is validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    Text,
    /// Protocol-checked; a rejected value is kept as `None`
    Url,
    /// Positive integer
    Integer,
    Alignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrRule {
    pub name: &'static str,
    pub kind: AttrKind,
}

const fn attr(name: &'static str, kind: AttrKind) -> AttrRule {
    AttrRule { name, kind }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagRule {
    pub tag: &'static str,
    pub target: TagTarget,
    pub attributes: &'static [AttrRule],
}

const fn rule(tag: &'static str, target: TagTarget, attributes: &'static [AttrRule]) -> TagRule {
    TagRule {
        tag,
        target,
        attributes,
    }
}

const NONE: &[AttrRule] = &[];
const LINK_ATTRS: &[AttrRule] = &[attr("href", AttrKind::Url), attr("title", AttrKind::Text)];
const IMAGE_ATTRS: &[AttrRule] = &[
    attr("src", AttrKind::Url),
    attr("alt", AttrKind::Text),
    attr("title", AttrKind::Text),
    attr("width", AttrKind::Text),
    attr("height", AttrKind::Text),
];
const MEDIA_ATTRS: &[AttrRule] = &[attr("src", AttrKind::Url), attr("title", AttrKind::Text)];
const CELL_ATTRS: &[AttrRule] = &[
    attr("colspan", AttrKind::Integer),
    attr("rowspan", AttrKind::Integer),
    attr("align", AttrKind::Alignment),
];
const LIST_ATTRS: &[AttrRule] = &[attr("start", AttrKind::Integer)];

/// The allow-list
pub static TAG_POLICY: &[TagRule] = &[
    rule("p", TagTarget::Paragraph, NONE),
    rule("h1", TagTarget::Heading(1), NONE),
    rule("h2", TagTarget::Heading(2), NONE),
    rule("h3", TagTarget::Heading(3), NONE),
    rule("h4", TagTarget::Heading(4), NONE),
    rule("h5", TagTarget::Heading(5), NONE),
    rule("h6", TagTarget::Heading(6), NONE),
    rule("blockquote", TagTarget::Blockquote, NONE),
    rule("ul", TagTarget::BulletList, NONE),
    rule("ol", TagTarget::OrderedList, LIST_ATTRS),
    rule("li", TagTarget::ListItem, NONE),
    rule("hr", TagTarget::HorizontalRule, NONE),
    rule("table", TagTarget::Table, NONE),
    rule("thead", TagTarget::TableSection, NONE),
    rule("tbody", TagTarget::TableSection, NONE),
    rule("tfoot", TagTarget::TableSection, NONE),
    rule("tr", TagTarget::TableRow, NONE),
    rule("th", TagTarget::TableHeader, CELL_ATTRS),
    rule("td", TagTarget::TableCell, CELL_ATTRS),
    rule("div", TagTarget::Html(HtmlTag::Div), NONE),
    rule("pre", TagTarget::Html(HtmlTag::Pre), NONE),
    rule("details", TagTarget::Html(HtmlTag::Details), NONE),
    rule("summary", TagTarget::Html(HtmlTag::Summary), NONE),
    rule("figure", TagTarget::Html(HtmlTag::Figure), NONE),
    rule("figcaption", TagTarget::Html(HtmlTag::Figcaption), NONE),
    rule("dl", TagTarget::Html(HtmlTag::Dl), NONE),
    rule("dt", TagTarget::Html(HtmlTag::Dt), NONE),
    rule("dd", TagTarget::Html(HtmlTag::Dd), NONE),
    rule("img", TagTarget::Image, IMAGE_ATTRS),
    rule("audio", TagTarget::Audio, MEDIA_ATTRS),
    rule("video", TagTarget::Video, MEDIA_ATTRS),
    rule("br", TagTarget::HardBreak, NONE),
    rule("b", TagTarget::Bold, NONE),
    rule("strong", TagTarget::Bold, NONE),
    rule("i", TagTarget::Italic, NONE),
    rule("em", TagTarget::Italic, NONE),
    rule("s", TagTarget::Strike, NONE),
    rule("del", TagTarget::Strike, NONE),
    rule("strike", TagTarget::Strike, NONE),
    rule("code", TagTarget::Code, NONE),
    rule("mark", TagTarget::Highlight, NONE),
    rule("a", TagTarget::Link, LINK_ATTRS),
    rule("span", TagTarget::Transparent, NONE),
    // Implied by the HTML parser around every fragment
    rule("html", TagTarget::Transparent, NONE),
    rule("body", TagTarget::Transparent, NONE),
];

/// Find the rule for a (case-insensitive) tag name.
pub fn lookup(tag: &str) -> Option<&'static TagRule> {
    TAG_POLICY
        .iter()
        .find(|rule| rule.tag.eq_ignore_ascii_case(tag))
}

/// A validated attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Text(String),
    /// `None` when protocol validation rejected the value
    Url(Option<String>),
    Integer(u32),
    Alignment(Alignment),
}

/// Attributes that survived a rule
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SanitizedAttrs {
    values: Vec<(&'static str, AttrValue)>,
}

impl SanitizedAttrs {
    fn get(&self, name: &str) -> Option<&AttrValue> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, value)| value)
    }

    pub fn text(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            AttrValue::Text(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// The accepted URL, `None` when missing or rejected
    pub fn url(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            AttrValue::Url(value) => value.clone(),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<u32> {
        match self.get(name)? {
            AttrValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn alignment(&self, name: &str) -> Option<Alignment> {
        match self.get(name)? {
            AttrValue::Alignment(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether a URL attribute was present but rejected
    pub fn rejected_url(&self) -> bool {
        self.values
            .iter()
            .any(|(_, value)| matches!(value, AttrValue::Url(None)))
    }
}

/// Keep the attributes `rule` allows, validated.
pub fn sanitize_attributes(rule: &TagRule, raw: &[(String, String)]) -> SanitizedAttrs {
    let mut values = Vec::new();
    for (name, value) in raw {
        let Some(allowed) = rule
            .attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
        else {
            tracing::debug!(tag = rule.tag, attribute = %name, "stripped attribute");
            continue;
        };
        let validated = match allowed.kind {
            AttrKind::Text => Some(AttrValue::Text(value.replace('\0', "\u{FFFD}"))),
            AttrKind::Url => Some(AttrValue::Url(sanitize_url(value))),
            AttrKind::Integer => value
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .map(AttrValue::Integer),
            AttrKind::Alignment => Alignment::from_name(value.trim()).map(AttrValue::Alignment),
        };
        if let Some(validated) = validated {
            if !values.iter().any(|(n, _)| *n == allowed.name) {
                values.push((allowed.name, validated));
            }
        }
    }
    SanitizedAttrs { values }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn unknown_tags_have_no_rule() {
        for tag in ["script", "style", "foo", "iframe", "object", "textarea"] {
            assert!(lookup(tag).is_none(), "{tag}");
        }
        assert_eq!(lookup("STRONG").map(|r| r.target), Some(TagTarget::Bold));
    }

    #[test]
    fn strips_unlisted_attributes() {
        let rule = lookup("a").unwrap();
        let attrs = sanitize_attributes(
            rule,
            &raw(&[("id", "x"), ("onclick", "alert(1)"), ("href", "/path")]),
        );
        assert_eq!(attrs.url("href").as_deref(), Some("/path"));
        assert_eq!(attrs.text("id"), None);
        assert_eq!(attrs.text("onclick"), None);
    }

    #[test]
    fn rejected_urls_become_none() {
        let rule = lookup("a").unwrap();
        let attrs = sanitize_attributes(rule, &raw(&[("href", "javascript:alert(1)")]));
        assert_eq!(attrs.url("href"), None);
        assert!(!attrs.is_empty());
    }

    #[test]
    fn spans_parse_as_integers() {
        let rule = lookup("th").unwrap();
        let attrs = sanitize_attributes(
            rule,
            &raw(&[("colspan", "2"), ("rowspan", " 5 "), ("align", "center")]),
        );
        assert_eq!(attrs.integer("colspan"), Some(2));
        assert_eq!(attrs.integer("rowspan"), Some(5));
        assert_eq!(attrs.alignment("align"), Some(Alignment::Center));

        let bad = sanitize_attributes(rule, &raw(&[("colspan", "two"), ("rowspan", "0")]));
        assert!(bad.is_empty());
    }
}
