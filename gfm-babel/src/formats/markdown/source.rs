//! Line index over the parsed text
//!
//! comrak reports positions as 1-based line and column pairs with an
//! inclusive end. [`SourceText`] turns them into byte ranges of the original
//! input so nodes can keep the exact text they came from.

use comrak::nodes::{LineColumn, Sourcepos};
use std::ops::Range;

use crate::model::FrontmatterLanguage;

pub struct SourceText<'s> {
    text: &'s str,
    line_starts: Vec<usize>,
}

impl<'s> SourceText<'s> {
    pub fn new(text: &'s str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        SourceText { text, line_starts }
    }

    pub fn text(&self) -> &'s str {
        self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Byte offset of `column` bytes into 1-based `line`
    pub fn offset(&self, line: usize, column: usize) -> usize {
        let Some(&start) = line.checked_sub(1).and_then(|i| self.line_starts.get(i)) else {
            return self.text.len();
        };
        (start + column).min(self.text.len())
    }

    fn start_offset(&self, pos: LineColumn) -> usize {
        self.offset(pos.line, pos.column.saturating_sub(1))
    }

    /// Byte range covered by `pos`, without trailing blank lines. Spaces
    /// ending its last line stay.
    pub fn range(&self, pos: &Sourcepos) -> Option<Range<usize>> {
        if pos.start.line == 0 {
            return None;
        }
        let start = self.start_offset(pos.start);
        let end = self.offset(pos.end.line, pos.end.column);
        if end < start {
            return None;
        }
        let slice = self.text.get(start..end)?;
        let content = slice.trim_end().len();
        let tail = &slice[content..];
        let kept = tail.find(['\n', '\r']).unwrap_or(tail.len());
        Some(start..start + content + kept)
    }

    /// Byte offset of the start of the line holding `offset`
    pub fn line_start(&self, offset: usize) -> usize {
        let line = self.line_starts.partition_point(|&start| start <= offset);
        self.line_starts[line.saturating_sub(1)]
    }

    pub fn slice(&self, range: Range<usize>) -> Option<&'s str> {
        self.text.get(range)
    }

    /// The rest of the line starting at `offset`, without its newline
    pub fn line_from(&self, offset: usize) -> &'s str {
        let rest = self.text.get(offset..).unwrap_or("");
        rest.split('\n').next().unwrap_or("")
    }

    /// Byte ranges of every line (without the newline) inside `range`
    pub fn lines_in(&self, range: Range<usize>) -> Vec<Range<usize>> {
        let mut lines = Vec::new();
        let mut start = range.start;
        while start < range.end {
            let Some(rest) = self.text.get(start..range.end) else {
                break;
            };
            let end = rest.find('\n').map_or(range.end, |i| start + i);
            lines.push(start..end);
            start = end + 1;
        }
        lines
    }
}

/// Frontmatter found at the very start of the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontmatterBlock {
    pub language: FrontmatterLanguage,
    /// Text between the delimiter lines
    pub body: String,
    /// The whole block including both delimiters
    pub range: Range<usize>,
}

/// Detect a frontmatter block: a delimiter line (`---`, `+++` or `;;;`) on
/// the first line and the same delimiter closing it.
pub fn detect_frontmatter(text: &str) -> Option<FrontmatterBlock> {
    let first = text.split('\n').next()?;
    let language = FrontmatterLanguage::from_delimiter(first.trim_end())?;
    let delimiter = language.delimiter();

    let body_start = first.len() + 1;
    let mut pos = body_start;
    while pos <= text.len() {
        let line_end = text[pos..].find('\n').map_or(text.len(), |i| pos + i);
        if text[pos..line_end].trim_end() == delimiter {
            let body = text[body_start..pos].strip_suffix('\n').unwrap_or("");
            return Some(FrontmatterBlock {
                language,
                body: body.to_string(),
                range: 0..line_end,
            });
        }
        if line_end == text.len() {
            break;
        }
        pos = line_end + 1;
    }
    None
}

/// Drop everything but the newlines of `range`, so comrak sees blank lines
/// while line numbers stay intact.
pub fn blank_out(text: &str, range: Range<usize>) -> String {
    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..range.start]);
    out.extend(text[range.clone()].chars().filter(|c| *c == '\n'));
    out.push_str(&text[range.end..]);
    out
}
