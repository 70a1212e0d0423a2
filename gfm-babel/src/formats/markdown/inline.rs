//! Text-level helpers for the serializer
//!
//! Escaping, code span fences and link destinations. Everything here works
//! on strings; the tree walk lives in the serializer.

/// Characters escaped wherever they appear in regenerated text
const ALWAYS_ESCAPED: &[char] = &['\\', '`', '*', '_', '[', ']', '~', '<', '&'];

/// Escape `text` so it reads back as the same literal characters. When
/// `line_start` is set the first line is treated as the start of a line;
/// lines after a newline always are.
pub fn escape_text(text: &str, line_start: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let escaped = escape_inline(line);
        if i > 0 || line_start {
            out.push_str(&escape_line_start(&escaped));
        } else {
            out.push_str(&escaped);
        }
    }
    out
}

fn escape_inline(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        // `{+` and `{-` open an inline diff
        let opens_diff = c == '{' && matches!(chars.peek(), Some('+' | '-'));
        if opens_diff || ALWAYS_ESCAPED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape what would open a block at the start of a line
fn escape_line_start(line: &str) -> String {
    let indent = line.len() - line.trim_start_matches(' ').len();
    let (lead, rest) = line.split_at(indent);
    if rest.starts_with(['#', '>', '-', '+']) {
        return format!("{lead}\\{rest}");
    }
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits > 0 && matches!(rest.as_bytes().get(digits), Some(b'.' | b')')) {
        return format!("{lead}{}\\{}", &rest[..digits], &rest[digits..]);
    }
    line.to_string()
}

/// Escape text for a pipe table cell: pipes are escaped and line breaks
/// fold into spaces.
pub fn escape_cell_text(text: &str) -> String {
    escape_inline(&text.replace('\n', " ")).replace('|', "\\|")
}

/// Longest run of `marker` in `text`
pub fn longest_run(text: &str, marker: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == marker {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Inline code with a backtick fence longer than any run inside
pub fn code_span(code: &str) -> String {
    let fence = "`".repeat(longest_run(code, '`') + 1);
    let padded = code.starts_with('`') || code.ends_with('`');
    if padded {
        format!("{fence} {code} {fence}")
    } else {
        format!("{fence}{code}{fence}")
    }
}

/// Split leading and trailing whitespace off `text`.
pub fn split_padding(text: &str) -> (&str, &str, &str) {
    let core_start = text.len() - text.trim_start().len();
    let core_end = text.trim_end().len().max(core_start);
    (&text[..core_start], &text[core_start..core_end], &text[core_end..])
}

/// A link destination, angle-bracketed when it could not be written bare
pub fn link_destination(url: &str) -> String {
    let mut depth = 0i32;
    let mut balanced = true;
    for c in url.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                balanced &= depth >= 0;
            }
            _ => {}
        }
    }
    balanced &= depth == 0;
    if url.is_empty() || !balanced || url.contains(|c: char| c.is_whitespace() || c == '<') {
        format!("<{}>", url.replace('<', "%3C").replace('>', "%3E"))
    } else {
        url.to_string()
    }
}

/// A link title in double quotes
pub fn quote_title(title: &str) -> String {
    format!("\"{}\"", title.replace('\\', "\\\\").replace('"', "\\\""))
}

pub fn html_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn html_attr(value: &str) -> String {
    html_text(value).replace('"', "&quot;")
}
