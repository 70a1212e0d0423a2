//! URL protocol validation
//!
//! Values of `href` and `src` are decoded (named and numeric character
//! references), stripped of whitespace and control characters, and lowercased
//! before the scheme is checked. Only the check uses the decoded form; an
//! accepted value is returned as written, with NUL replaced by U+FFFD.

/// Schemes that are never allowed in a URL attribute
const DANGEROUS_SCHEMES: &[&str] = &["javascript:", "vbscript:"];

/// Named references that can spell out a scheme or obscure one
const NAMED_REFERENCES: &[(&str, &str)] = &[
    ("Tab", "\t"),
    ("NewLine", "\n"),
    ("colon", ":"),
    ("lpar", "("),
    ("rpar", ")"),
    ("sol", "/"),
    ("bsol", "\\"),
    ("period", "."),
    ("semi", ";"),
    ("excl", "!"),
    ("quot", "\""),
    ("apos", "'"),
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    ("nbsp", "\u{a0}"),
];

/// References browsers accept without the trailing semicolon
const LEGACY_REFERENCES: &[&str] = &["amp", "lt", "gt", "quot", "nbsp"];

/// Check a URL attribute value.
///
/// Returns `None` when the value resolves to a dangerous scheme.
pub fn sanitize_url(raw: &str) -> Option<String> {
    if has_dangerous_scheme(raw) {
        tracing::debug!(url = raw, "rejected URL with a dangerous scheme");
        return None;
    }
    Some(raw.replace('\0', "\u{FFFD}"))
}

/// Whether the decoded, whitespace-free form of `raw` starts with a
/// dangerous scheme.
pub fn has_dangerous_scheme(raw: &str) -> bool {
    let normalized: String = decode_character_references(raw)
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .flat_map(char::to_lowercase)
        .collect();
    DANGEROUS_SCHEMES
        .iter()
        .any(|scheme| normalized.starts_with(scheme))
}

/// Decode numeric (decimal and hex, with or without `;`) and a set of named
/// character references.
pub fn decode_character_references(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match decode_reference(rest) {
            Some((decoded, consumed)) => {
                out.push_str(&decoded);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decode the reference at the start of `input` (which begins with `&`).
/// Returns the replacement and the number of bytes consumed.
fn decode_reference(input: &str) -> Option<(String, usize)> {
    let body = &input[1..];
    if let Some(numeric) = body.strip_prefix('#') {
        let (radix, digits_start) = match numeric.as_bytes().first() {
            Some(b'x') | Some(b'X') => (16, 1),
            _ => (10, 0),
        };
        let digits: &str = &numeric[digits_start..];
        let len = digits
            .bytes()
            .take_while(|b| (*b as char).is_digit(radix))
            .count();
        if len == 0 {
            return None;
        }
        let value = u32::from_str_radix(&digits[..len], radix).unwrap_or(u32::MAX);
        let decoded = match value {
            0 => '\u{FFFD}',
            value => char::from_u32(value).unwrap_or('\u{FFFD}'),
        };
        let mut consumed = 2 + digits_start + len;
        if digits[len..].starts_with(';') {
            consumed += 1;
        }
        return Some((decoded.to_string(), consumed));
    }

    let len = body
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric())
        .count();
    if len == 0 {
        return None;
    }
    let name = &body[..len];
    let terminated = body[len..].starts_with(';');
    if !terminated && !LEGACY_REFERENCES.contains(&name) {
        return None;
    }
    let (_, value) = NAMED_REFERENCES.iter().find(|(n, _)| *n == name)?;
    let consumed = 1 + len + usize::from(terminated);
    Some((value.to_string(), consumed))
}
