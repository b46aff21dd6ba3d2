use std::borrow::Cow;

/// Leading characters that make spreadsheet applications evaluate a cell.
const FORMULA_TRIGGERS: &[char] = &['=', '+', '-', '@', '\t', '\r', '\n'];

/// Entities this module emits. Escaping leaves them alone so that sanitizing
/// an already sanitized value is a no-op.
const KNOWN_ENTITIES: &[&str] = &["&amp;", "&lt;", "&gt;", "&quot;", "&#x27;", "&#39;"];

/// Neutralize an untrusted CSV cell.
///
/// Control characters (C0 and C1, including DEL) are removed and the result is
/// trimmed. A value that would start with a formula trigger gets a leading
/// quote, and finally `& < > " '` are HTML-escaped. The quote prefix is itself
/// escaped, so `=SUM(A1)` becomes `&#x27;=SUM(A1)`.
///
/// The function is idempotent: `sanitize(&sanitize(x)) == sanitize(x)`.
pub fn sanitize(raw: &str) -> String {
    let stripped = strip_control_chars(raw);
    let trimmed = stripped.trim();

    let guarded: Cow<'_, str> = if trimmed.starts_with(FORMULA_TRIGGERS) {
        Cow::Owned(format!("'{}", trimmed))
    } else {
        Cow::Borrowed(trimmed)
    };

    escape_html(&guarded)
}

fn is_control(c: char) -> bool {
    matches!(c as u32, 0x00..=0x1F | 0x7F..=0x9F)
}

fn strip_control_chars(raw: &str) -> Cow<'_, str> {
    if raw.chars().any(is_control) {
        Cow::Owned(raw.chars().filter(|c| !is_control(*c)).collect())
    } else {
        Cow::Borrowed(raw)
    }
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for (idx, c) in value.char_indices() {
        match c {
            '&' if starts_with_entity(&value[idx..]) => escaped.push('&'),
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }

    escaped
}

fn starts_with_entity(rest: &str) -> bool {
    KNOWN_ENTITIES.iter().any(|entity| rest.starts_with(entity))
}
