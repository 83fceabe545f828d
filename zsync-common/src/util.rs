//! Shared utilities for zsync.

/// Maximum length of comments sent with executions and step results.
pub const COMMENT_LIMIT: usize = 700;

/// Split a metadata value such as `TP-1, TP-2 | TP-3` into trimmed items.
pub fn split_metadata_value(value: Option<&str>) -> Vec<String> {
    let Some(value) = value else {
        return Vec::new();
    };
    value
        .split([',', '|'])
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Interpret a metadata or environment flag.
///
/// Accepts: 1, true, yes, on (case-insensitive). Everything else is false.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Truncate a comment to [`COMMENT_LIMIT`] characters on a char boundary.
pub fn truncate_comment(comment: &str) -> String {
    comment.chars().take(COMMENT_LIMIT).collect()
}

/// Escape a value for use inside a quoted JQL string.
///
/// Lucene special characters are prefixed with a backslash, then the result
/// is escaped once more for the JQL string literal itself.
pub fn jql_escape(value: &str) -> String {
    let mut lucene = String::with_capacity(value.len() * 2);
    for c in value.chars() {
        if matches!(
            c,
            '+' | '-' | '&' | '|' | '!' | '^' | '~' | '*' | '?' | '\'' | '\\'
        ) {
            lucene.push('\\');
        }
        lucene.push(c);
    }
    let mut out = String::with_capacity(lucene.len() * 2);
    for c in lucene.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

/// Return the part of `text` after the last occurrence of `marker`.
///
/// When the marker is absent the whole text is returned.
pub fn fetch_from_right<'a>(text: &'a str, marker: &str) -> &'a str {
    if marker.is_empty() {
        return text;
    }
    match text.rfind(marker) {
        Some(idx) => &text[idx + marker.len()..],
        None => text,
    }
}

/// Identity value stored in the issue custom field for a suite source path.
pub fn suite_identity(source: &str, root_marker: &str) -> String {
    let source = source.replace('\\', "/");
    let marker = root_marker.replace('\\', "/");
    fetch_from_right(&source, &marker).to_string()
}

/// Mask a secret for display. Empty secrets stay empty so "unset" is visible.
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "***".to_string()
    }
}
