//! Small string helpers shared by the generation stages.

/// Return the prefix of `s` holding at most `max_chars` characters.
///
/// Never splits a multi-byte character.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Strip a surrounding markdown code fence (```` ```json ```` or ```` ``` ````)
/// from a model reply, then trim whitespace.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```") {
        // Drop the optional language tag on the opening fence.
        s = match rest.find('\n') {
            Some(nl) if !rest[..nl].contains(['{', '[']) => &rest[nl + 1..],
            _ => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
        };
    }
    if let Some(rest) = s.trim_end().strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Turn a user-chosen output name into a filesystem-safe base filename.
///
/// Spaces become underscores; path separators and other characters outside
/// `[A-Za-z0-9._-]` are dropped. Leading dots and dashes are stripped so the
/// name never reads as a hidden file or a command-line option. Empty results
/// fall back to `document`.
pub fn normalize_filename(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            c if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') => Some(c),
            _ => None,
        })
        .collect();
    let cleaned = cleaned
        .trim_start_matches(['.', '-'])
        .trim_end_matches('.');
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}
