//! Recovery of a JSON object embedded in noisy generator output.

/// Find the first balanced `{ ... }` fragment in `text`.
///
/// Scanning starts at the first `{`. Braces inside double-quoted strings do
/// not count, and a backslash inside a string escapes the next character.
/// Returns `None` when there is no `{` or the depth never returns to zero.
///
/// This only isolates a candidate; the caller still has to parse it.
pub fn extract_first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (offset, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}
