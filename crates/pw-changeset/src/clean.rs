// clean.rs — Normalization of generated file content.
//
// Models like to wrap file bodies in markdown fences even when told not to,
// and Windows-trained output drifts into CRLF. Cleaning runs to a fixed
// point, so cleaning already-clean content is a no-op.

/// Normalize line endings to `\n`.
pub fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

/// Clean generated file content before it enters a change-set.
///
/// - CRLF / CR → LF
/// - leading blank lines removed
/// - any number of wrapping ```` ``` ```` fence layers stripped
/// - trailing whitespace collapsed to a single final newline
pub fn clean_content(content: &str) -> String {
    let mut current = normalize_line_endings(content);
    loop {
        let next = clean_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn clean_once(content: &str) -> String {
    let body = strip_fence(content.trim_start_matches('\n')).unwrap_or(content);
    let body = body.trim_start_matches('\n').trim_end();
    if body.is_empty() {
        String::new()
    } else {
        format!("{}\n", body)
    }
}

/// If `content` is entirely wrapped in one fence pair, return the inside.
fn strip_fence(content: &str) -> Option<&str> {
    let trimmed = content.trim();
    let first_line_end = trimmed.find('\n')?;
    let first_line = &trimmed[..first_line_end];
    if !first_line.starts_with("```") {
        return None;
    }
    // The info string ("tsx", "json") must be a single word.
    if first_line[3..].trim().contains(char::is_whitespace) {
        return None;
    }
    let rest = &trimmed[first_line_end + 1..];
    let last_newline = rest.rfind('\n');
    let (inner, last_line) = match last_newline {
        Some(idx) => (&rest[..idx], &rest[idx + 1..]),
        None => ("", rest),
    };
    if last_line.trim() != "```" {
        return None;
    }
    Some(inner)
}
