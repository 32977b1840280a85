// ===================================================================
// Solution extraction: reduce a captured transcript to a summary
// ===================================================================

/// Marker that delimits actionable text inside free-form agent output.
pub const SOLUTION_MARKER: &str = "Solution:";

/// Characters that end a line, besides `\r\n` which counts as one break.
const LINE_BREAKS: [char; 10] = [
    '\n', '\r', '\u{0b}', '\u{0c}', '\u{1c}', '\u{1d}', '\u{1e}', '\u{85}', '\u{2028}', '\u{2029}',
];

/// Split on every Unicode line boundary, not just `\n` and `\r\n`.
/// A trailing break does not produce an extra empty line.
pub fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if !LINE_BREAKS.contains(&c) {
            continue;
        }
        lines.push(&text[start..i]);
        start = i + c.len_utf8();
        if c == '\r' && matches!(chars.peek(), Some((_, '\n'))) {
            chars.next();
            start += 1;
        }
    }
    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}

/// Collect the text following the last `Solution:` marker on every line
/// that carries one, in line order. Lines whose suffix is blank are skipped.
pub fn solution_candidates(text: &str) -> Vec<&str> {
    split_lines(text)
        .into_iter()
        .filter_map(|line| line.rsplit_once(SOLUTION_MARKER))
        .map(|(_, suffix)| suffix.trim())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Reduce raw transcript text to the summary shown to the user.
///
/// Marker-bearing lines become a 1-based numbered list separated by blank
/// lines. Without any marker the whole input is returned trimmed, so the
/// user sees everything rather than nothing.
pub fn extract_solutions(text: Option<&str>) -> String {
    let text = match text {
        Some(t) if !t.is_empty() => t,
        _ => return String::new(),
    };
    let candidates = solution_candidates(text);
    if candidates.is_empty() {
        return text.trim().to_string();
    }
    candidates
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {s}", i + 1))
        .collect::<Vec<_>>()
        .join("\n\n")
}
