//! Pipe-table detection over partially streamed markdown.

/// Split a pipe-delimited line into trimmed cells.
///
/// Returns `None` for blank lines and lines with fewer than two cells.
/// Leading/trailing pipes are stripped before splitting.
pub fn parse_table_segments(line: &str) -> Option<Vec<&str>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut content = trimmed;
    if let Some(without_leading) = content.strip_prefix('|') {
        content = without_leading;
    }
    if let Some(without_trailing) = content.strip_suffix('|') {
        content = without_trailing;
    }

    let segments: Vec<&str> = content.split('|').map(str::trim).collect();
    (segments.len() >= 2).then_some(segments)
}

/// A row with at least one non-empty cell.
pub fn is_table_row(line: &str) -> bool {
    parse_table_segments(line).is_some_and(|segments| segments.iter().any(|s| !s.is_empty()))
}

/// `---`, `:---`, `---:` or `:---:`.
pub fn is_table_delimiter_segment(segment: &str) -> bool {
    let trimmed = segment.trim();
    if trimmed.is_empty() {
        return false;
    }
    let without_leading = trimmed.strip_prefix(':').unwrap_or(trimmed);
    let without_ends = without_leading.strip_suffix(':').unwrap_or(without_leading);
    without_ends.len() >= 3 && without_ends.chars().all(|ch| ch == '-')
}

pub fn is_table_delimiter_line(line: &str) -> bool {
    parse_table_segments(line)
        .is_some_and(|segments| segments.into_iter().all(is_table_delimiter_segment))
}

fn is_fence_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Whether `text` holds a finished table head: a header row immediately
/// followed by a delimiter row, both newline-terminated and outside code
/// fences.
pub(crate) fn has_complete_table(text: &str) -> bool {
    let mut in_fence = false;
    let mut previous_was_header = false;

    for line in text.split_inclusive('\n') {
        let Some(line) = line.strip_suffix('\n') else {
            // Still being streamed.
            break;
        };
        if is_fence_line(line) {
            in_fence = !in_fence;
            previous_was_header = false;
            continue;
        }
        if in_fence {
            continue;
        }
        if previous_was_header && is_table_delimiter_line(line) {
            return true;
        }
        previous_was_header = is_table_row(line) && !is_table_delimiter_line(line);
    }
    false
}
