use crate::markdown_render::RenderedMarkdown;
use crate::markdown_render::render_markdown_text;
use chatline_core::error::RenderError;
use chatline_core::streaming::table_detect::is_table_delimiter_line;
use chatline_core::streaming::table_detect::is_table_row;

/// Renders one chat message. Replies often wrap a table in a ```markdown
/// fence; those fences are unwrapped so the table draws as a table.
pub(crate) fn render_message(markdown_source: &str) -> Result<RenderedMarkdown, RenderError> {
    let normalized = unwrap_markdown_fences(markdown_source);
    render_markdown_text(&normalized)
}

#[derive(Clone, Copy)]
struct Fence {
    marker: char,
    len: usize,
}

/// Splits a line into its fence run and the trailing info string. Up to three
/// spaces of indentation are allowed, as in CommonMark.
fn fence_run(line: &str) -> Option<(Fence, &str)> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let indent = line.bytes().take_while(|byte| *byte == b' ').count();
    if indent > 3 {
        return None;
    }
    let trimmed = &line[indent..];
    let marker = trimmed.chars().next().filter(|ch| matches!(ch, '`' | '~'))?;
    let len = trimmed.chars().take_while(|ch| *ch == marker).count();
    (len >= 3).then(|| (Fence { marker, len }, trimmed[len..].trim()))
}

fn closes(line: &str, fence: Fence) -> bool {
    fence_run(line).is_some_and(|(run, rest)| {
        run.marker == fence.marker && run.len >= fence.len && rest.is_empty()
    })
}

fn contains_table(content: &str) -> bool {
    let mut saw_row = false;
    let mut saw_delimiter = false;
    for line in content.lines().map(str::trim).filter(|line| is_table_row(line)) {
        if is_table_delimiter_line(line) {
            saw_delimiter = true;
        } else {
            saw_row = true;
        }
    }
    saw_row && saw_delimiter
}

fn unwrap_markdown_fences(markdown_source: &str) -> String {
    enum ActiveFence {
        Passthrough(Fence),
        MarkdownCandidate {
            fence: Fence,
            opening_line: String,
            content: String,
        },
    }

    let mut out = String::with_capacity(markdown_source.len());
    let mut active_fence: Option<ActiveFence> = None;

    for line in markdown_source.split_inclusive('\n') {
        if let Some(active) = active_fence.take() {
            match active {
                ActiveFence::Passthrough(fence) => {
                    out.push_str(line);
                    if !closes(line, fence) {
                        active_fence = Some(ActiveFence::Passthrough(fence));
                    }
                }
                ActiveFence::MarkdownCandidate {
                    fence,
                    opening_line,
                    mut content,
                } => {
                    if closes(line, fence) {
                        if contains_table(&content) {
                            out.push_str(&content);
                        } else {
                            out.push_str(&opening_line);
                            out.push_str(&content);
                            out.push_str(line);
                        }
                    } else {
                        content.push_str(line);
                        active_fence = Some(ActiveFence::MarkdownCandidate {
                            fence,
                            opening_line,
                            content,
                        });
                    }
                }
            }
            continue;
        }

        if let Some((fence, info)) = fence_run(line) {
            let language = info.split_whitespace().next().unwrap_or_default();
            if language.eq_ignore_ascii_case("md") || language.eq_ignore_ascii_case("markdown") {
                active_fence = Some(ActiveFence::MarkdownCandidate {
                    fence,
                    opening_line: line.to_string(),
                    content: String::new(),
                });
            } else {
                out.push_str(line);
                active_fence = Some(ActiveFence::Passthrough(fence));
            }
            continue;
        }

        out.push_str(line);
    }

    if let Some(active) = active_fence {
        match active {
            ActiveFence::Passthrough(_) => {}
            ActiveFence::MarkdownCandidate {
                opening_line,
                content,
                ..
            } => {
                out.push_str(&opening_line);
                out.push_str(&content);
            }
        }
    }

    out
}
