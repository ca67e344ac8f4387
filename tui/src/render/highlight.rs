use ratatui::style::Color;
use ratatui::style::Modifier;
use ratatui::style::Style;
use ratatui::text::Line;
use ratatui::text::Span;
use std::sync::LazyLock;
use syntect::easy::HighlightLines;
use syntect::highlighting::FontStyle;
use syntect::highlighting::Theme;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxReference;
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

const MAX_HIGHLIGHT_BYTES: usize = 256 * 1024;
const MAX_HIGHLIGHT_LINES: usize = 4000;
const THEME_NAME: &str = "base16-ocean.dark";

static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

/// Highlights a fenced code block. Unknown languages, oversized blocks and
/// highlighter failures all degrade to unstyled lines carrying the same text.
pub(crate) fn highlight_code_to_lines(
    source: &str,
    language_hint: Option<&str>,
) -> Vec<Line<'static>> {
    let Some(syntax) = resolve_syntax(language_hint, source) else {
        return plain_source_to_lines(source);
    };
    let Some(theme) = THEME_SET.themes.get(THEME_NAME) else {
        return plain_source_to_lines(source);
    };

    highlight_source_to_lines(source, syntax, theme).unwrap_or_else(|| plain_source_to_lines(source))
}

fn resolve_syntax(language_hint: Option<&str>, source: &str) -> Option<&'static SyntaxReference> {
    if let Some(language) = language_hint.and_then(normalize_language_hint)
        && let Some(syntax) = SYNTAX_SET.find_syntax_by_token(&language)
    {
        return Some(syntax);
    }

    if looks_like_diff(source) {
        return SYNTAX_SET.find_syntax_by_token("diff");
    }

    None
}

/// Reduces a fence info string to a token syntect knows about. Only the first
/// word counts, so `rust no_run` resolves to `rust`.
fn normalize_language_hint(language_hint: &str) -> Option<String> {
    let token = language_hint
        .trim()
        .split(|c: char| c.is_whitespace() || c == ',')
        .find(|piece| !piece.is_empty())?;

    let lower = token.trim_matches('`').to_ascii_lowercase();
    if lower.is_empty() {
        return None;
    }

    let normalized = match lower.as_str() {
        "c++" | "cc" | "cxx" | "hpp" | "hxx" => "cpp",
        "diff" | "patch" => "diff",
        "golang" => "go",
        // The bundled syntax set has no TypeScript grammar; JavaScript is close.
        "js" | "mjs" | "cjs" | "jsx" | "node" | "ts" | "mts" | "cts" | "tsx" | "typescript" => {
            "js"
        }
        "jsonc" => "json",
        "py" | "python3" => "python",
        "rs" => "rust",
        "sh" | "shell" | "zsh" | "console" => "bash",
        "yml" => "yaml",
        other => other,
    };

    Some(normalized.to_string())
}

fn looks_like_diff(source: &str) -> bool {
    let trimmed = source.trim_start();
    trimmed.starts_with("diff --git ")
        || trimmed.starts_with("@@ ")
        || (source.contains("\n--- ") && source.contains("\n+++ "))
}

pub(crate) fn plain_source_to_lines(source: &str) -> Vec<Line<'static>> {
    if source.is_empty() {
        return vec![Line::from("")];
    }

    source
        .lines()
        .map(|line| Line::from(line.to_string()))
        .collect()
}

fn highlight_source_to_lines(
    source: &str,
    syntax: &SyntaxReference,
    theme: &Theme,
) -> Option<Vec<Line<'static>>> {
    if source.is_empty() {
        return Some(vec![Line::from("")]);
    }
    if source.len() > MAX_HIGHLIGHT_BYTES || source.lines().count() > MAX_HIGHLIGHT_LINES {
        return None;
    }

    let mut highlighter = HighlightLines::new(syntax, theme);
    let mut lines = Vec::new();
    for line in LinesWithEndings::from(source) {
        let ranges = highlighter.highlight_line(line, &SYNTAX_SET).ok()?;
        let spans = ranges
            .into_iter()
            .filter_map(|(style, text)| {
                let text = text.trim_end_matches(['\n', '\r']);
                (!text.is_empty()).then(|| Span::styled(text.to_string(), convert_style(style)))
            })
            .collect::<Vec<_>>();
        lines.push(Line::from(spans));
    }

    Some(lines)
}

fn convert_style(style: syntect::highlighting::Style) -> Style {
    let fg = style.foreground;
    let mut converted = Style::default().fg(Color::Rgb(fg.r, fg.g, fg.b));
    if style.font_style.contains(FontStyle::BOLD) {
        converted = converted.add_modifier(Modifier::BOLD);
    }
    if style.font_style.contains(FontStyle::ITALIC) {
        converted = converted.add_modifier(Modifier::ITALIC);
    }
    if style.font_style.contains(FontStyle::UNDERLINE) {
        converted = converted.add_modifier(Modifier::UNDERLINED);
    }
    converted
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reconstructed(lines: &[Line<'static>]) -> String {
        lines
            .iter()
            .map(|line| {
                line.spans
                    .iter()
                    .map(|span| span.content.clone())
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn has_styled_span(lines: &[Line<'static>]) -> bool {
        lines
            .iter()
            .flat_map(|line| line.spans.iter())
            .any(|span| span.style != Style::default())
    }

    #[test]
    fn highlighting_keeps_source_text() {
        let source = "fn main() {\n    println!(\"hi\");\n}";
        let lines = highlight_code_to_lines(source, Some("rust"));
        assert_eq!(reconstructed(&lines), source);
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn normalizes_language_aliases() {
        assert_eq!(normalize_language_hint("rs"), Some("rust".to_string()));
        assert_eq!(normalize_language_hint("patch"), Some("diff".to_string()));
        assert_eq!(normalize_language_hint(" yml "), Some("yaml".to_string()));
        assert_eq!(normalize_language_hint("tsx"), Some("js".to_string()));
        assert_eq!(normalize_language_hint("   "), None);
    }

    #[test]
    fn fence_info_is_trimmed_to_first_token() {
        assert_eq!(
            normalize_language_hint("rust no_run"),
            Some("rust".to_string())
        );
    }

    #[test]
    fn known_languages_get_colored_spans() {
        let lines = highlight_code_to_lines("def f(x):\n    return x", Some("python"));
        assert!(has_styled_span(&lines));
    }

    #[test]
    fn unknown_language_falls_back_to_plain_lines() {
        let source = "some text\nmore text";
        let lines = highlight_code_to_lines(source, Some("no-such-language"));
        assert!(!has_styled_span(&lines));
        assert_eq!(reconstructed(&lines), source);
    }

    #[test]
    fn unlabelled_diff_is_detected() {
        let source = "diff --git a/a.txt b/a.txt\n@@ -1 +1 @@\n-old value\n+new value";
        let lines = highlight_code_to_lines(source, None);
        assert!(has_styled_span(&lines));
    }

    #[test]
    fn oversized_blocks_are_not_highlighted() {
        let source = "let x = 1;\n".repeat(MAX_HIGHLIGHT_LINES + 1);
        let lines = highlight_code_to_lines(&source, Some("rust"));
        assert!(!has_styled_span(&lines));
    }
}
