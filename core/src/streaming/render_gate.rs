//! Decides, per reveal step, whether the visible text is worth a full
//! markdown layout or can be shown as plain text.
//!
//! Heuristic only: raw syntax may show for a moment before a construct
//! closes, and layout may happen a little early.

use std::sync::LazyLock;

use regex_lite::Regex;

use super::table_detect::has_complete_table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    PlainAppend,
    StructuralRerender,
}

/// Anything that looks like markdown at all.
const SIGNAL_PATTERNS: &[&str] = &[
    r"#{1,6}\s+",
    r"\*\*.*?\*\*",
    r"\*.*?\*",
    r"`.*?`",
    r"```(?s:.*?)```",
    r"(?m)^\s*[-*+]\s+",
    r"(?m)^\s*\d+\.\s+",
    r"(?m)^\s*>\s+",
    r"\[.*?\]\(.*?\)",
    r"!\[.*?\]\(.*?\)",
    r"\|.*?\|",
    r"(?m)^\s*---+\s*$",
    r"~~.*?~~",
];

/// Constructs that are closed and will not change shape as text arrives.
const COMPLETE_PATTERNS: &[&str] = &[
    r"#{1,6}\s+.+",
    r"\*\*[^*]+\*\*",
    r"\*[^*]+\*",
    r"`[^`]+`",
    r"```(?s:.*?)```",
    r"(?m)^\s*[-*+]\s+.+$",
    r"(?m)^\s*\d+\.\s+.+$",
    r"(?m)^\s*>\s+.+$",
    r"\[[^\]]+\]\([^)]+\)",
    r"!\[[^\]]*\]\([^)]+\)",
    r"~~[^~]+~~",
    r"(?m)^\s*---+\s*$",
];

const CLOSING_FENCE_PATTERNS: &[&str] = &[r"```\s*$", r"```\w*\s*\n(?s:.*?)```"];

static SIGNALS: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(SIGNAL_PATTERNS));
static COMPLETE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(COMPLETE_PATTERNS));
static CLOSING_FENCE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(CLOSING_FENCE_PATTERNS));

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(err) => {
                tracing::error!("render gate pattern {pattern} failed to compile: {err}");
                None
            }
        })
        .collect()
}

fn any_match(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|regex| regex.is_match(text))
}

pub fn has_markdown_signal(text: &str) -> bool {
    any_match(&SIGNALS, text)
}

pub fn has_complete_construct(text: &str) -> bool {
    any_match(&COMPLETE, text) || has_complete_table(text)
}

pub fn has_closing_fence(text: &str) -> bool {
    any_match(&CLOSING_FENCE, text)
}

#[derive(Debug, Clone, Copy)]
pub struct RenderGate {
    growth_threshold: usize,
}

impl RenderGate {
    pub fn new(growth_threshold: usize) -> Self {
        Self { growth_threshold }
    }

    /// `text_len` and `last_render_len` are char counts; `last_render_len` is
    /// the length at the previous structural render.
    pub fn decide(&self, text: &str, text_len: usize, last_render_len: usize) -> RenderMode {
        if !has_markdown_signal(text) {
            return RenderMode::PlainAppend;
        }

        let grown = text_len.saturating_sub(last_render_len) > self.growth_threshold;
        if grown || has_complete_construct(text) || has_closing_fence(text) {
            RenderMode::StructuralRerender
        } else {
            RenderMode::PlainAppend
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn decide(text: &str, last: usize) -> RenderMode {
        RenderGate::new(100).decide(text, text.chars().count(), last)
    }

    #[test]
    fn all_patterns_compile() {
        assert_eq!(SIGNALS.len(), SIGNAL_PATTERNS.len());
        assert_eq!(COMPLETE.len(), COMPLETE_PATTERNS.len());
        assert_eq!(CLOSING_FENCE.len(), CLOSING_FENCE_PATTERNS.len());
    }

    #[test]
    fn long_plain_prose_never_renders_structurally() {
        let prose = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        assert_eq!(decide(&prose, 0), RenderMode::PlainAppend);
        assert_eq!(decide("Hello, world! 3 + 4 = 7.", 0), RenderMode::PlainAppend);
    }

    #[test]
    fn open_bold_stays_plain_until_closed() {
        assert_eq!(decide("Hello **wor", 0), RenderMode::PlainAppend);
        assert_eq!(decide("Hello **world**", 0), RenderMode::StructuralRerender);
    }

    #[test]
    fn heading_renders_once_it_has_text() {
        assert_eq!(decide("# ", 0), RenderMode::PlainAppend);
        assert_eq!(decide("# Title", 0), RenderMode::StructuralRerender);
    }

    #[test]
    fn closed_fence_triggers_render() {
        assert!(has_closing_fence("```rust\nfn main() {}\n```"));
        assert_eq!(
            decide("```rust\nfn main() {}\n```", 0),
            RenderMode::StructuralRerender
        );
        assert!(!has_closing_fence("```rust\nfn main"));
    }

    #[test]
    fn growth_threshold_forces_render_of_signalled_text() {
        // An unclosed table cell signals markdown but completes nothing.
        let mut text = "|a|".to_string();
        text.push_str(&"x".repeat(120));
        assert!(!has_complete_construct(&text));
        assert_eq!(decide(&text, 0), RenderMode::StructuralRerender);
        assert_eq!(decide(&text, text.len() - 50), RenderMode::PlainAppend);
    }

    #[test]
    fn complete_table_head_triggers_render() {
        assert_eq!(decide("| A | B |\n|---|", 0), RenderMode::PlainAppend);
        assert_eq!(
            decide("| A | B |\n|---|---|\n", 0),
            RenderMode::StructuralRerender
        );
    }

    #[test]
    fn list_quote_link_and_rule_lines_are_complete() {
        for text in [
            "- item",
            "1. first",
            "> quoted",
            "see [docs](https://example.com)",
            "![logo](logo.png)",
            "above\n---\n",
            "~~gone~~",
            "run `ls`",
        ] {
            assert_eq!(decide(text, 0), RenderMode::StructuralRerender, "{text:?}");
        }
    }
}
