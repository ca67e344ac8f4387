use std::time::Duration;
use std::time::Instant;

use chatline_core::surface::ChatStatus;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::style::Stylize;
use ratatui::text::Line;
use ratatui::text::Span;
use ratatui::widgets::Widget;
use unicode_width::UnicodeWidthStr;

pub(crate) const NOTICE_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NoticeTone {
    Info,
    Success,
    Warning,
    Error,
}

/// Short-lived message shown next to the status indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Notice {
    pub(crate) text: String,
    pub(crate) tone: NoticeTone,
    pub(crate) expires_at: Instant,
}

impl Notice {
    pub(crate) fn new(text: impl Into<String>, tone: NoticeTone, now: Instant) -> Self {
        Self {
            text: text.into(),
            tone,
            expires_at: now + NOTICE_TTL,
        }
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    fn style(&self) -> Style {
        match self.tone {
            NoticeTone::Info => Style::new().dim(),
            NoticeTone::Success => Style::new().green(),
            NoticeTone::Warning => Style::new().yellow(),
            NoticeTone::Error => Style::new().red(),
        }
    }
}

pub(crate) fn status_indicator(status: ChatStatus) -> Span<'static> {
    match status {
        ChatStatus::Ready => "● Ready".green(),
        ChatStatus::Streaming => "● Streaming".cyan(),
        ChatStatus::Stopped => "⏸ Stopped".yellow(),
        ChatStatus::Error => "✕ Error".red(),
    }
}

pub(crate) struct StatusLine<'a> {
    pub(crate) status: ChatStatus,
    pub(crate) notice: Option<&'a Notice>,
    /// `(key, action)` pairs, dropped from the end when space runs out.
    pub(crate) hints: Vec<(String, &'static str)>,
}

impl StatusLine<'_> {
    fn left(&self) -> Line<'static> {
        let mut spans = vec![Span::from(" "), status_indicator(self.status)];
        if let Some(notice) = self.notice {
            spans.push(Span::from("  "));
            spans.push(Span::styled(notice.text.clone(), notice.style()));
        }
        Line::from(spans)
    }

    fn right(&self, available: usize) -> Line<'static> {
        let mut text = String::new();
        for (key, action) in &self.hints {
            let part = format!("{key} {action}");
            let sep = if text.is_empty() { "" } else { " · " };
            if text.width() + sep.width() + part.width() + 1 > available {
                break;
            }
            text.push_str(sep);
            text.push_str(&part);
        }
        if !text.is_empty() {
            text.push(' ');
        }
        Line::from(text.dim())
    }
}

impl Widget for StatusLine<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let left = self.left();
        let left_width = left.width();
        left.render(area, buf);

        let available = (area.width as usize).saturating_sub(left_width + 2);
        self.right(available).right_aligned().render(area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(buf: &Buffer, area: Rect) -> String {
        (0..area.width)
            .map(|x| buf[(x, area.y)].symbol().to_string())
            .collect()
    }

    fn hints() -> Vec<(String, &'static str)> {
        vec![
            ("enter".to_string(), "send"),
            ("esc".to_string(), "stop"),
            ("ctrl+y".to_string(), "copy"),
        ]
    }

    #[test]
    fn shows_status_notice_and_hints() {
        let area = Rect::new(0, 0, 70, 1);
        let mut buf = Buffer::empty(area);
        let notice = Notice::new("Conversation paused", NoticeTone::Warning, Instant::now());
        StatusLine {
            status: ChatStatus::Stopped,
            notice: Some(&notice),
            hints: hints(),
        }
        .render(area, &mut buf);
        let text = row(&buf, area);
        assert!(text.starts_with(" ⏸ Stopped  Conversation paused"));
        assert!(text.ends_with("enter send · esc stop · ctrl+y copy "));
    }

    #[test]
    fn hints_are_dropped_when_narrow() {
        let area = Rect::new(0, 0, 30, 1);
        let mut buf = Buffer::empty(area);
        StatusLine {
            status: ChatStatus::Ready,
            notice: None,
            hints: hints(),
        }
        .render(area, &mut buf);
        assert_eq!(row(&buf, area), format!(" ● Ready{}enter send ", " ".repeat(11)));
    }

    #[test]
    fn notices_expire_after_three_seconds() {
        let now = Instant::now();
        let notice = Notice::new("Copied code block", NoticeTone::Success, now);
        assert!(!notice.is_expired(now + Duration::from_millis(2999)));
        assert!(notice.is_expired(now + NOTICE_TTL));
    }
}
