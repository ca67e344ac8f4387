//! Single-pane message input with a character budget.

use ratatui::buffer::Buffer;
use ratatui::layout::Position;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::style::Stylize;
use ratatui::text::Line;
use ratatui::text::Span;
use ratatui::widgets::Paragraph;
use ratatui::widgets::Widget;
use unicode_width::UnicodeWidthStr;

const PROMPT: &str = "› ";
const MAX_VISIBLE_LINES: usize = 6;
/// Fractions of the limit at which the counter turns yellow and then red.
const WARN_RATIO: (usize, usize) = (3, 4);
const ALERT_RATIO: (usize, usize) = (9, 10);

#[derive(Debug)]
pub(crate) struct Composer {
    text: String,
    /// Byte offset into `text`, always on a char boundary.
    cursor: usize,
    char_limit: usize,
}

impl Composer {
    pub(crate) fn new(char_limit: usize) -> Self {
        Self {
            text: String::new(),
            cursor: 0,
            char_limit,
        }
    }

    pub(crate) fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Inserts as much of `input` as fits under the limit. Returns false when
    /// anything was cut off.
    pub(crate) fn insert_str(&mut self, input: &str) -> bool {
        let room = self.char_limit.saturating_sub(self.char_count());
        let normalized = input.replace("\r\n", "\n").replace('\r', "\n");
        let accepted: String = normalized.chars().take(room).collect();
        self.text.insert_str(self.cursor, &accepted);
        self.cursor += accepted.len();
        accepted.len() == normalized.len()
    }

    pub(crate) fn insert_char(&mut self, ch: char) -> bool {
        let mut buf = [0u8; 4];
        self.insert_str(ch.encode_utf8(&mut buf))
    }

    pub(crate) fn backspace(&mut self) {
        if let Some(prev) = self.prev_boundary() {
            self.text.replace_range(prev..self.cursor, "");
            self.cursor = prev;
        }
    }

    pub(crate) fn delete_forward(&mut self) {
        if let Some(next) = self.next_boundary() {
            self.text.replace_range(self.cursor..next, "");
        }
    }

    pub(crate) fn move_left(&mut self) {
        if let Some(prev) = self.prev_boundary() {
            self.cursor = prev;
        }
    }

    pub(crate) fn move_right(&mut self) {
        if let Some(next) = self.next_boundary() {
            self.cursor = next;
        }
    }

    pub(crate) fn move_line_start(&mut self) {
        self.cursor = self.text[..self.cursor].rfind('\n').map_or(0, |idx| idx + 1);
    }

    pub(crate) fn move_line_end(&mut self) {
        self.cursor = self.text[self.cursor..]
            .find('\n')
            .map_or(self.text.len(), |idx| self.cursor + idx);
    }

    /// Takes the current text, leaving the composer empty.
    pub(crate) fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }

    fn prev_boundary(&self) -> Option<usize> {
        self.text[..self.cursor]
            .char_indices()
            .next_back()
            .map(|(idx, _)| idx)
    }

    fn next_boundary(&self) -> Option<usize> {
        self.text[self.cursor..]
            .chars()
            .next()
            .map(|ch| self.cursor + ch.len_utf8())
    }

    fn line_count(&self) -> usize {
        self.text.split('\n').count()
    }

    /// Text rows plus the counter row.
    pub(crate) fn desired_height(&self) -> u16 {
        let rows = self.line_count().min(MAX_VISIBLE_LINES) + 1;
        u16::try_from(rows).unwrap_or(u16::MAX)
    }

    pub(crate) fn counter_style(&self) -> Style {
        let count = self.char_count();
        let limit = self.char_limit;
        if count * ALERT_RATIO.1 > limit * ALERT_RATIO.0 {
            Style::new().red()
        } else if count * WARN_RATIO.1 > limit * WARN_RATIO.0 {
            Style::new().yellow()
        } else {
            Style::new().dim()
        }
    }

    fn cursor_row_col(&self) -> (usize, usize) {
        let before = &self.text[..self.cursor];
        let row = before.matches('\n').count();
        let line_start = before.rfind('\n').map_or(0, |idx| idx + 1);
        (row, before[line_start..].width())
    }

    fn first_visible_row(&self) -> usize {
        let (row, _) = self.cursor_row_col();
        row.saturating_sub(MAX_VISIBLE_LINES - 1)
    }

    pub(crate) fn cursor_position(&self, area: Rect) -> Option<Position> {
        if area.height < 2 {
            return None;
        }
        let (row, col) = self.cursor_row_col();
        let visible_row = row - self.first_visible_row();
        let x = area.x as usize + PROMPT.width() + col;
        let y = area.y as usize + visible_row;
        let x = u16::try_from(x).ok()?.min(area.right().saturating_sub(1));
        let y = u16::try_from(y).ok()?;
        Some(Position::new(x, y))
    }

    pub(crate) fn render(&self, area: Rect, buf: &mut Buffer, placeholder: &str) {
        if area.height == 0 {
            return;
        }
        let text_rows = area.height.saturating_sub(1) as usize;
        let lines: Vec<Line<'static>> = if self.text.is_empty() {
            vec![Line::from(vec![PROMPT.cyan(), placeholder.to_string().dim()])]
        } else {
            self.text
                .split('\n')
                .skip(self.first_visible_row())
                .take(text_rows)
                .enumerate()
                .map(|(index, line)| {
                    let lead = if index == 0 && self.first_visible_row() == 0 {
                        PROMPT.cyan()
                    } else {
                        Span::from(" ".repeat(PROMPT.width()))
                    };
                    Line::from(vec![lead, Span::from(line.to_string())])
                })
                .collect()
        };
        let text_area = Rect {
            height: area.height.saturating_sub(1),
            ..area
        };
        Paragraph::new(lines).render(text_area, buf);

        let counter = Line::from(vec![Span::styled(
            format!("{}/{}", self.char_count(), self.char_limit),
            self.counter_style(),
        )])
        .right_aligned();
        let counter_area = Rect {
            y: area.bottom().saturating_sub(1),
            height: 1,
            ..area
        };
        counter.render(counter_area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn inserts_and_edits_at_the_cursor() {
        let mut composer = Composer::new(2000);
        composer.insert_str("helo");
        composer.move_left();
        composer.insert_char('l');
        assert_eq!(composer.text(), "hello");
        composer.backspace();
        composer.backspace();
        assert_eq!(composer.text(), "heo");
        composer.delete_forward();
        assert_eq!(composer.text(), "he");
    }

    #[test]
    fn multibyte_characters_are_edited_whole() {
        let mut composer = Composer::new(2000);
        composer.insert_str("añb");
        composer.move_left();
        composer.backspace();
        assert_eq!(composer.text(), "ab");
        assert_eq!(composer.char_count(), 2);
    }

    #[test]
    fn input_is_capped_at_the_limit() {
        let mut composer = Composer::new(5);
        assert!(composer.insert_str("abc"));
        assert!(!composer.insert_str("defgh"));
        assert_eq!(composer.text(), "abcde");
        assert!(!composer.insert_char('x'));
        assert_eq!(composer.char_count(), 5);
    }

    #[test]
    fn pasted_carriage_returns_become_newlines() {
        let mut composer = Composer::new(2000);
        composer.insert_str("a\r\nb\rc");
        assert_eq!(composer.text(), "a\nb\nc");
        assert_eq!(composer.desired_height(), 4);
    }

    #[test]
    fn line_start_and_end_stay_on_the_current_line() {
        let mut composer = Composer::new(2000);
        composer.insert_str("first\nsecond");
        composer.move_line_start();
        composer.insert_char('>');
        composer.move_line_end();
        composer.insert_char('!');
        assert_eq!(composer.text(), "first\n>second!");
    }

    #[test]
    fn take_clears_the_buffer() {
        let mut composer = Composer::new(2000);
        composer.insert_str("  hi  ");
        assert_eq!(composer.take(), "  hi  ");
        assert_eq!(composer.text(), "");
        composer.insert_char('x');
        assert_eq!(composer.text(), "x");
    }

    #[test]
    fn counter_changes_color_near_the_limit() {
        let mut composer = Composer::new(2000);
        composer.insert_str(&"a".repeat(1500));
        assert_eq!(composer.counter_style(), Style::new().dim());
        composer.insert_char('a');
        assert_eq!(composer.counter_style(), Style::new().yellow());
        composer.insert_str(&"a".repeat(299));
        assert_eq!(composer.counter_style(), Style::new().yellow());
        composer.insert_char('a');
        assert_eq!(composer.counter_style(), Style::new().red());
    }

    #[test]
    fn renders_prompt_and_counter() {
        let mut composer = Composer::new(2000);
        composer.insert_str("hey");
        let area = Rect::new(0, 0, 20, 2);
        let mut buf = Buffer::empty(area);
        composer.render(area, &mut buf, "Ask anything");
        let row = |y: u16| {
            (0..area.width)
                .map(|x| buf[(x, y)].symbol().to_string())
                .collect::<String>()
        };
        assert_eq!(row(0).trim_end(), "› hey");
        assert_eq!(row(1).trim_start(), "3/2000");
        assert_eq!(
            composer.cursor_position(area),
            Some(Position::new(5, 0))
        );
    }
}
