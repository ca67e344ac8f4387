use std::time::Instant;

use chatline_core::error::RenderError;
use chatline_core::surface::ChatStatus;
use chatline_core::surface::ChatSurface;
use chatline_core::surface::Marker;
use chatline_protocol::Role;
use chrono::DateTime;
use chrono::Local;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Stylize;
use ratatui::text::Line;
use ratatui::text::Span;
use ratatui::widgets::Paragraph;
use ratatui::widgets::Widget;
use ratatui::widgets::Wrap;
use tracing::warn;

use crate::markdown::render_message;
use crate::markdown_render::CodeBlock;
use crate::time_format::relative_label;

const CURSOR_GLYPH: &str = "▌";
const TYPING_TEXT: &str = "typing…";

#[derive(Debug, Clone)]
enum Body {
    Typing,
    Plain(String),
    Markdown(Vec<Line<'static>>),
    Error(String),
}

#[derive(Debug, Clone)]
struct MessageCell {
    role: Role,
    body: Body,
    cursor: bool,
    completed_until: Option<Instant>,
    interrupted: bool,
    stamped_at: Option<DateTime<Local>>,
}

impl MessageCell {
    fn new(role: Role, body: Body) -> Self {
        Self {
            role,
            body,
            cursor: false,
            completed_until: None,
            interrupted: false,
            stamped_at: None,
        }
    }

    fn header(&self, now: DateTime<Local>, instant: Instant) -> Line<'static> {
        let mut spans = match self.role {
            Role::User => vec!["you".cyan().bold()],
            Role::Assistant => vec!["assistant".magenta().bold()],
        };
        if let Some(at) = self.stamped_at {
            spans.push(Span::from(" · ").dim());
            spans.push(relative_label(at, now).dim());
        }
        if self.completed_until.is_some_and(|until| instant < until) {
            spans.push(Span::from(" "));
            spans.push("✓".green());
        }
        if self.interrupted {
            spans.push(Span::from(" "));
            spans.push("⏸ stopped".yellow());
        }
        Line::from(spans)
    }

    fn body_lines(&self) -> Vec<Line<'static>> {
        let mut lines = match &self.body {
            Body::Typing => vec![Line::from(TYPING_TEXT.dim().italic())],
            Body::Plain(text) => text
                .split('\n')
                .map(|line| Line::from(line.to_string()))
                .collect(),
            Body::Markdown(lines) => lines.clone(),
            Body::Error(message) => message
                .split('\n')
                .map(|line| Line::from(line.to_string().red()))
                .collect(),
        };
        if self.cursor {
            match lines.last_mut() {
                Some(last) => last.push_span(CURSOR_GLYPH.cyan()),
                None => lines.push(Line::from(CURSOR_GLYPH.cyan())),
            }
        }
        lines
    }
}

/// The conversation as shown on screen.
#[derive(Debug)]
pub(crate) struct Transcript {
    cells: Vec<MessageCell>,
    open: Option<usize>,
    status: ChatStatus,
    last_code_block: Option<CodeBlock>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    pub(crate) fn new() -> Self {
        Self {
            cells: Vec::new(),
            open: None,
            status: ChatStatus::Ready,
            last_code_block: None,
        }
    }

    pub(crate) fn status(&self) -> ChatStatus {
        self.status
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The most recently rendered code block.
    pub(crate) fn last_code_block(&self) -> Option<&CodeBlock> {
        self.last_code_block.as_ref()
    }

    /// Drops completion badges whose time is up. Returns true when anything
    /// changed.
    pub(crate) fn expire_markers(&mut self, instant: Instant) -> bool {
        let mut changed = false;
        for cell in &mut self.cells {
            if cell.completed_until.is_some_and(|until| until <= instant) {
                cell.completed_until = None;
                changed = true;
            }
        }
        changed
    }

    pub(crate) fn lines(&self, now: DateTime<Local>, instant: Instant) -> Vec<Line<'static>> {
        let mut lines = Vec::new();
        for (index, cell) in self.cells.iter().enumerate() {
            if index > 0 {
                lines.push(Line::default());
            }
            lines.push(cell.header(now, instant));
            lines.extend(cell.body_lines());
        }
        lines
    }

    /// Renders the newest content at the bottom of `area`. `scroll_back` is
    /// the distance in rows from the bottom and is clamped to what exists.
    ///
    /// Lines above the viewport are skipped before layout, so the remaining
    /// scroll offset is always smaller than one line's wrapped height.
    pub(crate) fn render(&self, area: Rect, buf: &mut Buffer, scroll_back: &mut usize) {
        let lines = self.lines(Local::now(), Instant::now());
        let heights: Vec<usize> = lines
            .iter()
            .map(|line| wrapped_height(line, area.width))
            .collect();
        let total: usize = heights.iter().sum();
        let max_back = total.saturating_sub(usize::from(area.height));
        *scroll_back = (*scroll_back).min(max_back);
        let top = max_back - *scroll_back;

        let mut row = 0;
        let mut first = lines.len();
        let mut offset = 0;
        for (index, height) in heights.iter().enumerate() {
            if row + height > top {
                first = index;
                offset = top - row;
                break;
            }
            row += height;
        }
        let visible: Vec<Line<'static>> = lines.into_iter().skip(first).collect();
        Paragraph::new(visible)
            .wrap(Wrap { trim: false })
            .scroll((u16::try_from(offset).unwrap_or(u16::MAX), 0))
            .render(area, buf);
    }

    fn open_cell(&mut self) -> Option<&mut MessageCell> {
        let index = self.open?;
        self.cells.get_mut(index)
    }

    fn remember_code_block(&mut self, block: Option<CodeBlock>) {
        if let Some(block) = block {
            self.last_code_block = Some(block);
        }
    }
}

impl ChatSurface for Transcript {
    fn user_message(&mut self, text: &str) {
        let (body, code) = match render_message(text) {
            Ok(rendered) => (
                Body::Markdown(rendered.lines),
                rendered.code_blocks.into_iter().last(),
            ),
            Err(err) => {
                warn!("user message shown as plain text: {err}");
                (Body::Plain(text.to_string()), None)
            }
        };
        let mut cell = MessageCell::new(Role::User, body);
        cell.stamped_at = Some(Local::now());
        self.cells.push(cell);
        self.remember_code_block(code);
    }

    fn open_assistant_message(&mut self) {
        self.cells.push(MessageCell::new(Role::Assistant, Body::Typing));
        self.open = Some(self.cells.len() - 1);
    }

    fn show_plain(&mut self, text: &str) {
        if let Some(cell) = self.open_cell() {
            cell.body = Body::Plain(text.to_string());
        }
    }

    fn show_markdown(&mut self, text: &str) -> Result<(), RenderError> {
        let rendered = render_message(text)?;
        let code = rendered.code_blocks.into_iter().last();
        if let Some(cell) = self.open_cell() {
            cell.body = Body::Markdown(rendered.lines);
        }
        self.remember_code_block(code);
        Ok(())
    }

    fn set_cursor(&mut self, visible: bool) {
        if let Some(cell) = self.open_cell() {
            cell.cursor = visible;
        }
    }

    fn attach_marker(&mut self, marker: Marker) {
        if let Some(cell) = self.open_cell() {
            match marker {
                Marker::Completed { expires_after } => {
                    cell.completed_until = Some(Instant::now() + expires_after);
                }
                Marker::Interrupted => cell.interrupted = true,
            }
        }
    }

    fn stamp(&mut self, at: DateTime<Local>) {
        if let Some(cell) = self.open_cell() {
            cell.stamped_at = Some(at);
        }
    }

    fn show_error(&mut self, message: &str) {
        if let Some(cell) = self.open_cell() {
            cell.body = Body::Error(message.to_string());
            cell.cursor = false;
            return;
        }
        let mut cell = MessageCell::new(Role::Assistant, Body::Error(message.to_string()));
        cell.stamped_at = Some(Local::now());
        self.cells.push(cell);
    }

    fn close_assistant_message(&mut self) {
        if let Some(cell) = self.open_cell() {
            cell.cursor = false;
        }
        self.open = None;
    }

    fn set_status(&mut self, status: ChatStatus) {
        self.status = status;
    }
}

fn wrapped_height(line: &Line<'static>, width: u16) -> usize {
    Paragraph::new(line.clone())
        .wrap(Wrap { trim: false })
        .line_count(width)
}
