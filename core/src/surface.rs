use std::time::Duration;

use chrono::DateTime;
use chrono::Local;

use crate::error::RenderError;

/// Connection/activity state shown next to the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStatus {
    Ready,
    Streaming,
    /// The user stopped the last reply.
    Stopped,
    Error,
}

/// Badge attached to a finished assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Reply ended normally. The badge removes itself after `expires_after`.
    Completed { expires_after: Duration },
    /// Reply was cut short by the user.
    Interrupted,
}

/// Everything the pipeline needs from whatever displays the conversation.
///
/// At most one assistant message is open at a time. The body methods
/// (`show_plain`, `show_markdown`, `show_error`, `set_cursor`) and the
/// decorations (`attach_marker`, `stamp`) always address that open message.
pub trait ChatSurface {
    fn user_message(&mut self, text: &str);

    /// Open an empty assistant message with a typing indicator.
    fn open_assistant_message(&mut self);

    /// Replace the open message's body with unformatted text.
    fn show_plain(&mut self, text: &str);

    /// Replace the open message's body with laid-out markdown.
    fn show_markdown(&mut self, text: &str) -> Result<(), RenderError>;

    fn set_cursor(&mut self, visible: bool);

    fn attach_marker(&mut self, marker: Marker);

    fn stamp(&mut self, at: DateTime<Local>);

    /// Show `message` styled as an error: in place of the open message's body
    /// if one is open, otherwise as a new standalone message.
    fn show_error(&mut self, message: &str);

    fn close_assistant_message(&mut self);

    fn set_status(&mut self, status: ChatStatus);
}

/// How a recorded message body was last presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedBody {
    Typing,
    Plain(String),
    Markdown(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMessage {
    pub from_user: bool,
    pub body: RecordedBody,
    pub cursor: bool,
    pub markers: Vec<Marker>,
    pub stamped: bool,
}

/// In-memory [`ChatSurface`] that keeps the resulting transcript and a count
/// of body updates.
///
/// Pair with [`ManualScheduler`](crate::scheduler::ManualScheduler) to drive a
/// [`ChatSession`](crate::ChatSession) headless, e.g. from tests or a
/// non-interactive front end. Nothing is drawn.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub messages: Vec<RecordedMessage>,
    pub status: Option<ChatStatus>,
    pub plain_renders: usize,
    pub markdown_renders: usize,
    /// Make every `show_markdown` call fail.
    pub fail_markdown: bool,
    open: Option<usize>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_assistant(&self) -> Option<&RecordedMessage> {
        self.messages.iter().rev().find(|message| !message.from_user)
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    fn open_message(&mut self) -> Option<&mut RecordedMessage> {
        let index = self.open?;
        self.messages.get_mut(index)
    }
}

impl ChatSurface for RecordingSurface {
    fn user_message(&mut self, text: &str) {
        self.messages.push(RecordedMessage {
            from_user: true,
            body: RecordedBody::Markdown(text.to_string()),
            cursor: false,
            markers: Vec::new(),
            stamped: true,
        });
    }

    fn open_assistant_message(&mut self) {
        self.messages.push(RecordedMessage {
            from_user: false,
            body: RecordedBody::Typing,
            cursor: false,
            markers: Vec::new(),
            stamped: false,
        });
        self.open = Some(self.messages.len() - 1);
    }

    fn show_plain(&mut self, text: &str) {
        self.plain_renders += 1;
        if let Some(message) = self.open_message() {
            message.body = RecordedBody::Plain(text.to_string());
        }
    }

    fn show_markdown(&mut self, text: &str) -> Result<(), RenderError> {
        if self.fail_markdown {
            return Err(RenderError("forced failure".to_string()));
        }
        self.markdown_renders += 1;
        if let Some(message) = self.open_message() {
            message.body = RecordedBody::Markdown(text.to_string());
        }
        Ok(())
    }

    fn set_cursor(&mut self, visible: bool) {
        if let Some(message) = self.open_message() {
            message.cursor = visible;
        }
    }

    fn attach_marker(&mut self, marker: Marker) {
        if let Some(message) = self.open_message() {
            message.markers.push(marker);
        }
    }

    fn stamp(&mut self, _at: DateTime<Local>) {
        if let Some(message) = self.open_message() {
            message.stamped = true;
        }
    }

    fn show_error(&mut self, text: &str) {
        if let Some(message) = self.open_message() {
            message.body = RecordedBody::Error(text.to_string());
            message.cursor = false;
            return;
        }
        self.messages.push(RecordedMessage {
            from_user: false,
            body: RecordedBody::Error(text.to_string()),
            cursor: false,
            markers: Vec::new(),
            stamped: true,
        });
    }

    fn close_assistant_message(&mut self) {
        self.open = None;
    }

    fn set_status(&mut self, status: ChatStatus) {
        self.status = Some(status);
    }
}
