use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use chatline_core::ChatSession;
use chatline_core::Config;
use chatline_core::OutgoingRequest;
use chatline_core::RequestId;
use chatline_core::SessionId;
use chatline_core::error::SendRejected;
use chatline_core::surface::ChatStatus;
use chatline_core::surface::ChatSurface;
use chatline_core::transport::ChatTransport;
use chatline_protocol::ChatRequest;
use chatline_protocol::HealthStatus;
use chatline_protocol::StopAck;
use color_eyre::Result;
use crossterm::event::Event;
use crossterm::event::EventStream;
use crossterm::event::KeyCode;
use crossterm::event::KeyEvent;
use crossterm::event::KeyEventKind;
use crossterm::event::KeyModifiers;
use ratatui::Frame;
use ratatui::layout::Constraint;
use ratatui::layout::Layout;
use ratatui::layout::Rect;
use ratatui::style::Stylize;
use ratatui::text::Line;
use ratatui::text::Span;
use ratatui::widgets::Paragraph;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::AbortHandle;
use tokio_stream::StreamExt;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::app_event::AppEvent;
use crate::app_event_sender::AppEventSender;
use crate::clipboard::Clipboard;
use crate::composer::Composer;
use crate::keymap::ChatKeymap;
use crate::keymap::KeyBindingSet;
use crate::status_line::Notice;
use crate::status_line::NoticeTone;
use crate::status_line::StatusLine;
use crate::tokio_scheduler::TokioScheduler;
use crate::transcript::Transcript;
use crate::tui::Tui;

/// Expires badges and notices and refreshes relative timestamps.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_millis(500);
const PLACEHOLDER: &str = "Ask anything";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connection {
    Unknown,
    Healthy,
    Unreachable,
}

pub(crate) struct App {
    config: Config,
    keymap: ChatKeymap,
    transport: Arc<dyn ChatTransport>,
    session: ChatSession<TokioScheduler>,
    transcript: Transcript,
    composer: Composer,
    clipboard: Clipboard,
    app_event_tx: AppEventSender,
    /// Read loop of the reply being streamed.
    reader: Option<AbortHandle>,
    notice: Option<Notice>,
    connection: Connection,
    /// Rows scrolled back from the newest content.
    scroll_back: usize,
    transcript_height: u16,
    should_quit: bool,
}

impl App {
    pub(crate) fn new(
        config: Config,
        keymap: ChatKeymap,
        transport: Arc<dyn ChatTransport>,
        app_event_tx: AppEventSender,
    ) -> Self {
        let session_id = SessionId::generate();
        info!(session = %session_id, server = %config.server_url, "starting chat session");
        let scheduler = TokioScheduler::new(app_event_tx.clone());
        let session = ChatSession::new(session_id, &config, scheduler);
        let composer = Composer::new(config.input_char_limit);
        Self {
            config,
            keymap,
            transport,
            session,
            transcript: Transcript::new(),
            composer,
            clipboard: Clipboard::new(),
            app_event_tx,
            reader: None,
            notice: None,
            connection: Connection::Unknown,
            scroll_back: 0,
            transcript_height: 0,
            should_quit: false,
        }
    }

    pub(crate) async fn run(
        &mut self,
        tui: &mut Tui,
        mut app_event_rx: UnboundedReceiver<AppEvent>,
    ) -> Result<()> {
        let mut events = EventStream::new();
        let mut housekeeping = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        self.check_health();
        tui.draw(|frame| self.render(frame))?;

        while !self.should_quit {
            tokio::select! {
                Some(event) = events.next() => self.handle_terminal_event(event?),
                Some(event) = app_event_rx.recv() => self.handle_app_event(event),
                _ = housekeeping.tick() => self.housekeeping(Instant::now()),
            }
            tui.draw(|frame| self.render(frame))?;
        }

        if self.session.is_streaming() {
            self.stop();
        }
        Ok(())
    }

    fn handle_terminal_event(&mut self, event: Event) {
        match event {
            Event::Key(key_event) => self.handle_key(key_event),
            Event::Paste(text) => {
                if !self.composer.insert_str(&text) {
                    self.notify_limit();
                }
            }
            Event::Resize(..) | Event::FocusGained | Event::FocusLost | Event::Mouse(_) => {}
        }
    }

    fn handle_key(&mut self, key_event: KeyEvent) {
        if key_event.kind == KeyEventKind::Release {
            return;
        }

        if self.keymap.quit.matches(key_event) {
            if self.session.is_streaming() {
                self.stop();
            } else {
                self.should_quit = true;
            }
            return;
        }
        if self.keymap.stop.matches(key_event) {
            self.stop();
            return;
        }
        if self.keymap.copy_code.matches(key_event) {
            self.copy_last_code_block();
            return;
        }
        if self.keymap.scroll_up.matches(key_event) {
            self.scroll_back = self.scroll_back.saturating_add(self.page_rows());
            return;
        }
        if self.keymap.scroll_down.matches(key_event) {
            self.scroll_back = self.scroll_back.saturating_sub(self.page_rows());
            return;
        }
        if self.keymap.newline.matches(key_event) {
            if !self.composer.insert_char('\n') {
                self.notify_limit();
            }
            return;
        }
        if self.keymap.send.matches(key_event) {
            self.submit();
            return;
        }

        match key_event.code {
            KeyCode::Backspace => self.composer.backspace(),
            KeyCode::Delete => self.composer.delete_forward(),
            KeyCode::Left => self.composer.move_left(),
            KeyCode::Right => self.composer.move_right(),
            KeyCode::Home => self.composer.move_line_start(),
            KeyCode::End => self.composer.move_line_end(),
            KeyCode::Char(ch)
                if !key_event
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                if !self.composer.insert_char(ch) {
                    self.notify_limit();
                }
            }
            _ => {}
        }
    }

    fn submit(&mut self) {
        let input = self.composer.text().to_string();
        match self.session.begin_send(&input, &mut self.transcript) {
            Ok(outgoing) => {
                self.composer.take();
                self.scroll_back = 0;
                self.spawn_reader(outgoing);
            }
            Err(SendRejected::Empty) => {}
            Err(SendRejected::Busy) => {
                self.notify("Wait for the current reply to finish", NoticeTone::Info);
            }
        }
    }

    fn spawn_reader(&mut self, outgoing: OutgoingRequest) {
        let transport = Arc::clone(&self.transport);
        let tx = self.app_event_tx.clone();
        let handle = self.app_event_tx.spawn_guarded("chat stream", async move {
            forward_stream(transport.as_ref(), outgoing, &tx).await;
            Ok(())
        });
        self.reader = Some(handle);
    }

    /// Cancels the streaming reply locally right away, then asks the backend
    /// to stop generating.
    fn stop(&mut self) {
        let Some(directive) = self.session.cancel(&mut self.transcript) else {
            return;
        };
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.notify("Conversation paused", NoticeTone::Warning);

        let transport = Arc::clone(&self.transport);
        let tx = self.app_event_tx.clone();
        let session_id = directive.session_id;
        self.app_event_tx.spawn_guarded("stop request", async move {
            let result = transport
                .post_stop(&session_id)
                .await
                .map_err(|err| err.to_string());
            tx.send(AppEvent::StopFinished(result));
            Ok(())
        });
    }

    fn check_health(&mut self) {
        let transport = Arc::clone(&self.transport);
        let tx = self.app_event_tx.clone();
        self.app_event_tx.spawn_guarded("health check", async move {
            let result = transport.health().await.map_err(|err| err.to_string());
            tx.send(AppEvent::HealthChecked(result));
            Ok(())
        });
    }

    fn handle_app_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Tick(id) => self.session.handle_tick(id, &mut self.transcript),
            AppEvent::Frame { request, frame } => {
                self.session.handle_frame(request, frame, &mut self.transcript);
            }
            AppEvent::StreamEnded { request } => {
                self.session.stream_closed(request, &mut self.transcript);
            }
            AppEvent::StreamFailed { request, message } => {
                self.session
                    .stream_failed(request, &message, &mut self.transcript);
            }
            AppEvent::StopFinished(result) => self.on_stop_finished(result),
            AppEvent::HealthChecked(result) => self.on_health_checked(result),
            AppEvent::TaskFailed(message) => {
                self.session.report_failure(&message, &mut self.transcript);
            }
        }
    }

    fn on_stop_finished(&mut self, result: Result<StopAck, String>) {
        let failure = match result {
            Ok(ack) if ack.success => {
                debug!(message = ?ack.message, "backend acknowledged stop");
                return;
            }
            Ok(ack) => ack
                .message
                .unwrap_or_else(|| "backend refused to stop".to_string()),
            Err(err) => err,
        };
        warn!("stop request failed: {failure}");
        self.notify("Stop request failed", NoticeTone::Error);
        if !self.session.is_busy() {
            self.transcript.set_status(ChatStatus::Error);
        }
    }

    fn on_health_checked(&mut self, result: Result<HealthStatus, String>) {
        match result {
            Ok(status) if status.is_ok() => {
                info!(service = ?status.service, "backend is healthy");
                self.connection = Connection::Healthy;
            }
            Ok(status) => {
                warn!(status = %status.status, "backend reported unhealthy");
                self.connection = Connection::Unreachable;
                self.notify("Server reports a problem", NoticeTone::Warning);
            }
            Err(err) => {
                warn!("health check failed: {err}");
                self.connection = Connection::Unreachable;
                self.notify(
                    format!("Cannot reach {}", self.config.server_url),
                    NoticeTone::Error,
                );
            }
        }
    }

    fn copy_last_code_block(&mut self) {
        let Some(block) = self.transcript.last_code_block().cloned() else {
            self.notify("No code block to copy", NoticeTone::Info);
            return;
        };
        match self.clipboard.copy(&block.code) {
            Ok(()) => {
                let text = match block.language {
                    Some(language) => format!("Copied {language} code block"),
                    None => "Copied code block".to_string(),
                };
                self.notify(text, NoticeTone::Success);
            }
            Err(err) => {
                warn!("clipboard copy failed: {err}");
                self.notify("Copy failed", NoticeTone::Error);
            }
        }
    }

    fn housekeeping(&mut self, now: Instant) {
        self.transcript.expire_markers(now);
        if self.notice.as_ref().is_some_and(|notice| notice.is_expired(now)) {
            self.notice = None;
        }
    }

    fn notify(&mut self, text: impl Into<String>, tone: NoticeTone) {
        self.notice = Some(Notice::new(text, tone, Instant::now()));
    }

    fn notify_limit(&mut self) {
        let limit = self.config.input_char_limit;
        self.notify(
            format!("Messages are limited to {limit} characters"),
            NoticeTone::Warning,
        );
    }

    fn page_rows(&self) -> usize {
        usize::from(self.transcript_height.saturating_sub(2).max(1))
    }

    fn hints(&self) -> Vec<(String, &'static str)> {
        let hint = |set: &KeyBindingSet, action: &'static str| {
            set.primary().map(|chord| (chord.to_string(), action))
        };
        let stop_or_send = if self.session.is_streaming() {
            hint(&self.keymap.stop, "stop")
        } else {
            hint(&self.keymap.send, "send")
        };
        [
            stop_or_send,
            hint(&self.keymap.newline, "newline"),
            hint(&self.keymap.copy_code, "copy code"),
            hint(&self.keymap.scroll_up, "scroll"),
            hint(&self.keymap.quit, "quit"),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn render(&mut self, frame: &mut Frame) {
        let [header_area, transcript_area, status_area, composer_area] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
            Constraint::Length(self.composer.desired_height()),
        ])
        .areas(frame.area());

        frame.render_widget(self.header(), header_area);

        self.transcript_height = transcript_area.height;
        if self.transcript.is_empty() {
            render_welcome(frame, transcript_area);
        } else {
            self.transcript
                .render(transcript_area, frame.buffer_mut(), &mut self.scroll_back);
        }

        frame.render_widget(
            StatusLine {
                status: self.transcript.status(),
                notice: self.notice.as_ref(),
                hints: self.hints(),
            },
            status_area,
        );

        self.composer
            .render(composer_area, frame.buffer_mut(), PLACEHOLDER);
        if let Some(position) = self.composer.cursor_position(composer_area) {
            frame.set_cursor_position(position);
        }
    }

    fn header(&self) -> Line<'static> {
        let dot = match self.connection {
            Connection::Unknown => "○".dim(),
            Connection::Healthy => "●".green(),
            Connection::Unreachable => "●".red(),
        };
        let mut spans = vec![
            Span::from(" "),
            "chatline".bold(),
            Span::from("  "),
            dot,
            Span::from(" "),
            self.config.server_url.to_string().dim(),
        ];
        if self.scroll_back > 0 {
            spans.push(Span::from("  "));
            spans.push(format!("↑{} rows", self.scroll_back).yellow());
        }
        Line::from(spans)
    }
}

fn render_welcome(frame: &mut Frame, area: Rect) {
    let lines = vec![
        Line::from("Welcome to chatline".bold()),
        Line::from("Type a message below and press enter.".dim()),
    ];
    let top = area.height.saturating_sub(2) / 2;
    let area = Rect {
        y: area.y + top,
        height: area.height.saturating_sub(top),
        ..area
    };
    frame.render_widget(Paragraph::new(lines).centered(), area);
}

/// Reads one reply and forwards its frames to the UI loop, stopping after the
/// first terminal frame.
async fn forward_stream(
    transport: &dyn ChatTransport,
    outgoing: OutgoingRequest,
    tx: &AppEventSender,
) {
    let OutgoingRequest {
        id: request,
        session_id,
        body,
    } = outgoing;
    debug!(request = request.raw(), turns = body.history.len(), "posting chat request");
    let mut frames = match transport.post_chat_stream(&session_id, &body).await {
        Ok(frames) => frames,
        Err(err) => {
            send_failure(tx, request, &body, err.to_string());
            return;
        }
    };

    while let Some(item) = frames.next().await {
        match item {
            Ok(frame) => {
                let terminal = frame.is_terminal();
                tx.send(AppEvent::Frame { request, frame });
                if terminal {
                    return;
                }
            }
            Err(err) => {
                send_failure(tx, request, &body, err.to_string());
                return;
            }
        }
    }
    tx.send(AppEvent::StreamEnded { request });
}

fn send_failure(tx: &AppEventSender, request: RequestId, body: &ChatRequest, message: String) {
    warn!(request = request.raw(), chars = body.message.len(), "chat request failed: {message}");
    tx.send(AppEvent::StreamFailed { request, message });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chatline_core::config::ConfigOverrides;
    use chatline_core::config::ConfigToml;
    use chatline_core::error::TransportError;
    use chatline_core::transport::FrameResultStream;
    use chatline_protocol::StreamFrame;
    use futures::stream;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use tokio::sync::mpsc::unbounded_channel;

    /// Replays canned frames; stop always succeeds and health always fails.
    #[derive(Default)]
    struct ScriptedTransport {
        frames: Vec<StreamFrame>,
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn post_chat_stream(
            &self,
            _session: &SessionId,
            _request: &ChatRequest,
        ) -> chatline_core::error::Result<FrameResultStream> {
            let frames: Vec<chatline_core::error::Result<StreamFrame>> =
                self.frames.iter().cloned().map(Ok).collect();
            Ok(Box::pin(stream::iter(frames)))
        }

        async fn post_stop(&self, session: &SessionId) -> chatline_core::error::Result<StopAck> {
            Ok(StopAck {
                success: true,
                message: None,
                session_id: Some(session.to_string()),
            })
        }

        async fn health(&self) -> chatline_core::error::Result<HealthStatus> {
            Err(TransportError::Read("offline".to_string()))
        }
    }

    fn config() -> Config {
        match Config::from_toml(
            ConfigToml::default(),
            ConfigOverrides::default(),
            PathBuf::from("/tmp/chatline-test"),
        ) {
            Ok(config) => config,
            Err(err) => panic!("default config should load: {err}"),
        }
    }

    fn app_with(transport: ScriptedTransport) -> (App, UnboundedReceiver<AppEvent>) {
        let (tx, rx) = unbounded_channel();
        let keymap = match ChatKeymap::from_overrides(&BTreeMap::new()) {
            Ok(keymap) => keymap,
            Err(err) => panic!("default keymap: {err}"),
        };
        let app = App::new(config(), keymap, Arc::new(transport), AppEventSender::new(tx));
        (app, rx)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(app: &mut App, text: &str) {
        for ch in text.chars() {
            app.handle_key(key(KeyCode::Char(ch)));
        }
    }

    #[tokio::test]
    async fn forward_stream_stops_after_terminal_frame() {
        let transport = ScriptedTransport {
            frames: vec![
                StreamFrame::ContentDelta("Hi".to_string()),
                StreamFrame::EndOfStream,
                StreamFrame::ContentDelta("ignored".to_string()),
            ],
        };
        let (tx, mut rx) = unbounded_channel();
        let sender = AppEventSender::new(tx);
        let (mut app, _app_rx) = app_with(ScriptedTransport::default());
        let outgoing = match app.session.begin_send("hello", &mut app.transcript) {
            Ok(outgoing) => outgoing,
            Err(err) => panic!("send rejected: {err}"),
        };
        forward_stream(&transport, outgoing, &sender).await;
        drop(sender);

        let mut frames = Vec::new();
        while let Some(event) = rx.recv().await {
            if let AppEvent::Frame { frame, .. } = event {
                frames.push(frame);
            }
        }
        assert_eq!(
            frames,
            vec![
                StreamFrame::ContentDelta("Hi".to_string()),
                StreamFrame::EndOfStream
            ]
        );
    }

    #[tokio::test]
    async fn enter_sends_and_clears_the_composer() {
        let (mut app, _rx) = app_with(ScriptedTransport::default());
        type_text(&mut app, "  hi there ");
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.composer.text(), "");
        assert!(app.session.is_streaming());
        assert_eq!(app.transcript.status(), ChatStatus::Streaming);
        assert!(app.reader.is_some());
    }

    #[tokio::test]
    async fn blank_input_is_not_sent() {
        let (mut app, _rx) = app_with(ScriptedTransport::default());
        type_text(&mut app, "   ");
        app.handle_key(key(KeyCode::Enter));
        assert!(!app.session.is_busy());
        assert!(app.transcript.is_empty());
    }

    #[tokio::test]
    async fn escape_stops_a_streaming_reply() {
        let (mut app, mut rx) = app_with(ScriptedTransport::default());
        type_text(&mut app, "hello");
        app.handle_key(key(KeyCode::Enter));
        app.handle_key(key(KeyCode::Esc));
        assert!(!app.session.is_busy());
        assert!(app.reader.is_none());
        assert_eq!(app.transcript.status(), ChatStatus::Stopped);
        assert_eq!(
            app.notice.as_ref().map(|notice| notice.text.as_str()),
            Some("Conversation paused")
        );

        let ack = loop {
            match rx.recv().await {
                Some(AppEvent::StopFinished(result)) => break result,
                Some(_) => continue,
                None => panic!("channel closed before the stop finished"),
            }
        };
        let session_id = app.session.session_id().to_string();
        assert_eq!(
            ack.map(|ack| ack.session_id),
            Ok(Some(session_id))
        );
    }

    #[tokio::test]
    async fn ctrl_c_quits_when_idle() {
        let (mut app, _rx) = app_with(ScriptedTransport::default());
        app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn failed_stop_ack_surfaces_a_notice() {
        let (mut app, _rx) = app_with(ScriptedTransport::default());
        app.handle_app_event(AppEvent::StopFinished(Err("connection refused".to_string())));
        assert_eq!(
            app.notice.as_ref().map(|notice| notice.text.as_str()),
            Some("Stop request failed")
        );
        assert_eq!(app.transcript.status(), ChatStatus::Error);
    }

    #[tokio::test]
    async fn unreachable_backend_is_flagged() {
        let (mut app, _rx) = app_with(ScriptedTransport::default());
        app.handle_app_event(AppEvent::HealthChecked(Err("refused".to_string())));
        assert_eq!(app.connection, Connection::Unreachable);
        assert_eq!(
            app.notice.as_ref().map(|notice| notice.text.as_str()),
            Some("Cannot reach http://localhost:8999")
        );
    }

    #[tokio::test]
    async fn task_failures_reach_the_transcript() {
        let (mut app, _rx) = app_with(ScriptedTransport::default());
        app.handle_app_event(AppEvent::TaskFailed("Unexpected error: boom".to_string()));
        assert_eq!(app.transcript.status(), ChatStatus::Error);
        assert!(!app.transcript.is_empty());
    }

    #[tokio::test]
    async fn input_over_the_limit_is_refused_with_a_notice() {
        let (mut app, _rx) = app_with(ScriptedTransport::default());
        app.handle_terminal_event(Event::Paste("x".repeat(2001)));
        assert_eq!(app.composer.char_count(), 2000);
        assert_eq!(
            app.notice.as_ref().map(|notice| notice.text.as_str()),
            Some("Messages are limited to 2000 characters")
        );
    }
}
