//! Conversation state machine tying the typewriter, history and status
//! together.
//!
//! The runtime drives a [`ChatSession`] with user actions, decoded frames
//! and timer ticks, always on one task. Frames and stream notices carry the
//! [`RequestId`] they belong to so that anything still in flight from an
//! abandoned request is dropped.

use chatline_protocol::ChatRequest;
use chatline_protocol::StreamFrame;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::Config;
use crate::error::SendRejected;
use crate::history::ConversationHistory;
use crate::scheduler::TickScheduler;
use crate::scheduler::TimerId;
use crate::session::SessionId;
use crate::streaming::FinishedReply;
use crate::streaming::TickOutcome;
use crate::streaming::TypewriterController;
use crate::surface::ChatStatus;
use crate::surface::ChatSurface;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A request the runtime should now put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRequest {
    pub id: RequestId,
    pub session_id: SessionId,
    pub body: ChatRequest,
}

/// Returned by [`ChatSession::cancel`]: abort the read loop for `request`
/// and tell the backend to stop generating for `session_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopDirective {
    pub request: RequestId,
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Streaming(RequestId),
    /// End of stream seen; the typewriter is catching up.
    Draining(RequestId),
}

pub struct ChatSession<S> {
    session_id: SessionId,
    history: ConversationHistory,
    history_window: usize,
    typewriter: TypewriterController,
    scheduler: S,
    phase: Phase,
    next_request: u64,
}

impl<S: TickScheduler> ChatSession<S> {
    pub fn new(session_id: SessionId, config: &Config, scheduler: S) -> Self {
        Self {
            session_id,
            history: ConversationHistory::new(),
            history_window: config.history_window,
            typewriter: TypewriterController::new(config.pacing),
            scheduler,
            phase: Phase::Idle,
            next_request: 0,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn typewriter(&self) -> &TypewriterController {
        &self.typewriter
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// A reply is streaming or draining.
    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.phase, Phase::Streaming(_))
    }

    /// Whether frames for `request` should still be processed.
    pub fn is_current(&self, request: RequestId) -> bool {
        match self.phase {
            Phase::Streaming(current) | Phase::Draining(current) => current == request,
            Phase::Idle => false,
        }
    }

    /// Record the user's message and open the reply it will receive.
    pub fn begin_send(
        &mut self,
        input: &str,
        surface: &mut dyn ChatSurface,
    ) -> Result<OutgoingRequest, SendRejected> {
        let message = input.trim();
        if message.is_empty() {
            return Err(SendRejected::Empty);
        }
        if self.is_busy() {
            return Err(SendRejected::Busy);
        }

        self.history.push_user(message);
        surface.user_message(message);

        self.next_request += 1;
        let id = RequestId(self.next_request);
        self.phase = Phase::Streaming(id);
        self.typewriter.begin(&mut self.scheduler);
        surface.open_assistant_message();
        surface.set_status(ChatStatus::Streaming);
        info!(request = id.0, chars = message.chars().count(), "sending message");

        Ok(OutgoingRequest {
            id,
            session_id: self.session_id.clone(),
            body: ChatRequest {
                message: message.to_string(),
                history: self.history.window(self.history_window),
                stream: true,
            },
        })
    }

    pub fn handle_frame(
        &mut self,
        request: RequestId,
        frame: StreamFrame,
        surface: &mut dyn ChatSurface,
    ) {
        if self.phase != Phase::Streaming(request) {
            debug!(request = request.0, "frame for inactive request dropped");
            return;
        }
        match frame {
            StreamFrame::ContentDelta(delta) => {
                self.typewriter
                    .push_delta(&delta, &mut self.scheduler, surface);
            }
            StreamFrame::Error(message) => {
                warn!(request = request.0, "error frame: {message}");
                self.report_failure(&message, surface);
            }
            StreamFrame::EndOfStream => self.end_stream(request, surface),
        }
    }

    /// The body ended. Without a preceding end-of-stream frame this is still
    /// treated as a normal end.
    pub fn stream_closed(&mut self, request: RequestId, surface: &mut dyn ChatSurface) {
        if self.phase == Phase::Streaming(request) {
            warn!(request = request.0, "stream closed without an end marker");
            self.end_stream(request, surface);
        }
    }

    /// The transport failed for `request`.
    pub fn stream_failed(
        &mut self,
        request: RequestId,
        message: &str,
        surface: &mut dyn ChatSurface,
    ) {
        if self.phase == Phase::Streaming(request) {
            self.report_failure(&format!("Connection failed: {message}"), surface);
        } else {
            debug!(request = request.0, "failure for inactive request ignored: {message}");
        }
    }

    pub fn handle_tick(&mut self, id: TimerId, surface: &mut dyn ChatSurface) {
        let outcome = self.typewriter.on_tick(id, &mut self.scheduler, surface);
        if outcome == TickOutcome::Drained
            && let Phase::Draining(request) = self.phase
        {
            self.complete(request, surface);
        }
    }

    /// Stop the reply in progress. Only meaningful while streaming; returns
    /// what the runtime must do to tear down the request.
    pub fn cancel(&mut self, surface: &mut dyn ChatSurface) -> Option<StopDirective> {
        let Phase::Streaming(request) = self.phase else {
            return None;
        };

        let reply = self.typewriter.interrupt(&mut self.scheduler, surface);
        self.record_reply(reply);
        self.phase = Phase::Idle;
        surface.set_status(ChatStatus::Stopped);
        info!(request = request.0, "reply stopped by user");

        Some(StopDirective {
            request,
            session_id: self.session_id.clone(),
        })
    }

    /// Single entry point for anything that went wrong: error frames,
    /// transport failures and failures caught by the runtime's error
    /// boundary. Any pending reply is replaced by `message` and discarded.
    pub fn report_failure(&mut self, message: &str, surface: &mut dyn ChatSurface) {
        warn!("reporting failure: {message}");
        self.typewriter.fail(message, &mut self.scheduler, surface);
        self.phase = Phase::Idle;
        surface.set_status(ChatStatus::Error);
    }

    fn end_stream(&mut self, request: RequestId, surface: &mut dyn ChatSurface) {
        if self.typewriter.finish(&mut self.scheduler, surface) {
            self.complete(request, surface);
        } else {
            self.phase = Phase::Draining(request);
        }
    }

    fn complete(&mut self, request: RequestId, surface: &mut dyn ChatSurface) {
        let reply = self.typewriter.complete(&mut self.scheduler, surface);
        self.record_reply(reply);
        self.phase = Phase::Idle;
        surface.set_status(ChatStatus::Ready);
        info!(request = request.0, "reply complete");
    }

    fn record_reply(&mut self, reply: Option<FinishedReply>) {
        match reply {
            Some(FinishedReply { text }) if !text.trim().is_empty() => {
                self.history.push_assistant(text);
            }
            _ => debug!("empty reply not added to history"),
        }
    }
}
