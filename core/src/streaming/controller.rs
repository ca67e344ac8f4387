use chrono::Local;
use tracing::debug;
use tracing::warn;

use super::render_gate::RenderGate;
use super::render_gate::RenderMode;
use crate::accumulator::MessageAccumulator;
use crate::config::PacingConfig;
use crate::scheduler::TickScheduler;
use crate::scheduler::TimerId;
use crate::surface::ChatSurface;
use crate::surface::Marker;

/// State of the single in-flight assistant reply.
///
/// `displayed_chars <= accumulator.char_len()` and
/// `last_markdown_render_len <= displayed_chars` hold at all times.
#[derive(Debug)]
struct PendingMessage {
    accumulator: MessageAccumulator,
    displayed_chars: usize,
    /// Byte offset matching `displayed_chars`.
    displayed_bytes: usize,
    last_markdown_render_len: usize,
    /// Cleared once the stream has ended; further deltas are ignored.
    is_active: bool,
}

impl PendingMessage {
    fn new() -> Self {
        Self {
            accumulator: MessageAccumulator::new(),
            displayed_chars: 0,
            displayed_bytes: 0,
            last_markdown_render_len: 0,
            is_active: true,
        }
    }

    fn hidden_chars(&self) -> usize {
        self.accumulator.char_len() - self.displayed_chars
    }

    fn caught_up(&self) -> bool {
        self.hidden_chars() == 0
    }

    fn visible(&self) -> &str {
        &self.accumulator.text()[..self.displayed_bytes]
    }

    /// Reveal one more char. Returns `false` when already caught up.
    fn reveal_next(&mut self) -> bool {
        let Some(next) = self.accumulator.text()[self.displayed_bytes..].chars().next() else {
            return false;
        };
        self.displayed_bytes += next.len_utf8();
        self.displayed_chars += 1;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerMode {
    Streaming,
    Drain,
}

#[derive(Debug, Clone, Copy)]
struct AdvanceTimer {
    id: TimerId,
    /// Accumulator version this timer was started against.
    target_version: u64,
    mode: TimerMode,
}

/// What a delivered tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not the live timer; nothing happened.
    Stale,
    /// Text arrived since the timer started; the timer stopped itself.
    SelfCancelled,
    Revealed,
    /// Streaming reveal reached the end of what has arrived so far.
    CaughtUp,
    /// Drain after end of stream is complete; the reply can be finalized.
    Drained,
}

/// Reply text handed back when a message is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedReply {
    pub text: String,
}

/// Reveals the accumulated reply one char per tick, choosing plain or
/// markdown presentation at each step.
///
/// Owns the reveal timer. Starting a timer always cancels the previous one
/// first, so at most one is live.
#[derive(Debug)]
pub struct TypewriterController {
    pacing: PacingConfig,
    gate: RenderGate,
    pending: Option<PendingMessage>,
    timer: Option<AdvanceTimer>,
}

impl TypewriterController {
    pub fn new(pacing: PacingConfig) -> Self {
        Self {
            pacing,
            gate: RenderGate::new(pacing.markdown_growth_chars),
            pending: None,
            timer: None,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    pub fn accumulated_text(&self) -> Option<&str> {
        self.pending.as_ref().map(|pending| pending.accumulator.text())
    }

    pub fn displayed_chars(&self) -> Option<usize> {
        self.pending.as_ref().map(|pending| pending.displayed_chars)
    }

    pub fn last_markdown_render_len(&self) -> Option<usize> {
        self.pending
            .as_ref()
            .map(|pending| pending.last_markdown_render_len)
    }

    /// Create the pending message. Any previous one is discarded.
    pub fn begin(&mut self, scheduler: &mut dyn TickScheduler) {
        self.stop_timer(scheduler);
        self.pending = Some(PendingMessage::new());
    }

    pub fn push_delta(
        &mut self,
        delta: &str,
        scheduler: &mut dyn TickScheduler,
        surface: &mut dyn ChatSurface,
    ) {
        let Some(pending) = self.pending.as_mut() else {
            debug!("delta with no pending message dropped");
            return;
        };
        if !pending.is_active {
            debug!("delta after end of stream dropped");
            return;
        }
        if !pending.accumulator.append(delta) {
            return;
        }

        let hidden = pending.hidden_chars();
        if self.timer.is_none() || hidden > self.pacing.restart_gap_chars {
            surface.set_cursor(false);
            self.start_timer(TimerMode::Streaming, scheduler);
        }
    }

    pub fn on_tick(
        &mut self,
        id: TimerId,
        scheduler: &mut dyn TickScheduler,
        surface: &mut dyn ChatSurface,
    ) -> TickOutcome {
        let Some(timer) = self.timer.filter(|timer| timer.id == id) else {
            return TickOutcome::Stale;
        };
        let Some(pending) = self.pending.as_mut() else {
            self.stop_timer(scheduler);
            return TickOutcome::Stale;
        };

        if timer.mode == TimerMode::Streaming
            && timer.target_version != pending.accumulator.version()
        {
            self.stop_timer(scheduler);
            return TickOutcome::SelfCancelled;
        }

        if pending.reveal_next() {
            present(&self.gate, pending, surface);
        }
        if !pending.caught_up() {
            return TickOutcome::Revealed;
        }

        self.stop_timer(scheduler);
        match timer.mode {
            TimerMode::Streaming => {
                surface.set_cursor(true);
                TickOutcome::CaughtUp
            }
            TimerMode::Drain => TickOutcome::Drained,
        }
    }

    /// Mark the stream as ended. Returns `true` when everything is already
    /// visible and the reply can be completed right away; otherwise a drain
    /// timer has been started and [`TickOutcome::Drained`] will follow.
    pub fn finish(
        &mut self,
        scheduler: &mut dyn TickScheduler,
        surface: &mut dyn ChatSurface,
    ) -> bool {
        let Some(pending) = self.pending.as_mut() else {
            return true;
        };
        pending.is_active = false;
        surface.set_cursor(false);
        if pending.caught_up() {
            self.stop_timer(scheduler);
            return true;
        }
        debug!(hidden = pending.hidden_chars(), "draining reply");
        self.start_timer(TimerMode::Drain, scheduler);
        false
    }

    /// Final layout of the full reply, completion badge and timestamp, then
    /// release.
    pub fn complete(
        &mut self,
        scheduler: &mut dyn TickScheduler,
        surface: &mut dyn ChatSurface,
    ) -> Option<FinishedReply> {
        self.stop_timer(scheduler);
        let pending = self.pending.take()?;
        let text = pending.accumulator.into_text();
        surface.set_cursor(false);
        render_full(&text, surface);
        surface.attach_marker(Marker::Completed {
            expires_after: self.pacing.completion_marker_ttl,
        });
        surface.stamp(Local::now());
        surface.close_assistant_message();
        Some(FinishedReply { text })
    }

    /// Stop immediately without draining. Whatever has arrived is laid out
    /// in full, even the part not yet revealed.
    pub fn interrupt(
        &mut self,
        scheduler: &mut dyn TickScheduler,
        surface: &mut dyn ChatSurface,
    ) -> Option<FinishedReply> {
        self.stop_timer(scheduler);
        let pending = self.pending.take()?;
        let text = pending.accumulator.into_text();
        surface.set_cursor(false);
        render_full(&text, surface);
        surface.attach_marker(Marker::Interrupted);
        surface.stamp(Local::now());
        surface.close_assistant_message();
        Some(FinishedReply { text })
    }

    /// Replace the reply with an error. Nothing is salvaged. Returns whether
    /// a reply was pending.
    pub fn fail(
        &mut self,
        message: &str,
        scheduler: &mut dyn TickScheduler,
        surface: &mut dyn ChatSurface,
    ) -> bool {
        self.stop_timer(scheduler);
        let had_pending = self.pending.take().is_some();
        surface.show_error(message);
        if had_pending {
            surface.close_assistant_message();
        }
        had_pending
    }

    fn start_timer(&mut self, mode: TimerMode, scheduler: &mut dyn TickScheduler) {
        self.stop_timer(scheduler);
        let Some(pending) = self.pending.as_ref() else {
            return;
        };
        let interval = match mode {
            TimerMode::Streaming => self.pacing.stream_interval,
            TimerMode::Drain => self.pacing.drain_interval,
        };
        self.timer = Some(AdvanceTimer {
            id: scheduler.start(interval),
            target_version: pending.accumulator.version(),
            mode,
        });
    }

    fn stop_timer(&mut self, scheduler: &mut dyn TickScheduler) {
        if let Some(timer) = self.timer.take() {
            scheduler.cancel(timer.id);
        }
    }
}

fn present(gate: &RenderGate, pending: &mut PendingMessage, surface: &mut dyn ChatSurface) {
    let mode = gate.decide(
        pending.visible(),
        pending.displayed_chars,
        pending.last_markdown_render_len,
    );
    if mode == RenderMode::PlainAppend {
        surface.show_plain(pending.visible());
        return;
    }
    match surface.show_markdown(pending.visible()) {
        Ok(()) => pending.last_markdown_render_len = pending.displayed_chars,
        Err(err) => {
            warn!("{err}; showing plain text");
            surface.show_plain(pending.visible());
        }
    }
}

fn render_full(text: &str, surface: &mut dyn ChatSurface) {
    if let Err(err) = surface.show_markdown(text) {
        warn!("{err}; showing plain text");
        surface.show_plain(text);
    }
}
