//! Cancellable repeating timers.
//!
//! The typewriter never sleeps itself. It asks a [`TickScheduler`] for a
//! repeating timer, and the owner of the event loop feeds each tick back in
//! with the [`TimerId`] it belongs to. A tick whose id has been cancelled is
//! stale and must be ignored by the receiver, since a cancel can race with a
//! tick already queued.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

pub trait TickScheduler {
    /// Start a timer firing every `interval` until cancelled.
    fn start(&mut self, interval: Duration) -> TimerId;

    /// Stop a timer. Cancelling an unknown or already-cancelled id is a no-op.
    fn cancel(&mut self, id: TimerId);
}

/// Scheduler that never fires on its own; the caller delivers ticks.
///
/// A headless driver: tests and non-interactive front ends step the pipeline
/// deterministically by feeding [`active_timer`](Self::active_timer) back in.
/// Pairs with [`RecordingSurface`](crate::surface::RecordingSurface).
#[derive(Debug, Default)]
pub struct ManualScheduler {
    next_id: u64,
    active: Vec<(TimerId, Duration)>,
    started: usize,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently started timer that is still live.
    pub fn active_timer(&self) -> Option<TimerId> {
        self.active.last().map(|(id, _)| *id)
    }

    pub fn live_timers(&self) -> usize {
        self.active.len()
    }

    pub fn interval_of(&self, id: TimerId) -> Option<Duration> {
        self.active
            .iter()
            .find(|(active, _)| *active == id)
            .map(|(_, interval)| *interval)
    }

    /// Total timers ever started.
    pub fn started(&self) -> usize {
        self.started
    }
}

impl TickScheduler for ManualScheduler {
    fn start(&mut self, interval: Duration) -> TimerId {
        self.next_id += 1;
        self.started += 1;
        let id = TimerId(self.next_id);
        self.active.push((id, interval));
        id
    }

    fn cancel(&mut self, id: TimerId) {
        self.active.retain(|(active, _)| *active != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cancel_removes_only_that_timer() {
        let mut scheduler = ManualScheduler::new();
        let first = scheduler.start(Duration::from_millis(30));
        let second = scheduler.start(Duration::from_millis(15));
        scheduler.cancel(first);
        scheduler.cancel(first);
        assert_eq!(scheduler.active_timer(), Some(second));
        assert_eq!(scheduler.interval_of(second), Some(Duration::from_millis(15)));
        assert_eq!(scheduler.live_timers(), 1);
        assert_eq!(scheduler.started(), 2);
    }
}
