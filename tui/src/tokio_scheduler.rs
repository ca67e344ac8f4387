use std::collections::HashMap;
use std::time::Duration;

use chatline_core::scheduler::TickScheduler;
use chatline_core::scheduler::TimerId;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;

use crate::app_event::AppEvent;
use crate::app_event_sender::AppEventSender;

/// Shortest period a timer runs at; a zero interval is raised to this.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Repeating timers as spawned tasks that post [`AppEvent::Tick`]. The first
/// tick comes one interval after `start`. A timer task that fails is reported
/// like any other background task.
pub(crate) struct TokioScheduler {
    app_event_tx: AppEventSender,
    next_id: u64,
    timers: HashMap<TimerId, AbortHandle>,
}

impl TokioScheduler {
    pub(crate) fn new(app_event_tx: AppEventSender) -> Self {
        Self {
            app_event_tx,
            next_id: 0,
            timers: HashMap::new(),
        }
    }

    #[cfg(test)]
    fn live_timers(&self) -> usize {
        self.timers.len()
    }
}

impl TickScheduler for TokioScheduler {
    fn start(&mut self, interval: Duration) -> TimerId {
        self.next_id += 1;
        let id = TimerId::new(self.next_id);
        let interval = interval.max(MIN_INTERVAL);
        let tx = self.app_event_tx.clone();
        let handle = self.app_event_tx.spawn_guarded("reveal timer", async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            while !tx.is_closed() {
                ticker.tick().await;
                tx.send(AppEvent::Tick(id));
            }
            Ok(())
        });
        self.timers.insert(id, handle);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::sync::mpsc::unbounded_channel;

    fn drain_ticks(rx: &mut UnboundedReceiver<AppEvent>) -> Vec<TimerId> {
        let mut ticks = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let AppEvent::Tick(id) = event {
                ticks.push(id);
            }
        }
        ticks
    }

    async fn advance(by: Duration) {
        tokio::time::advance(by).await;
        // Let the timer tasks run.
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_arrive_every_interval_after_the_first_delay() {
        let (tx, mut rx) = unbounded_channel();
        let mut scheduler = TokioScheduler::new(AppEventSender::new(tx));
        let id = scheduler.start(Duration::from_millis(30));

        advance(Duration::from_millis(10)).await;
        assert_eq!(drain_ticks(&mut rx), Vec::<TimerId>::new());

        advance(Duration::from_millis(25)).await;
        assert_eq!(drain_ticks(&mut rx), vec![id]);

        advance(Duration::from_millis(30)).await;
        assert_eq!(drain_ticks(&mut rx), vec![id]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timers_stop_ticking() {
        let (tx, mut rx) = unbounded_channel();
        let mut scheduler = TokioScheduler::new(AppEventSender::new(tx));
        let first = scheduler.start(Duration::from_millis(30));
        scheduler.cancel(first);
        let second = scheduler.start(Duration::from_millis(15));
        assert_eq!(scheduler.live_timers(), 1);

        advance(Duration::from_millis(31)).await;
        let ticks = drain_ticks(&mut rx);
        assert!(!ticks.contains(&first));
        assert!(ticks.contains(&second));

        scheduler.cancel(second);
        scheduler.cancel(second);
        advance(Duration::from_millis(60)).await;
        assert_eq!(drain_ticks(&mut rx), Vec::<TimerId>::new());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_ticks_instead_of_failing() {
        let (tx, mut rx) = unbounded_channel();
        let mut scheduler = TokioScheduler::new(AppEventSender::new(tx));
        let id = scheduler.start(Duration::ZERO);

        advance(Duration::from_millis(3)).await;
        let mut ticks = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                AppEvent::Tick(tick) => ticks.push(tick),
                AppEvent::TaskFailed(message) => panic!("timer failed: {message}"),
                _ => {}
            }
        }
        assert!(!ticks.is_empty());
        assert!(ticks.iter().all(|tick| *tick == id));
        assert_eq!(scheduler.live_timers(), 1);
    }
}
