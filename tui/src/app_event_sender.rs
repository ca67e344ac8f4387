use std::future::Future;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;

use crate::app_event::AppEvent;

#[derive(Clone, Debug)]
pub(crate) struct AppEventSender {
    app_event_tx: UnboundedSender<AppEvent>,
}

impl AppEventSender {
    pub(crate) fn new(app_event_tx: UnboundedSender<AppEvent>) -> Self {
        Self { app_event_tx }
    }

    /// Send an event to the app event channel. If it fails, we swallow the
    /// error and log it.
    pub(crate) fn send(&self, event: AppEvent) {
        if let Err(e) = self.app_event_tx.send(event) {
            tracing::error!("failed to send event: {e}");
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.app_event_tx.is_closed()
    }

    /// Spawns `task` behind an error boundary: an `Err` result or a panic is
    /// reported as [`AppEvent::TaskFailed`]. Aborting through the returned
    /// handle is silent.
    pub(crate) fn spawn_guarded<F>(&self, label: &'static str, task: F) -> AbortHandle
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let abort = handle.abort_handle();
        let tx = self.clone();
        tokio::spawn(async move {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::error!("{label} failed: {err:#}");
                    tx.send(AppEvent::TaskFailed(format!("Unexpected error: {err}")));
                }
                Err(err) if err.is_cancelled() => {
                    tracing::debug!("{label} aborted");
                }
                Err(err) => {
                    tracing::error!("{label} panicked: {err}");
                    tx.send(AppEvent::TaskFailed(
                        "Unexpected error: background task crashed".to_string(),
                    ));
                }
            }
        });
        abort
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc::unbounded_channel;

    fn failure(event: Option<AppEvent>) -> Option<String> {
        match event {
            Some(AppEvent::TaskFailed(message)) => Some(message),
            _ => None,
        }
    }

    #[tokio::test]
    async fn errors_become_task_failures() {
        let (tx, mut rx) = unbounded_channel();
        let sender = AppEventSender::new(tx);
        sender.spawn_guarded("test task", async { Err(anyhow::anyhow!("boom")) });
        assert_eq!(
            failure(rx.recv().await),
            Some("Unexpected error: boom".to_string())
        );
    }

    #[tokio::test]
    async fn panics_become_task_failures() {
        let (tx, mut rx) = unbounded_channel();
        let sender = AppEventSender::new(tx);
        sender.spawn_guarded("test task", async {
            let parts: Vec<u8> = Vec::new();
            if parts.is_empty() {
                panic!("kaboom");
            }
            Ok(())
        });
        assert_eq!(
            failure(rx.recv().await),
            Some("Unexpected error: background task crashed".to_string())
        );
    }

    #[tokio::test]
    async fn aborted_tasks_report_nothing() {
        let (tx, mut rx) = unbounded_channel();
        let sender = AppEventSender::new(tx);
        let abort = sender.spawn_guarded("test task", async {
            std::future::pending::<()>().await;
            Ok(())
        });
        abort.abort();
        drop(sender);
        assert!(rx.recv().await.is_none());
    }
}
