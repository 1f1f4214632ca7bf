//! Shutdown coordination for the service.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to,
/// and keeps the handles of the background tasks it spawned so shutdown can
/// wait for them to finish.
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
    /// Background tasks spawned through this coordinator.
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Resolves once `trigger` has been called.
    pub fn signalled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            let _ = rx.recv().await;
        }
    }

    /// Spawn a background task that is awaited during shutdown.
    ///
    /// The closure receives its own subscription, taken before the task starts,
    /// so a trigger can never be missed.
    pub fn spawn<F, Fut>(&self, name: &'static str, task: F)
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task(self.subscribe()));
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name, handle));
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Trigger shutdown and wait up to `drain` for every spawned task.
    ///
    /// Tasks still running at the deadline are aborted.
    pub async fn drain(&self, drain: Duration) {
        self.trigger();

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for (name, mut handle) in tasks {
            match tokio::time::timeout(drain, &mut handle).await {
                Ok(Ok(())) => tracing::debug!(task = name, "Background task stopped"),
                Ok(Err(e)) => tracing::error!(task = name, error = %e, "Background task failed"),
                Err(_) => {
                    tracing::warn!(task = name, "Background task did not stop in time, aborting");
                    handle.abort();
                }
            }
        }
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_drain_waits_for_tasks() {
        let shutdown = Shutdown::new();
        let stopped = Arc::new(AtomicBool::new(false));

        let flag = stopped.clone();
        shutdown.spawn("worker", move |mut rx| async move {
            let _ = rx.recv().await;
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(shutdown.receiver_count(), 1);

        shutdown.drain(Duration::from_secs(1)).await;
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_aborts_stuck_tasks() {
        let shutdown = Shutdown::new();
        shutdown.spawn("stuck", |_rx| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        shutdown.drain(Duration::from_millis(50)).await;
        assert!(shutdown.tasks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_signalled_resolves_after_trigger() {
        let shutdown = Shutdown::new();
        let signalled = shutdown.signalled();
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), signalled)
            .await
            .expect("signal should be observed");
    }
}
