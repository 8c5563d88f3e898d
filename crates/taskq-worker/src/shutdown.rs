use futures::future::join_all;
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Read side of the node-wide cancellation signal.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Non-blocking check
    pub fn is_raised(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been requested
    pub async fn raised(&self) {
        self.token.cancelled().await
    }

    /// Sleep for `duration` unless shutdown is requested first.
    /// Returns false when the sleep was cut short.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.token.cancelled() => false,
        }
    }
}

/// Broadcasts one cancellation signal to every dispatcher and waits for
/// all of them to finish.
///
/// Shutdown never aborts a task: past `graceful_timeout` the coordinator
/// only logs that it is still waiting.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
    graceful_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(graceful_timeout: Duration) -> Self {
        ShutdownCoordinator {
            token: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
            graceful_timeout,
        }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            token: self.token.clone(),
        }
    }

    /// Spawn a task the shutdown barrier waits for
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handles.lock().push(tokio::spawn(future));
    }

    /// Raise the signal without waiting
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Raise the signal and wait until every spawned task has returned.
    /// Returns the number of tasks joined.
    pub async fn shutdown(&self) -> usize {
        if !self.token.is_cancelled() {
            info!("Shutdown signal raised");
        }
        self.token.cancel();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        let count = handles.len();

        let joined = join_all(handles);
        tokio::pin!(joined);

        let results = match tokio::time::timeout(self.graceful_timeout, &mut joined).await {
            Ok(results) => results,
            Err(_) => {
                warn!(
                    "Workers still draining after {:?}, waiting for in-flight tasks",
                    self.graceful_timeout
                );
                joined.await
            }
        };

        for result in results {
            if let Err(e) = result {
                error!("Worker task ended abnormally: {}", e);
            }
        }

        info!("All workers stopped ({} tasks joined)", count);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_signal_reaches_every_task() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let stopped = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let signal = coordinator.signal();
            let stopped = stopped.clone();
            coordinator.spawn(async move {
                signal.raised().await;
                stopped.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(coordinator.shutdown().await, 4);
        assert_eq!(stopped.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_shutdown_waits_past_graceful_timeout() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(20));
        let finished = Arc::new(AtomicUsize::new(0));

        let signal = coordinator.signal();
        let done = finished.clone();
        coordinator.spawn(async move {
            signal.raised().await;
            tokio::time::sleep(Duration::from_millis(100)).await;
            done.fetch_add(1, Ordering::SeqCst);
        });

        coordinator.shutdown().await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sleep_cut_short() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));
        let signal = coordinator.signal();

        assert!(signal.sleep(Duration::from_millis(1)).await);
        assert!(!signal.is_raised());

        coordinator.trigger();
        assert!(signal.is_raised());
        assert!(!signal.sleep(Duration::from_secs(60)).await);
    }
}
