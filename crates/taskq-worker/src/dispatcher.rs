//! The dispatch loop run by every concurrency slot of a node.
//!
//! ```text
//! register -> [ signal raised? -> dequeue -> execute -> retry policy -> persist ]* -> deregister
//! ```
//!
//! The shutdown signal is only read between iterations, so a task that was
//! dequeued always reaches `completed`, `failed` or is queued again before
//! the dispatcher returns. The one exception is a retry that cannot be queued
//! again before shutdown: it stays `pending` in the ledger for recovery.

use crate::executor::TaskExecutor;
use crate::registry::WorkerRegistry;
use crate::shutdown::ShutdownSignal;
use std::sync::Arc;
use std::time::Duration;
use taskq_broker::PriorityQueue;
use taskq_core::{Backoff, Outcome, RetryPolicy, Task, TaskId, TaskStatus, Transition};
use taskq_persistence::TaskStore;
use tracing::{debug, error, info, warn};

/// Loop tuning shared by all dispatchers of a node
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Sleep between polls of an empty queue
    pub poll_interval: Duration,
    /// Ledger writes tried this many times before giving up
    pub persist_attempts: u32,
    /// Delay between ledger and broker retries
    pub io_backoff: Backoff,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        DispatchOptions {
            poll_interval: Duration::from_secs(1),
            persist_attempts: 5,
            io_backoff: Backoff::default(),
        }
    }
}

/// Everything a dispatcher shares with its siblings.
#[derive(Clone)]
pub struct DispatchContext {
    pub queue: PriorityQueue,
    pub store: Arc<dyn TaskStore>,
    pub registry: Arc<WorkerRegistry>,
    pub executor: TaskExecutor,
    pub policy: RetryPolicy,
    pub options: DispatchOptions,
}

pub struct Dispatcher {
    worker_id: String,
    ctx: DispatchContext,
    signal: ShutdownSignal,
}

impl Dispatcher {
    pub fn new(worker_id: impl Into<String>, ctx: DispatchContext, signal: ShutdownSignal) -> Self {
        Dispatcher {
            worker_id: worker_id.into(),
            ctx,
            signal,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run until the shutdown signal is observed
    pub async fn run(self) {
        self.ctx.registry.register(&self.worker_id);
        info!(worker = %self.worker_id, "Worker registered");

        loop {
            if self.signal.is_raised() {
                info!(worker = %self.worker_id, "Worker stopping gracefully");
                break;
            }
            self.heartbeat(None);

            match self.ctx.queue.dequeue().await {
                Ok(Some(task)) => self.handle(task).await,
                Ok(None) => {
                    self.signal.sleep(self.ctx.options.poll_interval).await;
                }
                Err(e) => {
                    warn!(worker = %self.worker_id, "Dequeue failed: {}", e);
                    self.signal.sleep(self.ctx.options.poll_interval).await;
                }
            }
        }

        self.ctx.registry.deregister(&self.worker_id);
        info!(worker = %self.worker_id, "Worker deregistered");
    }

    async fn handle(&self, mut task: Task) {
        if let Err(e) = task.begin() {
            error!(worker = %self.worker_id, task = %task.id, "Dropping dequeued task: {}", e);
            return;
        }

        self.ctx.registry.assign_task(&self.worker_id, task.id);
        info!(
            worker = %self.worker_id,
            task = %task.id,
            tier = %task.priority,
            retry_count = task.retry_count,
            "Processing task"
        );
        self.persist(&task).await;

        let outcome = self.execute(&task).await;

        match self.ctx.policy.apply(&mut task, &outcome) {
            Ok(Transition::Complete) => {
                self.persist(&task).await;
                info!(worker = %self.worker_id, task = %task.id, "Task completed");
            }
            Ok(Transition::Retry { retry_count, delay }) => {
                self.persist(&task).await;
                warn!(
                    worker = %self.worker_id,
                    task = %task.id,
                    retry_count,
                    "Task failed, will retry"
                );
                if !delay.is_zero() && !self.signal.sleep(delay).await {
                    debug!(task = %task.id, "Retry delay cut short by shutdown");
                }
                self.requeue(&mut task).await;
            }
            Ok(Transition::Fail { retry_count }) => {
                self.persist(&task).await;
                error!(
                    worker = %self.worker_id,
                    task = %task.id,
                    retry_count,
                    "Task failed permanently"
                );
            }
            Err(e) => {
                error!(worker = %self.worker_id, task = %task.id, "Invalid task transition: {}", e);
            }
        }

        self.ctx.registry.clear_task(&self.worker_id);
    }

    /// Run the processor, keeping the registry entry fresh meanwhile so a
    /// long task does not make the worker look dead.
    async fn execute(&self, task: &Task) -> Outcome {
        let execution = self.ctx.executor.execute(task);
        let Some(interval) = self.ctx.registry.heartbeat_interval() else {
            return execution.await;
        };

        tokio::pin!(execution);
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                outcome = &mut execution => return outcome,
                _ = ticker.tick() => self.heartbeat(Some(task.id)),
            }
        }
    }

    /// Refresh this worker's registry entry, registering again if it was pruned
    fn heartbeat(&self, current_task: Option<TaskId>) {
        if self.ctx.registry.touch(&self.worker_id) {
            return;
        }

        warn!(worker = %self.worker_id, "Registry entry expired, registering again");
        self.ctx.registry.register(&self.worker_id);
        if let Some(task_id) = current_task {
            self.ctx.registry.assign_task(&self.worker_id, task_id);
        }
    }

    /// Write the task's status to the ledger, retrying with backoff.
    /// Gives up with an error log after `persist_attempts`.
    async fn persist(&self, task: &Task) {
        let attempts = self.ctx.options.persist_attempts.max(1);

        for attempt in 0..attempts {
            match self.ctx.store.update_status(&task.id, task.status, task.retry_count) {
                Ok(()) => return,
                Err(e) if attempt + 1 < attempts => {
                    warn!(task = %task.id, status = %task.status, attempt = attempt + 1, "Persisting status failed: {}", e);
                    tokio::time::sleep(self.ctx.options.io_backoff.delay(attempt)).await;
                }
                Err(e) => {
                    error!(
                        task = %task.id,
                        status = %task.status,
                        "Giving up persisting status after {} attempts: {}",
                        attempts,
                        e
                    );
                }
            }
        }
    }

    /// Put a pending task back at the tail of its tier.
    ///
    /// Broker outages are retried until the push succeeds. If shutdown comes
    /// first the task stays `pending` in the ledger, where startup recovery
    /// finds it. Only an entry the broker refuses outright fails the task.
    async fn requeue(&self, task: &mut Task) {
        let mut attempt: u32 = 0;

        loop {
            match self.ctx.queue.enqueue(task).await {
                Ok(()) => return,
                Err(e) if e.is_transient() => {
                    warn!(task = %task.id, attempt = attempt + 1, "Re-enqueue failed: {}", e);
                    if !self.signal.sleep(self.ctx.options.io_backoff.delay(attempt)).await {
                        warn!(task = %task.id, "Shutting down before re-enqueue, task left pending for recovery");
                        return;
                    }
                    attempt = attempt.saturating_add(1);
                }
                Err(e) => {
                    error!(task = %task.id, "Broker refused task, marking it failed: {}", e);
                    if let Err(e) = task.begin().and_then(|()| task.transition(TaskStatus::Failed)) {
                        error!(task = %task.id, "Invalid task transition: {}", e);
                        return;
                    }
                    self.persist(task).await;
                    return;
                }
            }
        }
    }
}
