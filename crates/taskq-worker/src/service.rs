use crate::error::SubmitError;
use crate::registry::WorkerRegistry;
use std::sync::Arc;
use taskq_broker::{BrokerError, PriorityQueue};
use taskq_core::{Backoff, NewTask, Task, TaskStatus};
use taskq_persistence::{PersistenceError, TaskStore};
use taskq_protocol::QueueDepth;
use tracing::{info, warn};

/// Producer submission and status queries of a node.
#[derive(Clone)]
pub struct TaskService {
    queue: PriorityQueue,
    store: Arc<dyn TaskStore>,
    registry: Arc<WorkerRegistry>,
    enqueue_attempts: u32,
    backoff: Backoff,
}

impl TaskService {
    pub fn new(queue: PriorityQueue, store: Arc<dyn TaskStore>, registry: Arc<WorkerRegistry>) -> Self {
        TaskService {
            queue,
            store,
            registry,
            enqueue_attempts: 10,
            backoff: Backoff::default(),
        }
    }

    /// Retry transient enqueue failures `attempts` times, `backoff` apart
    pub fn with_enqueue_retry(mut self, attempts: u32, backoff: Backoff) -> Self {
        self.enqueue_attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Validate, record and queue a submission.
    ///
    /// The task is persisted before it is queued. If queueing keeps failing
    /// the record stays `pending` and the caller gets [`SubmitError::Broker`].
    pub async fn submit(&self, submission: NewTask) -> Result<Task, SubmitError> {
        let task = submission.validate()?;
        self.store.insert_task(&task)?;

        let mut attempt = 0;
        loop {
            match self.queue.enqueue(&task).await {
                Ok(()) => break,
                Err(e) if e.is_transient() && attempt + 1 < self.enqueue_attempts => {
                    warn!(task = %task.id, attempt = attempt + 1, "Enqueue failed: {}", e);
                    tokio::time::sleep(self.backoff.delay(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(task = %task.id, tier = %task.priority, "Task submitted");
        Ok(task)
    }

    /// All persisted tasks, oldest first, optionally of one status
    pub fn list_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<Task>, PersistenceError> {
        match status {
            Some(status) => self.store.list_by_status(status),
            None => self.store.list_tasks(),
        }
    }

    pub fn list_workers(&self) -> Vec<String> {
        self.registry.list_active()
    }

    pub async fn queue_depth(&self) -> Result<QueueDepth, BrokerError> {
        self.queue.depth().await
    }
}
