use crate::config::{BrokerBackend, StoreBackend, WorkerConfig};
use crate::dispatcher::{DispatchContext, DispatchOptions, Dispatcher};
use crate::executor::TaskExecutor;
use crate::processor::{self, TaskProcessor};
use crate::registry::WorkerRegistry;
use crate::service::TaskService;
use crate::shutdown::ShutdownCoordinator;
use crate::{Result, WorkerError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use taskq_broker::{PriorityQueue, RemoteTransport};
use taskq_core::{Backoff, TaskStatus};
use taskq_persistence::{MemoryTaskStore, RocksTaskStore, TaskStore, TaskStoreConfig};
use tracing::{error, info, warn};

/// A worker node: N dispatchers over one queue, one ledger and one registry.
pub struct WorkerNode {
    config: WorkerConfig,
    queue: PriorityQueue,
    store: Arc<dyn TaskStore>,
    registry: Arc<WorkerRegistry>,
    processor: Arc<dyn TaskProcessor>,
    coordinator: ShutdownCoordinator,
}

impl WorkerNode {
    /// Open the ledger and reach the broker. Any failure here is fatal and
    /// leaves nothing running.
    pub async fn connect(config: WorkerConfig) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn TaskStore> = match config.store.backend {
            StoreBackend::Rocksdb => {
                let store = RocksTaskStore::open(TaskStoreConfig {
                    data_dir: config.store.data_dir.clone(),
                })
                .map_err(|e| WorkerError::Startup(format!("cannot open task store: {}", e)))?;
                Arc::new(store)
            }
            StoreBackend::Memory => Arc::new(MemoryTaskStore::new()),
        };
        store
            .list_by_status(TaskStatus::InFlight)
            .map_err(|e| WorkerError::Startup(format!("task store unreadable: {}", e)))?;

        let queue = match config.broker.backend {
            BrokerBackend::Memory => PriorityQueue::in_memory(),
            BrokerBackend::Remote => {
                let transport = RemoteTransport::connect(config.broker.address.clone())
                    .await
                    .map_err(|e| {
                        WorkerError::Startup(format!(
                            "cannot reach broker at {}: {}",
                            config.broker.address, e
                        ))
                    })?;
                info!("Connected to broker at {}", transport.address());
                PriorityQueue::new(Arc::new(transport))
            }
        };

        let processor = processor::from_config(&config.processor);
        Self::with_parts(config, queue, store, processor)
    }

    /// Assemble a node from ready-made parts
    pub fn with_parts(
        config: WorkerConfig,
        queue: PriorityQueue,
        store: Arc<dyn TaskStore>,
        processor: Arc<dyn TaskProcessor>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = match config.liveness_timeout() {
            Some(timeout) => WorkerRegistry::with_liveness_timeout(timeout),
            None => WorkerRegistry::new(),
        };
        let coordinator =
            ShutdownCoordinator::new(Duration::from_secs(config.shutdown.graceful_timeout_secs));

        Ok(WorkerNode {
            config,
            queue,
            store,
            registry: Arc::new(registry),
            processor,
            coordinator,
        })
    }

    pub fn service(&self) -> TaskService {
        TaskService::new(self.queue.clone(), self.store.clone(), self.registry.clone())
            .with_enqueue_retry(self.config.dispatch.enqueue_attempts, Backoff::default())
    }

    pub fn registry(&self) -> Arc<WorkerRegistry> {
        self.registry.clone()
    }

    /// Put every unfinished ledger record back in the queue.
    ///
    /// Records left `in_flight` by a crash are reset to `pending` without
    /// counting an attempt, so a task may run more than once.
    pub async fn recover(&self) -> Result<usize> {
        let mut unfinished = self.store.list_by_status(TaskStatus::Pending)?;
        unfinished.extend(self.store.list_by_status(TaskStatus::InFlight)?);
        unfinished.sort_by_key(|task| task.created_at);

        let mut recovered = 0;
        for mut task in unfinished {
            if task.status == TaskStatus::InFlight {
                task.release()
                    .map_err(|e| WorkerError::Startup(format!("cannot recover task {}: {}", task.id, e)))?;
                self.store.update_status(&task.id, task.status, task.retry_count)?;
            }
            self.queue.enqueue(&task).await?;
            recovered += 1;
        }

        if recovered > 0 {
            info!("Recovered {} unfinished tasks", recovered);
        }
        Ok(recovered)
    }

    fn dispatch_context(&self) -> Result<DispatchContext> {
        Ok(DispatchContext {
            queue: self.queue.clone(),
            store: self.store.clone(),
            registry: self.registry.clone(),
            executor: TaskExecutor::new(self.processor.clone())
                .with_timeout(self.config.task_timeout()),
            policy: self.config.retry_policy()?,
            options: DispatchOptions {
                poll_interval: self.config.poll_interval(),
                persist_attempts: self.config.dispatch.persist_attempts,
                io_backoff: Backoff::default(),
            },
        })
    }

    /// Recover if configured, then spawn the dispatchers and housekeeping
    pub async fn start(&self) -> Result<()> {
        if self.config.recover_on_startup() {
            self.recover().await?;
        }

        let ctx = self.dispatch_context()?;
        for worker_id in self.config.worker_ids() {
            let dispatcher = Dispatcher::new(worker_id, ctx.clone(), self.coordinator.signal());
            self.coordinator.spawn(dispatcher.run());
        }
        info!(
            "Started {} workers (max retries {})",
            self.config.dispatch.concurrency,
            ctx.policy.max_retries()
        );

        if let Some(days) = self.config.store.completed_task_retention_days {
            self.spawn_retention_sweep(days);
        }
        if let Some(timeout) = self.config.liveness_timeout() {
            self.spawn_registry_pruner(timeout);
        }

        Ok(())
    }

    fn spawn_retention_sweep(&self, days: u64) {
        let store = self.store.clone();
        let signal = self.coordinator.signal();
        let interval = Duration::from_secs(self.config.store.retention_sweep_interval_secs.max(1));
        let retention = chrono::Duration::days(i64::try_from(days).unwrap_or(i64::MAX).min(3_650_000));

        self.coordinator.spawn(async move {
            while signal.sleep(interval).await {
                let cutoff = Utc::now() - retention;
                match store.purge_terminal_before(cutoff) {
                    Ok(0) => {}
                    Ok(purged) => info!("Purged {} finished tasks older than {} days", purged, days),
                    Err(e) => error!("Retention sweep failed: {}", e),
                }
            }
        });
    }

    fn spawn_registry_pruner(&self, timeout: Duration) {
        let registry = self.registry.clone();
        let signal = self.coordinator.signal();

        self.coordinator.spawn(async move {
            while signal.sleep(timeout).await {
                let pruned = registry.prune_stale();
                if !pruned.is_empty() {
                    warn!("{} workers stopped reporting", pruned.len());
                }
            }
        });
    }

    /// Raise the shutdown signal and wait for every dispatcher to drain
    pub async fn shutdown(&self) -> usize {
        self.coordinator.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::testing::Recording;
    use crate::processor::EchoProcessor;
    use taskq_core::{NewTask, Priority, Task};
    use tempfile::TempDir;

    fn memory_config(concurrency: usize) -> WorkerConfig {
        let mut config = WorkerConfig::default();
        config.store.backend = StoreBackend::Memory;
        config.dispatch.concurrency = concurrency;
        config.dispatch.poll_interval_ms = 10;
        config
    }

    #[tokio::test]
    async fn test_recovery_requeues_unfinished_tasks() {
        let store = Arc::new(MemoryTaskStore::new());

        let pending = Task::new("pending", Priority::Low);
        let mut in_flight = Task::new("in flight", Priority::High);
        let mut done = Task::new("done", Priority::High);
        for task in [&pending, &in_flight, &done] {
            store.insert_task(task).unwrap();
        }
        in_flight.begin().unwrap();
        store.update_status(&in_flight.id, TaskStatus::InFlight, 1).unwrap();
        done.begin().unwrap();
        store.update_status(&done.id, TaskStatus::Completed, 0).unwrap();

        let queue = PriorityQueue::in_memory();
        let node = WorkerNode::with_parts(memory_config(1), queue.clone(), store.clone(), Arc::new(EchoProcessor)).unwrap();

        assert_eq!(node.recover().await.unwrap(), 2);

        let recovered = store.get_task(&in_flight.id).unwrap().unwrap();
        assert_eq!(recovered.status, TaskStatus::Pending);
        assert_eq!(recovered.retry_count, 1);

        let first = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(first.id, in_flight.id);
        assert_eq!(first.retry_count, 1);
        assert_eq!(queue.dequeue().await.unwrap().unwrap().id, pending.id);
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recovery_requeues_entry_lost_by_pop() {
        let store = Arc::new(MemoryTaskStore::new());
        let queue = PriorityQueue::in_memory();
        let node = WorkerNode::with_parts(memory_config(1), queue.clone(), store.clone(), Arc::new(EchoProcessor)).unwrap();

        let task = node.service().submit(NewTask::new("lost reply", 2)).await.unwrap();
        // popped by a dispatcher that never saw the reply
        assert_eq!(queue.dequeue().await.unwrap().unwrap().id, task.id);
        assert_eq!(store.get_task(&task.id).unwrap().unwrap().status, TaskStatus::Pending);

        assert_eq!(node.recover().await.unwrap(), 1);
        assert_eq!(queue.dequeue().await.unwrap().unwrap().id, task.id);
    }

    #[tokio::test]
    async fn test_node_runs_and_drains() {
        let store = Arc::new(MemoryTaskStore::new());
        let processor = Arc::new(Recording::default());
        let node = WorkerNode::with_parts(
            memory_config(3),
            PriorityQueue::in_memory(),
            store.clone(),
            processor.clone(),
        )
        .unwrap();

        node.start().await.unwrap();
        let service = node.service();
        let task = service.submit(NewTask::new("hello", 2)).await.unwrap();

        for _ in 0..500 {
            if service.list_tasks(Some(TaskStatus::Completed)).unwrap().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(service.list_workers(), vec!["worker-1", "worker-2", "worker-3"]);
        assert_eq!(node.shutdown().await, 3);

        assert_eq!(store.get_task(&task.id).unwrap().unwrap().status, TaskStatus::Completed);
        assert_eq!(processor.seen(), vec!["hello"]);
        assert!(service.list_workers().is_empty());
    }

    #[tokio::test]
    async fn test_connect_with_rocksdb_store() {
        let dir = TempDir::new().unwrap();
        let mut config = memory_config(1);
        config.store.backend = StoreBackend::Rocksdb;
        config.store.data_dir = dir.path().to_path_buf();
        config.processor = crate::config::ProcessorConfig::Echo;

        let node = WorkerNode::connect(config).await.unwrap();
        let task = node.service().submit(NewTask::new("durable", 3)).await.unwrap();
        assert_eq!(node.service().list_tasks(None).unwrap(), vec![task]);
    }

    #[tokio::test]
    async fn test_unreachable_broker_is_fatal() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut config = memory_config(1);
        config.broker.backend = BrokerBackend::Remote;
        config.broker.address = addr;

        assert!(matches!(
            WorkerNode::connect(config).await,
            Err(WorkerError::Startup(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_is_fatal() {
        assert!(matches!(
            WorkerNode::connect(memory_config(0)).await,
            Err(WorkerError::Config(_))
        ));
    }
}
