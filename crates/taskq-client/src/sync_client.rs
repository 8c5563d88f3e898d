use crate::async_client::TaskQueueAsyncClient;
use crate::{ClientError, Result};
use taskq_core::{NewTask, Task, TaskStatus};
use taskq_protocol::QueueDepth;

/// Synchronous client (wraps the async client)
pub struct TaskQueueClient {
    runtime: tokio::runtime::Runtime,
    inner: TaskQueueAsyncClient,
}

impl TaskQueueClient {
    /// Connect to a node's control surface
    pub fn connect(address: impl Into<String>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ClientError::ConnectionError(e.to_string()))?;
        let inner = runtime.block_on(TaskQueueAsyncClient::connect(address))?;

        Ok(TaskQueueClient { runtime, inner })
    }

    pub fn submit_task(&self, payload: impl Into<String>, priority: Option<u8>) -> Result<Task> {
        self.runtime.block_on(self.inner.submit_task(payload, priority))
    }

    pub fn submit(&self, submission: NewTask) -> Result<Task> {
        self.runtime.block_on(self.inner.submit(submission))
    }

    pub fn list_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<Task>> {
        self.runtime.block_on(self.inner.list_tasks(status))
    }

    pub fn list_workers(&self) -> Result<Vec<String>> {
        self.runtime.block_on(self.inner.list_workers())
    }

    pub fn queue_depth(&self) -> Result<QueueDepth> {
        self.runtime.block_on(self.inner.queue_depth())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use taskq_broker::PriorityQueue;
    use taskq_persistence::MemoryTaskStore;
    use taskq_worker::{ControlServer, TaskService, WorkerRegistry};

    #[test]
    fn test_sync_client() {
        let server_runtime = tokio::runtime::Runtime::new().unwrap();
        let addr = server_runtime.block_on(async {
            let service = TaskService::new(
                PriorityQueue::in_memory(),
                Arc::new(MemoryTaskStore::new()),
                Arc::new(WorkerRegistry::new()),
            );
            let server = Arc::new(ControlServer::new(service));
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap().to_string();
            tokio::spawn(server.serve(listener));
            addr
        });

        let client = TaskQueueClient::connect(addr).unwrap();
        let task = client.submit_task("blocking", Some(2)).unwrap();

        assert_eq!(client.list_tasks(Some(TaskStatus::Pending)).unwrap(), vec![task]);
        assert_eq!(client.queue_depth().unwrap().medium, 1);
        assert!(client.list_workers().unwrap().is_empty());
    }
}
