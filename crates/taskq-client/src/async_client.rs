use crate::{ClientError, Result};
use taskq_core::{NewTask, Task, TaskStatus};
use taskq_protocol::{
    DepthRequest, ListTasksRequest, ListWorkersRequest, Message, MessageCodec, NackKind, NackResponse,
    PingRequest, QueueDepth, SubmitTaskRequest,
};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

/// Async client for a node's control surface
pub struct TaskQueueAsyncClient {
    address: String,
}

impl TaskQueueAsyncClient {
    /// Connect to a node, checking it answers
    pub async fn connect(address: impl Into<String>) -> Result<Self> {
        let client = TaskQueueAsyncClient {
            address: address.into(),
        };

        match client.request(Message::Ping(PingRequest)).await? {
            Message::Ack(_) => Ok(client),
            other => Err(unexpected(other)),
        }
    }

    async fn request(&self, message: Message) -> Result<Message> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| ClientError::ConnectionError(e.to_string()))?;

        let mut framed = Framed::new(stream, MessageCodec);
        framed
            .send(message)
            .await
            .map_err(|e| ClientError::ProtocolError(e.to_string()))?;

        match framed.next().await {
            Some(Ok(Message::Nack(nack))) => Err(refused(nack)),
            Some(Ok(response)) => Ok(response),
            Some(Err(e)) => Err(ClientError::ProtocolError(e.to_string())),
            None => Err(ClientError::ConnectionError("Connection closed".to_string())),
        }
    }

    /// Submit a payload at priority 1 (low) to 3 (high); low when `None`
    pub async fn submit_task(&self, payload: impl Into<String>, priority: Option<u8>) -> Result<Task> {
        self.submit(NewTask {
            payload: Some(payload.into()),
            priority,
        })
        .await
    }

    pub async fn submit(&self, submission: NewTask) -> Result<Task> {
        match self
            .request(Message::SubmitTask(SubmitTaskRequest { submission }))
            .await?
        {
            Message::Submitted(resp) => {
                debug!(task = %resp.task.id, "Task submitted");
                Ok(resp.task)
            }
            other => Err(unexpected(other)),
        }
    }

    /// Persisted tasks, oldest first; only those in `status` when given.
    /// Follows the node's pages until the last one.
    pub async fn list_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        let mut offset = 0;

        loop {
            match self.request(Message::ListTasks(ListTasksRequest { status, offset })).await? {
                Message::TaskList(resp) => {
                    tasks.extend(resp.tasks);
                    match resp.next_offset {
                        Some(next) if next > offset => offset = next,
                        Some(next) => {
                            return Err(ClientError::ProtocolError(format!(
                                "Task list page did not advance (offset {})",
                                next
                            )))
                        }
                        None => return Ok(tasks),
                    }
                }
                other => return Err(unexpected(other)),
            }
        }
    }

    pub async fn list_workers(&self) -> Result<Vec<String>> {
        match self.request(Message::ListWorkers(ListWorkersRequest)).await? {
            Message::WorkerList(resp) => Ok(resp.workers),
            other => Err(unexpected(other)),
        }
    }

    pub async fn queue_depth(&self) -> Result<QueueDepth> {
        match self.request(Message::Depth(DepthRequest)).await? {
            Message::QueueDepth(depth) => Ok(depth),
            other => Err(unexpected(other)),
        }
    }
}

fn refused(nack: NackResponse) -> ClientError {
    match nack.kind {
        NackKind::Validation => ClientError::Rejected(nack.error),
        NackKind::Unavailable | NackKind::Internal => ClientError::ServerError(nack.error),
    }
}

fn unexpected(message: Message) -> ClientError {
    ClientError::ProtocolError(format!("Unexpected response: {:?}", message.message_type()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use taskq_broker::PriorityQueue;
    use taskq_core::Priority;
    use taskq_persistence::MemoryTaskStore;
    use taskq_worker::{ControlServer, TaskService, WorkerRegistry};
    use tokio::net::TcpListener;

    async fn start_node() -> (Arc<ControlServer>, String) {
        let registry = Arc::new(WorkerRegistry::new());
        registry.register("worker-1");
        registry.register("worker-2");
        let service = TaskService::new(
            PriorityQueue::in_memory(),
            Arc::new(MemoryTaskStore::new()),
            registry,
        );
        let server = Arc::new(ControlServer::new(service));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(server.clone().serve(listener));
        (server, addr)
    }

    #[tokio::test]
    async fn test_submit_and_list() {
        let (server, addr) = start_node().await;
        let client = TaskQueueAsyncClient::connect(addr).await.unwrap();

        let high = client.submit_task("urgent", Some(3)).await.unwrap();
        let low = client.submit_task("whenever", None).await.unwrap();
        assert_eq!(high.priority, Priority::High);
        assert_eq!(low.priority, Priority::Low);

        let tasks = client.list_tasks(None).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert!(client.list_tasks(Some(TaskStatus::Failed)).await.unwrap().is_empty());

        let depth = client.queue_depth().await.unwrap();
        assert_eq!((depth.high, depth.medium, depth.low), (1, 0, 1));

        assert_eq!(client.list_workers().await.unwrap(), vec!["worker-1", "worker-2"]);

        server.shutdown();
    }

    #[tokio::test]
    async fn test_list_tasks_spanning_pages() {
        let (server, addr) = start_node().await;
        let client = TaskQueueAsyncClient::connect(addr).await.unwrap();
        let payload = "q".repeat(6 * 1024 * 1024);

        let first = client.submit_task(payload.clone(), Some(1)).await.unwrap();
        let second = client.submit_task(payload, Some(3)).await.unwrap();

        let tasks = client.list_tasks(None).await.unwrap();
        let ids: Vec<_> = tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first.id) && ids.contains(&second.id));

        server.shutdown();
    }

    #[tokio::test]
    async fn test_validation_error_is_rejected() {
        let (server, addr) = start_node().await;
        let client = TaskQueueAsyncClient::connect(addr).await.unwrap();

        let err = client.submit_task("", Some(2)).await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected(_)));

        let err = client.submit_task("x", Some(4)).await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected(_)));

        assert!(client.list_tasks(None).await.unwrap().is_empty());
        server.shutdown();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert!(matches!(
            TaskQueueAsyncClient::connect(addr).await,
            Err(ClientError::ConnectionError(_))
        ));
    }
}
