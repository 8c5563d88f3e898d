use crate::error::SubmitError;
use crate::service::TaskService;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use taskq_protocol::{
    Message, MessageCodec, NackKind, ProtocolError, SubmitTaskResponse, TaskListResponse,
    WorkerListResponse,
};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// TCP front of a [`TaskService`]: submissions and status queries.
pub struct ControlServer {
    service: TaskService,
    shutdown: CancellationToken,
}

impl ControlServer {
    pub fn new(service: TaskService) -> Self {
        ControlServer {
            service,
            shutdown: CancellationToken::new(),
        }
    }

    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("Control server listening on {}", addr);
        }

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            debug!("New control connection from {}", addr);
                            let server = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream).await {
                                    error!("Control connection error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = self.shutdown.cancelled() => {
                    info!("Control server stopped");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_connection(&self, stream: TcpStream) -> anyhow::Result<()> {
        let mut framed = Framed::new(stream, MessageCodec);

        loop {
            let next = tokio::select! {
                next = framed.next() => next,
                _ = self.shutdown.cancelled() => break,
            };

            match next {
                Some(Ok(message)) => {
                    let response = self.handle_message(message).await;
                    match framed.send(response).await {
                        Ok(()) => {}
                        // nothing was written, the connection is still usable
                        Err(e @ ProtocolError::MessageTooLarge(_)) => {
                            error!("Reply not sent: {}", e);
                            framed.send(Message::nack(NackKind::Internal, e.to_string())).await?;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Some(Err(e)) => {
                    error!("Protocol error: {}", e);
                    break;
                }
                None => break,
            }
        }

        Ok(())
    }

    async fn handle_message(&self, message: Message) -> Message {
        match message {
            Message::SubmitTask(req) => match self.service.submit(req.submission).await {
                Ok(task) => Message::Submitted(SubmitTaskResponse { task }),
                Err(SubmitError::Validation(e)) => Message::nack(NackKind::Validation, e.to_string()),
                Err(e @ SubmitError::Broker(_)) => Message::nack(NackKind::Unavailable, e.to_string()),
                Err(e) => Message::nack(NackKind::Internal, e.to_string()),
            },
            Message::ListTasks(req) => match self.service.list_tasks(req.status) {
                Ok(tasks) => Message::TaskList(TaskListResponse::page(tasks, req.offset)),
                Err(e) => Message::nack(NackKind::Internal, e.to_string()),
            },
            Message::ListWorkers(_) => Message::WorkerList(WorkerListResponse {
                workers: self.service.list_workers(),
            }),
            Message::Depth(_) => match self.service.queue_depth().await {
                Ok(depth) => Message::QueueDepth(depth),
                Err(e) => Message::nack(NackKind::Unavailable, e.to_string()),
            },
            Message::Ping(_) => Message::ack("pong"),
            other => Message::nack(
                NackKind::Validation,
                format!("Unsupported message type: {:?}", other.message_type()),
            ),
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
