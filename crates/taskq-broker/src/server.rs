use crate::{config::BrokerConfig, MemoryTransport};
use taskq_protocol::{Message, MessageCodec, NackKind, PopResponse, PushRequest};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use futures::{SinkExt, StreamExt};

use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Standalone broker: serves the three tier lists over TCP.
pub struct BrokerServer {
    config: Arc<BrokerConfig>,
    transport: Arc<MemoryTransport>,
    connections: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl BrokerServer {
    pub fn new(config: BrokerConfig) -> Self {
        let connections = Arc::new(Semaphore::new(config.broker.max_connections.max(1)));
        BrokerServer {
            config: Arc::new(config),
            transport: Arc::new(MemoryTransport::new()),
            connections,
            shutdown: CancellationToken::new(),
        }
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let addr = self.config.address();
        let listener = TcpListener::bind(&addr).await?;
        info!("Broker listening on {}", addr);
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let permit = match self.connections.clone().try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    warn!("Connection limit reached, refusing {}", addr);
                                    continue;
                                }
                            };
                            debug!("New connection from {}", addr);
                            let server = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream).await {
                                    error!("Connection error: {}", e);
                                }
                                drop(permit);
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = self.shutdown.cancelled() => {
                    info!("Shutting down broker");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a client connection
    async fn handle_connection(&self, stream: TcpStream) -> anyhow::Result<()> {
        let mut framed = Framed::new(stream, MessageCodec);

        loop {
            let next = tokio::select! {
                next = framed.next() => next,
                _ = self.shutdown.cancelled() => break,
            };

            match next {
                Some(Ok(message)) => {
                    let response = self.handle_message(message);
                    framed.send(response).await?;
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

    fn handle_message(&self, message: Message) -> Message {
        match message {
            Message::Push(PushRequest { tier, data }) => {
                self.transport.push_back(tier, data);
                Message::ack("queued")
            }
            Message::Pop(req) => Message::Popped(PopResponse {
                data: self.transport.pop_front(req.tier),
            }),
            Message::Depth(_) => Message::QueueDepth(self.transport.queue_depth()),
            Message::Ping(_) => Message::ack("pong"),
            other => Message::nack(
                NackKind::Validation,
                format!("Unsupported message type: {:?}", other.message_type()),
            ),
        }
    }

    /// Tier lists served by this broker
    pub fn transport(&self) -> Arc<MemoryTransport> {
        self.transport.clone()
    }

    /// Shutdown the broker
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
