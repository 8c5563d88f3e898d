use crate::{BrokerError, BrokerTransport, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use taskq_core::Priority;
use taskq_protocol::{
    DepthRequest, Message, MessageCodec, NackKind, PingRequest, PopRequest, PushRequest, QueueDepth,
};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Tier lists held by a `tq-broker` process.
///
/// Requests share one connection, opened lazily and dropped on any
/// transport error so the next request reconnects.
pub struct RemoteTransport {
    address: String,
    connection: Mutex<Option<Framed<TcpStream, MessageCodec>>>,
}

impl RemoteTransport {
    /// Transport that connects on first use
    pub fn new(address: impl Into<String>) -> Self {
        RemoteTransport {
            address: address.into(),
            connection: Mutex::new(None),
        }
    }

    /// Connect and ping, failing fast when the broker is unreachable
    pub async fn connect(address: impl Into<String>) -> Result<Self> {
        let transport = Self::new(address);
        transport.ping().await?;
        Ok(transport)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn request(&self, message: Message) -> Result<Message> {
        let mut guard = self.connection.lock().await;

        if guard.is_none() {
            let stream = tokio::time::timeout(REQUEST_TIMEOUT, TcpStream::connect(&self.address))
                .await
                .map_err(|_| BrokerError::Unavailable(format!("connect to {} timed out", self.address)))?
                .map_err(|e| BrokerError::Unavailable(format!("{}: {}", self.address, e)))?;
            debug!("Connected to broker at {}", self.address);
            *guard = Some(Framed::new(stream, MessageCodec));
        }

        let Some(framed) = guard.as_mut() else {
            return Err(BrokerError::Unavailable("no connection".to_string()));
        };

        let exchange = async {
            framed
                .send(message)
                .await
                .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
            match framed.next().await {
                Some(Ok(response)) => Ok(response),
                Some(Err(e)) => Err(BrokerError::Unavailable(e.to_string())),
                None => Err(BrokerError::Unavailable("connection closed".to_string())),
            }
        };

        let result = match tokio::time::timeout(REQUEST_TIMEOUT, exchange).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Unavailable("request timed out".to_string())),
        };

        if let Err(e) = &result {
            warn!("Dropping broker connection to {}: {}", self.address, e);
            *guard = None;
        }

        result
    }
}

fn refused(kind: NackKind, error: String) -> BrokerError {
    match kind {
        NackKind::Unavailable => BrokerError::Unavailable(error),
        NackKind::Validation | NackKind::Internal => BrokerError::Rejected(error),
    }
}

#[async_trait]
impl BrokerTransport for RemoteTransport {
    async fn push(&self, tier: Priority, data: Vec<u8>) -> Result<()> {
        match self.request(Message::Push(PushRequest { tier, data })).await? {
            Message::Ack(_) => Ok(()),
            Message::Nack(nack) => Err(refused(nack.kind, nack.error)),
            other => Err(BrokerError::UnexpectedResponse(format!("{:?}", other.message_type()))),
        }
    }

    /// Pops are not leased. A reply lost after the broker removed the
    /// entry loses the entry; its ledger row stays `pending` for recovery.
    async fn pop(&self, tier: Priority) -> Result<Option<Vec<u8>>> {
        match self.request(Message::Pop(PopRequest { tier })).await? {
            Message::Popped(resp) => Ok(resp.data),
            Message::Nack(nack) => Err(refused(nack.kind, nack.error)),
            other => Err(BrokerError::UnexpectedResponse(format!("{:?}", other.message_type()))),
        }
    }

    async fn depth(&self) -> Result<QueueDepth> {
        match self.request(Message::Depth(DepthRequest)).await? {
            Message::QueueDepth(depth) => Ok(depth),
            Message::Nack(nack) => Err(refused(nack.kind, nack.error)),
            other => Err(BrokerError::UnexpectedResponse(format!("{:?}", other.message_type()))),
        }
    }

    async fn ping(&self) -> Result<()> {
        match self.request(Message::Ping(PingRequest)).await? {
            Message::Ack(_) => Ok(()),
            Message::Nack(nack) => Err(refused(nack.kind, nack.error)),
            other => Err(BrokerError::UnexpectedResponse(format!("{:?}", other.message_type()))),
        }
    }
}
