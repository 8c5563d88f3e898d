use crate::Result;
use async_trait::async_trait;
use taskq_core::Priority;
use taskq_protocol::QueueDepth;

/// FIFO lists, one per priority tier, holding encoded tasks.
///
/// `pop` must remove the head atomically: a pushed entry is returned to
/// exactly one caller.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Append to the tail of `tier`
    async fn push(&self, tier: Priority, data: Vec<u8>) -> Result<()>;

    /// Remove and return the head of `tier`, `None` when it is empty
    async fn pop(&self, tier: Priority) -> Result<Option<Vec<u8>>>;

    async fn depth(&self) -> Result<QueueDepth>;

    /// Check the transport is reachable
    async fn ping(&self) -> Result<()>;
}
