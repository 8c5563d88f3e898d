use crate::{BrokerTransport, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use taskq_core::Priority;
use taskq_protocol::QueueDepth;

/// In-process tier lists.
pub struct MemoryTransport {
    tiers: [Mutex<VecDeque<Vec<u8>>>; 3],
}

impl MemoryTransport {
    pub fn new() -> Self {
        MemoryTransport {
            tiers: std::array::from_fn(|_| Mutex::new(VecDeque::new())),
        }
    }

    fn tier(&self, tier: Priority) -> &Mutex<VecDeque<Vec<u8>>> {
        &self.tiers[tier.index()]
    }

    pub fn push_back(&self, tier: Priority, data: Vec<u8>) {
        self.tier(tier).lock().push_back(data);
    }

    pub fn pop_front(&self, tier: Priority) -> Option<Vec<u8>> {
        self.tier(tier).lock().pop_front()
    }

    pub fn queue_depth(&self) -> QueueDepth {
        let mut depth = QueueDepth::default();
        for tier in Priority::ALL {
            depth.set(tier, self.tier(tier).lock().len());
        }
        depth
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerTransport for MemoryTransport {
    async fn push(&self, tier: Priority, data: Vec<u8>) -> Result<()> {
        self.push_back(tier, data);
        Ok(())
    }

    async fn pop(&self, tier: Priority) -> Result<Option<Vec<u8>>> {
        Ok(self.pop_front(tier))
    }

    async fn depth(&self) -> Result<QueueDepth> {
        Ok(self.queue_depth())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiers_are_independent_fifos() {
        let transport = MemoryTransport::new();

        transport.push_back(Priority::Low, b"l1".to_vec());
        transport.push_back(Priority::High, b"h1".to_vec());
        transport.push_back(Priority::Low, b"l2".to_vec());

        assert_eq!(transport.queue_depth().low, 2);
        assert_eq!(transport.pop_front(Priority::Medium), None);
        assert_eq!(transport.pop_front(Priority::Low), Some(b"l1".to_vec()));
        assert_eq!(transport.pop_front(Priority::Low), Some(b"l2".to_vec()));
        assert_eq!(transport.pop_front(Priority::High), Some(b"h1".to_vec()));
        assert_eq!(transport.queue_depth().total(), 0);
    }
}
