use crate::{BrokerTransport, MemoryTransport, Result};
use std::sync::Arc;
use taskq_core::{Priority, Task};
use taskq_protocol::QueueDepth;
use tracing::{debug, error};

/// Strict-priority queue over three FIFO tiers.
///
/// `dequeue` always drains the high tier before looking at medium, and
/// medium before low. There is no aging: a steady stream of high-priority
/// work starves the lower tiers.
#[derive(Clone)]
pub struct PriorityQueue {
    transport: Arc<dyn BrokerTransport>,
}

impl PriorityQueue {
    pub fn new(transport: Arc<dyn BrokerTransport>) -> Self {
        PriorityQueue { transport }
    }

    /// Queue backed by in-process tier lists
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryTransport::new()))
    }

    /// Append a task to the tail of its tier
    pub async fn enqueue(&self, task: &Task) -> Result<()> {
        let data = task.to_bytes()?;
        self.transport.push(task.priority, data).await?;
        debug!(task = %task.id, tier = %task.priority, "Enqueued task");
        Ok(())
    }

    /// Remove the head of the highest non-empty tier.
    ///
    /// `Ok(None)` means every tier is empty.
    pub async fn dequeue(&self) -> Result<Option<Task>> {
        for tier in Priority::ALL {
            if let Some(data) = self.transport.pop(tier).await? {
                return match Task::from_bytes(&data) {
                    Ok(task) => Ok(Some(task)),
                    Err(e) => {
                        error!(%tier, "Discarding undecodable queue entry: {}", e);
                        Err(e.into())
                    }
                };
            }
        }
        Ok(None)
    }

    pub async fn depth(&self) -> Result<QueueDepth> {
        self.transport.depth().await
    }

    pub async fn ping(&self) -> Result<()> {
        self.transport.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_priority_ordering() {
        let queue = PriorityQueue::in_memory();

        let low = Task::new("low", Priority::Low);
        let medium = Task::new("medium", Priority::Medium);
        let high = Task::new("high", Priority::High);

        block_on(async {
            queue.enqueue(&low).await.unwrap();
            queue.enqueue(&medium).await.unwrap();
            queue.enqueue(&high).await.unwrap();

            assert_eq!(queue.dequeue().await.unwrap().unwrap().id, high.id);
            assert_eq!(queue.dequeue().await.unwrap().unwrap().id, medium.id);
            assert_eq!(queue.dequeue().await.unwrap().unwrap().id, low.id);
            assert!(queue.dequeue().await.unwrap().is_none());
        });
    }

    #[test]
    fn test_fifo_within_priority() {
        let queue = PriorityQueue::in_memory();

        let task1 = Task::new("t1", Priority::Medium);
        let task2 = Task::new("t2", Priority::Medium);

        block_on(async {
            queue.enqueue(&task1).await.unwrap();
            queue.enqueue(&task2).await.unwrap();

            assert_eq!(queue.dequeue().await.unwrap().unwrap().id, task1.id);
            assert_eq!(queue.dequeue().await.unwrap().unwrap().id, task2.id);
        });
    }

    #[test]
    fn test_high_submitted_after_low_is_served_first() {
        let queue = PriorityQueue::in_memory();

        let t1 = Task::new("t1", Priority::High);
        let t2 = Task::new("t2", Priority::Low);

        block_on(async {
            queue.enqueue(&t1).await.unwrap();
            queue.enqueue(&t2).await.unwrap();

            assert_eq!(queue.dequeue().await.unwrap().unwrap().id, t1.id);
            assert_eq!(queue.dequeue().await.unwrap().unwrap().id, t2.id);
        });
    }

    #[test]
    fn test_high_stream_starves_lower_tiers() {
        let queue = PriorityQueue::in_memory();
        let low = Task::new("low", Priority::Low);

        block_on(async {
            queue.enqueue(&low).await.unwrap();

            for i in 0..50 {
                let high = Task::new(format!("high-{i}"), Priority::High);
                queue.enqueue(&high).await.unwrap();
                let next = queue.dequeue().await.unwrap().unwrap();
                assert_eq!(next.id, high.id);
            }

            assert_eq!(queue.dequeue().await.unwrap().unwrap().id, low.id);
        });
    }

    #[test]
    fn test_retry_goes_to_tail_of_original_tier() {
        let queue = PriorityQueue::in_memory();

        let a = Task::new("a", Priority::Medium);
        let b = Task::new("b", Priority::Medium);

        block_on(async {
            queue.enqueue(&a).await.unwrap();
            queue.enqueue(&b).await.unwrap();

            let mut first = queue.dequeue().await.unwrap().unwrap();
            assert_eq!(first.id, a.id);
            first.retry_count = 1;
            queue.enqueue(&first).await.unwrap();

            assert_eq!(queue.dequeue().await.unwrap().unwrap().id, b.id);
            let again = queue.dequeue().await.unwrap().unwrap();
            assert_eq!(again.id, a.id);
            assert_eq!(again.retry_count, 1);
            assert_eq!(again.priority, Priority::Medium);
        });
    }

    #[test]
    fn test_depth_by_tier() {
        let queue = PriorityQueue::in_memory();

        block_on(async {
            queue.enqueue(&Task::new("h", Priority::High)).await.unwrap();
            queue.enqueue(&Task::new("l1", Priority::Low)).await.unwrap();
            queue.enqueue(&Task::new("l2", Priority::Low)).await.unwrap();

            let depth = queue.depth().await.unwrap();
            assert_eq!(depth, QueueDepth { high: 1, medium: 0, low: 2 });
        });
    }

    #[test]
    fn test_undecodable_entry_is_reported() {
        let transport = Arc::new(MemoryTransport::new());
        transport.push_back(Priority::High, b"not a task".to_vec());
        let queue = PriorityQueue::new(transport.clone());

        block_on(async {
            assert!(queue.dequeue().await.is_err());
            assert_eq!(transport.queue_depth().total(), 0);
        });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dequeue_delivers_each_task_once() {
        let queue = PriorityQueue::in_memory();
        let mut submitted = HashSet::new();

        for i in 0..200 {
            let priority = Priority::ALL[i % 3];
            let task = Task::new(format!("task-{i}"), priority);
            submitted.insert(task.id);
            queue.enqueue(&task).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                let mut received = Vec::new();
                while let Some(task) = queue.dequeue().await.unwrap() {
                    received.push(task.id);
                    tokio::task::yield_now().await;
                }
                received
            }));
        }

        let mut delivered = Vec::new();
        for handle in handles {
            delivered.extend(handle.await.unwrap());
        }

        let unique: HashSet<_> = delivered.iter().copied().collect();
        assert_eq!(delivered.len(), submitted.len());
        assert_eq!(unique, submitted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_single_task_two_workers() {
        let queue = PriorityQueue::in_memory();
        let task = Task::new("only one", Priority::Medium);
        queue.enqueue(&task).await.unwrap();

        let a = tokio::spawn({
            let queue = queue.clone();
            async move { queue.dequeue().await.unwrap() }
        });
        let b = tokio::spawn({
            let queue = queue.clone();
            async move { queue.dequeue().await.unwrap() }
        });

        let results = [a.await.unwrap(), b.await.unwrap()];
        let received: Vec<_> = results.iter().flatten().collect();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].id, task.id);
    }

    proptest! {
        #[test]
        fn prop_dequeue_is_strict_priority_then_fifo(levels in proptest::collection::vec(1u8..=3, 0..40)) {
            let queue = PriorityQueue::in_memory();
            let tasks: Vec<Task> = levels
                .iter()
                .enumerate()
                .map(|(i, level)| Task::new(i.to_string(), Priority::try_from(*level).unwrap()))
                .collect();

            let drained = block_on(async {
                for task in &tasks {
                    queue.enqueue(task).await.unwrap();
                }
                let mut drained = Vec::new();
                while let Some(task) = queue.dequeue().await.unwrap() {
                    drained.push(task);
                }
                drained
            });

            let mut expected = tasks.clone();
            // stable sort keeps submission order within a tier
            expected.sort_by(|a, b| b.priority.cmp(&a.priority));
            let expected_ids: Vec<_> = expected.iter().map(|t| t.id).collect();
            let drained_ids: Vec<_> = drained.iter().map(|t| t.id).collect();
            prop_assert_eq!(drained_ids, expected_ids);
        }
    }
}
