use crate::processor::TaskProcessor;
use std::sync::Arc;
use std::time::Duration;
use taskq_core::{Outcome, Task};
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Runs a processor against a task and turns whatever happens into an
/// [`Outcome`]. Timeouts and panics are processing failures.
#[derive(Clone)]
pub struct TaskExecutor {
    processor: Arc<dyn TaskProcessor>,
    timeout: Option<Duration>,
}

impl TaskExecutor {
    pub fn new(processor: Arc<dyn TaskProcessor>) -> Self {
        TaskExecutor {
            processor,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn execute(&self, task: &Task) -> Outcome {
        let processor = self.processor.clone();
        let owned = task.clone();
        let limit = self.timeout;

        let handle = tokio::spawn(async move {
            match limit {
                Some(limit) => match timeout(limit, processor.process(&owned)).await {
                    Ok(result) => result,
                    Err(_) => Err(format!("Task execution timed out after {:?}", limit)),
                },
                None => processor.process(&owned).await,
            }
        });

        match handle.await {
            Ok(Ok(())) => {
                info!(task = %task.id, "Task processed successfully");
                Outcome::Success
            }
            Ok(Err(reason)) => {
                warn!(task = %task.id, "Task processing failed: {}", reason);
                Outcome::Failure(reason)
            }
            Err(e) if e.is_panic() => {
                error!(task = %task.id, "Task panicked during processing");
                Outcome::Failure("Task panicked during processing".to_string())
            }
            Err(_) => {
                error!(task = %task.id, "Task processing was cancelled");
                Outcome::Failure("Task processing was cancelled".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::testing::Panicking;
    use crate::processor::{EchoProcessor, FlakyProcessor, SleepProcessor};
    use taskq_core::Priority;

    #[tokio::test]
    async fn test_executor_success() {
        let executor = TaskExecutor::new(Arc::new(EchoProcessor));
        let task = Task::new("test data", Priority::Medium);

        assert_eq!(executor.execute(&task).await, Outcome::Success);
    }

    #[tokio::test]
    async fn test_executor_failure() {
        let executor = TaskExecutor::new(Arc::new(FlakyProcessor::new(1.0, Duration::ZERO)));
        let task = Task::new("test data", Priority::Medium);

        assert!(matches!(executor.execute(&task).await, Outcome::Failure(_)));
    }

    #[tokio::test]
    async fn test_executor_timeout() {
        let executor = TaskExecutor::new(Arc::new(SleepProcessor::new(2000)))
            .with_timeout(Some(Duration::from_millis(50)));
        let task = Task::new("sleep", Priority::Low);

        match executor.execute(&task).await {
            Outcome::Failure(reason) => assert!(reason.contains("timed out")),
            Outcome::Success => panic!("expected a timeout"),
        }
    }

    #[tokio::test]
    async fn test_executor_panic_is_failure() {
        let executor = TaskExecutor::new(Arc::new(Panicking));
        let task = Task::new("boom", Priority::High);

        match executor.execute(&task).await {
            Outcome::Failure(reason) => assert!(reason.contains("panicked")),
            Outcome::Success => panic!("expected a failure"),
        }
    }
}
