use crate::config::ProcessorConfig;
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use taskq_core::Task;

/// Result type for task processors. The error is a human-readable reason.
pub type ProcessResult = Result<(), String>;

/// The work a task performs.
///
/// Dispatchers only look at success or failure; the reason is logged.
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    async fn process(&self, task: &Task) -> ProcessResult;
}

/// Build the processor named by the configuration
pub fn from_config(config: &ProcessorConfig) -> Arc<dyn TaskProcessor> {
    match config {
        ProcessorConfig::Echo => Arc::new(EchoProcessor),
        ProcessorConfig::Sleep { duration_ms } => Arc::new(SleepProcessor::new(*duration_ms)),
        ProcessorConfig::Flaky {
            failure_rate,
            work_ms,
        } => Arc::new(FlakyProcessor::new(*failure_rate, Duration::from_millis(*work_ms))),
    }
}

/// Succeeds immediately
pub struct EchoProcessor;

#[async_trait]
impl TaskProcessor for EchoProcessor {
    async fn process(&self, task: &Task) -> ProcessResult {
        tracing::debug!(task = %task.id, payload = %task.payload, "echo");
        Ok(())
    }
}

/// Simulates work
pub struct SleepProcessor {
    duration_ms: u64,
}

impl SleepProcessor {
    pub fn new(duration_ms: u64) -> Self {
        SleepProcessor { duration_ms }
    }
}

#[async_trait]
impl TaskProcessor for SleepProcessor {
    async fn process(&self, _task: &Task) -> ProcessResult {
        tokio::time::sleep(Duration::from_millis(self.duration_ms)).await;
        Ok(())
    }
}

/// Simulated work that fails at random with a fixed probability.
pub struct FlakyProcessor {
    failure_rate: f64,
    work: Duration,
}

impl FlakyProcessor {
    pub fn new(failure_rate: f64, work: Duration) -> Self {
        FlakyProcessor {
            failure_rate: failure_rate.clamp(0.0, 1.0),
            work,
        }
    }
}

impl Default for FlakyProcessor {
    fn default() -> Self {
        Self::new(0.25, Duration::from_secs(2))
    }
}

#[async_trait]
impl TaskProcessor for FlakyProcessor {
    async fn process(&self, _task: &Task) -> ProcessResult {
        tokio::time::sleep(self.work).await;
        if rand::thread_rng().gen_bool(self.failure_rate) {
            Err("simulated failure".to_string())
        } else {
            Ok(())
        }
    }
}
