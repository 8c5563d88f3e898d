//! Retry policy: maps a processing outcome and the retry counter of an
//! in-flight task onto its next lifecycle state.
//!
//! ```text
//! Pending --dequeue--> InFlight --success--> Completed
//!                         |
//!                         +--failure, retry_count+1 <  max--> Pending (re-enqueued)
//!                         +--failure, retry_count+1 >= max--> Failed
//! ```

use crate::{Backoff, Result, Task, TaskError, TaskStatus};
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// What processing reported. The cause of a failure is carried for logging
/// only and never changes the decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// The decision for an in-flight task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// InFlight -> Completed
    Complete,
    /// InFlight -> Pending; re-enqueue at the tail of the same tier after `delay`.
    Retry { retry_count: u32, delay: Duration },
    /// InFlight -> Failed
    Fail { retry_count: u32 },
}

impl Transition {
    pub fn status(&self) -> TaskStatus {
        match self {
            Transition::Complete => TaskStatus::Completed,
            Transition::Retry { .. } => TaskStatus::Pending,
            Transition::Fail { .. } => TaskStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Option<Backoff>,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Result<Self> {
        if max_retries == 0 {
            return Err(TaskError::ZeroMaxRetries);
        }
        Ok(RetryPolicy {
            max_retries,
            backoff: None,
        })
    }

    /// Delay re-enqueues of failed tasks. Without a backoff they are
    /// re-enqueued immediately.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backoff(&self) -> Option<&Backoff> {
        self.backoff.as_ref()
    }

    /// Pure decision for a task that has failed `retry_count` times so far.
    pub fn decide(&self, retry_count: u32, outcome: &Outcome) -> Transition {
        match outcome {
            Outcome::Success => Transition::Complete,
            Outcome::Failure(_) => {
                let next = retry_count.saturating_add(1);
                if next < self.max_retries {
                    let delay = self
                        .backoff
                        .as_ref()
                        .map(|b| b.delay(retry_count))
                        .unwrap_or(Duration::ZERO);
                    Transition::Retry {
                        retry_count: next,
                        delay,
                    }
                } else {
                    Transition::Fail {
                        retry_count: next.min(self.max_retries),
                    }
                }
            }
        }
    }

    /// Decide and apply the transition to an in-flight task.
    pub fn apply(&self, task: &mut Task, outcome: &Outcome) -> Result<Transition> {
        let transition = self.decide(task.retry_count, outcome);
        task.transition(transition.status())?;
        match &transition {
            Transition::Complete => {}
            Transition::Retry { retry_count, .. } | Transition::Fail { retry_count } => {
                task.retry_count = *retry_count;
            }
        }
        Ok(transition)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: None,
        }
    }
}
