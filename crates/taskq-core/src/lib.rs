mod task;
mod priority;
mod error;
mod retry;
mod backoff;
mod submission;

pub use task::{Task, TaskId, TaskStatus};
pub use priority::Priority;
pub use error::{TaskError, ValidationError, Result};
pub use retry::{Outcome, RetryPolicy, Transition, DEFAULT_MAX_RETRIES};
pub use backoff::Backoff;
pub use submission::NewTask;

pub const MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024; // 10MB
