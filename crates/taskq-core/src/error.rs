use crate::TaskStatus;
use thiserror::Error;

/// A submission rejected before it reaches persistence or the broker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("payload is required")]
    MissingPayload,

    #[error("Payload size exceeds maximum allowed size of {max} bytes (got {actual})")]
    PayloadTooLarge { max: usize, actual: usize },

    #[error("priority must be between 1 and 3 (got {0})")]
    PriorityOutOfRange(i64),
}

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid priority value: {0}")]
    InvalidPriority(u8),

    #[error("Invalid task status: {0}")]
    InvalidStatus(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("max_retries must be at least 1")]
    ZeroMaxRetries,
}

pub type Result<T> = std::result::Result<T, TaskError>;
