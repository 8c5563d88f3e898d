use taskq_broker::BrokerError;
use taskq_core::ValidationError;
use taskq_persistence::PersistenceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    /// The node cannot start; nothing has been spawned.
    #[error("Startup failed: {0}")]
    Startup(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WorkerError>;

/// Why a producer submission was not accepted.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to record task: {0}")]
    Persistence(#[from] PersistenceError),

    /// The task is recorded as pending but could not be queued.
    #[error("Failed to queue task: {0}")]
    Broker(#[from] BrokerError),
}
