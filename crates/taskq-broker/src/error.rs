use taskq_core::TaskError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    /// The broker could not be reached. Callers retry with backoff.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Broker rejected request: {0}")]
    Rejected(String),

    #[error("Unexpected broker response: {0}")]
    UnexpectedResponse(String),

    #[error("Task encoding error: {0}")]
    Codec(#[from] TaskError),
}

impl BrokerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;
