//! Durable ledger of task records.
//!
//! The ledger is the authoritative record of every submitted task. Brokers
//! and dispatchers hold working copies; every status decision is written
//! back here.

mod store;
mod memory;
mod record;

pub use store::{RocksTaskStore, TaskStoreConfig};
pub use memory::MemoryTaskStore;

use chrono::{DateTime, Utc};
use taskq_core::{Task, TaskId, TaskStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Contract of the durable ledger.
///
/// Implementations provide atomic single-record insert and update.
pub trait TaskStore: Send + Sync {
    /// Insert a task record. Inserting an id that already exists is a no-op.
    fn insert_task(&self, task: &Task) -> Result<()>;

    /// Record a new status and retry counter for a task.
    ///
    /// A record that already reached a terminal status keeps it; such
    /// updates are ignored.
    fn update_status(&self, task_id: &TaskId, status: TaskStatus, retry_count: u32) -> Result<()>;

    fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>>;

    /// All records, oldest first.
    fn list_tasks(&self) -> Result<Vec<Task>>;

    fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        Ok(self
            .list_tasks()?
            .into_iter()
            .filter(|task| task.status == status)
            .collect())
    }

    /// Delete terminal records last updated before `cutoff`.
    fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}
