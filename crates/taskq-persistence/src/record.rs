use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskq_core::{Task, TaskStatus};
use tracing::warn;

/// A task as kept in the ledger, with the time of its last write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredTask {
    pub task: Task,
    pub updated_at: DateTime<Utc>,
}

impl StoredTask {
    pub fn new(task: Task) -> Self {
        StoredTask {
            task,
            updated_at: Utc::now(),
        }
    }

    pub fn to_bytes(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> bincode::Result<Self> {
        bincode::deserialize(bytes)
    }

    /// Apply a status update. Returns false when the record is terminal and
    /// the update was dropped.
    pub fn apply(&mut self, status: TaskStatus, retry_count: u32) -> bool {
        if self.task.status.is_terminal() {
            warn!(
                task = %self.task.id,
                stored = %self.task.status,
                requested = %status,
                "Ignoring status update for a task that already finished"
            );
            return false;
        }

        self.task.status = status;
        self.task.retry_count = retry_count;
        self.updated_at = Utc::now();
        true
    }

    pub fn is_purgeable(&self, cutoff: DateTime<Utc>) -> bool {
        self.task.status.is_terminal() && self.updated_at < cutoff
    }
}
