use crate::{Priority, Result, TaskError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a task
pub type TaskId = Uuid;

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued in its tier, waiting for a worker
    Pending,
    /// Owned by exactly one dispatcher
    InFlight,
    /// Processed successfully. Terminal.
    Completed,
    /// Exhausted its retries. Terminal.
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::InFlight,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InFlight => "in_flight",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Pending, InFlight)
                | (InFlight, Completed)
                | (InFlight, Pending) // retry, or recovery after a crash
                | (InFlight, Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_flight" => Ok(TaskStatus::InFlight),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(TaskError::InvalidStatus(other.to_string())),
        }
    }
}

/// A unit of submitted work.
///
/// The serialized field names are the at-rest record layout:
/// `{id, payload, status, created, retries, priority}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier, assigned at submission
    pub id: TaskId,

    /// Opaque data handed to the processing capability
    pub payload: String,

    /// Current status
    pub status: TaskStatus,

    /// When the task was submitted
    #[serde(rename = "created")]
    pub created_at: DateTime<Utc>,

    /// Failed processing attempts so far
    #[serde(rename = "retries")]
    pub retry_count: u32,

    /// Tier the task is queued in, on every attempt
    pub priority: Priority,
}

impl Task {
    /// Create a new pending task
    pub fn new(payload: impl Into<String>, priority: Priority) -> Self {
        Task {
            id: Uuid::new_v4(),
            payload: payload.into(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            retry_count: 0,
            priority,
        }
    }

    /// Serialize task to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(TaskError::from)
    }

    /// Deserialize task from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(TaskError::from)
    }

    /// Move to `to`, rejecting anything the lifecycle does not allow.
    pub fn transition(&mut self, to: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(TaskError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Mark the task as taken by a dispatcher
    pub fn begin(&mut self) -> Result<()> {
        self.transition(TaskStatus::InFlight)
    }

    /// Put an in-flight task back to pending without counting an attempt.
    /// Used when recovering work orphaned by a crash.
    pub fn release(&mut self) -> Result<()> {
        match self.status {
            TaskStatus::Pending => Ok(()),
            _ => self.transition(TaskStatus::Pending),
        }
    }
}
