use crate::{TaskError, ValidationError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Priority tier of a task.
///
/// Serialized as its numeric level (1 = low, 2 = medium, 3 = high), which is
/// also the value producers submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Tiers in dequeue order.
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// Map a submitted priority level onto a tier.
    pub fn from_level(level: i64) -> Result<Self, ValidationError> {
        match level {
            3 => Ok(Priority::High),
            2 => Ok(Priority::Medium),
            1 => Ok(Priority::Low),
            other => Err(ValidationError::PriorityOutOfRange(other)),
        }
    }

    /// Numeric level, 1..=3
    pub fn level(&self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }

    /// Get the tier name
    pub fn tier(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// Position of the tier in [`Priority::ALL`].
    pub fn index(&self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.level().cmp(&other.level())
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Low
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tier())
    }
}

impl TryFrom<u8> for Priority {
    type Error = TaskError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Priority::from_level(i64::from(value)).map_err(|_| TaskError::InvalidPriority(value))
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.level()
    }
}
