use crate::{Priority, Task, ValidationError, MAX_PAYLOAD_SIZE};
use serde::{Deserialize, Serialize};

/// A producer's submission before it is accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub payload: Option<String>,
    /// 1 (low) to 3 (high). Defaults to low when absent.
    pub priority: Option<u8>,
}

impl NewTask {
    pub fn new(payload: impl Into<String>, priority: u8) -> Self {
        NewTask {
            payload: Some(payload.into()),
            priority: Some(priority),
        }
    }

    /// Check the submission and turn it into a fresh pending task.
    pub fn validate(self) -> Result<Task, ValidationError> {
        let payload = match self.payload {
            Some(payload) if !payload.is_empty() => payload,
            _ => return Err(ValidationError::MissingPayload),
        };

        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ValidationError::PayloadTooLarge {
                max: MAX_PAYLOAD_SIZE,
                actual: payload.len(),
            });
        }

        let priority = match self.priority {
            Some(level) => Priority::from_level(i64::from(level))?,
            None => Priority::Low,
        };

        Ok(Task::new(payload, priority))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaskStatus;

    #[test]
    fn test_valid_submission() {
        let task = NewTask::new("resize image 42", 3).validate().unwrap();

        assert_eq!(task.payload, "resize image 42");
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = NewTask::new("x", 1).validate().unwrap();
        let b = NewTask::new("x", 1).validate().unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_missing_priority_defaults_to_low() {
        let submission = NewTask {
            payload: Some("data".to_string()),
            priority: None,
        };
        assert_eq!(submission.validate().unwrap().priority, Priority::Low);
    }

    #[test]
    fn test_missing_or_empty_payload() {
        assert_eq!(
            NewTask::default().validate(),
            Err(ValidationError::MissingPayload)
        );
        assert_eq!(
            NewTask::new("", 2).validate(),
            Err(ValidationError::MissingPayload)
        );
    }

    #[test]
    fn test_priority_out_of_range() {
        assert_eq!(
            NewTask::new("data", 0).validate(),
            Err(ValidationError::PriorityOutOfRange(0))
        );
        assert_eq!(
            NewTask::new("data", 4).validate(),
            Err(ValidationError::PriorityOutOfRange(4))
        );
    }

    #[test]
    fn test_payload_size_limit() {
        let large_payload = "a".repeat(MAX_PAYLOAD_SIZE + 1);
        match NewTask::new(large_payload, 1).validate() {
            Err(ValidationError::PayloadTooLarge { max, actual }) => {
                assert_eq!(max, MAX_PAYLOAD_SIZE);
                assert_eq!(actual, MAX_PAYLOAD_SIZE + 1);
            }
            other => panic!("Expected PayloadTooLarge error, got {:?}", other),
        }
    }
}
