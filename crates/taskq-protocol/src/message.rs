use serde::{Deserialize, Serialize};
use crate::TASK_PAGE_BYTES;
use taskq_core::{NewTask, Priority, Task, TaskStatus};

/// Message types for the TCP protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Push = 1,
    Pop = 2,
    Depth = 3,
    Ping = 4,
    SubmitTask = 5,
    ListTasks = 6,
    ListWorkers = 7,
    Ack = 8,
    Nack = 9,
    Popped = 10,
    QueueDepth = 11,
    Submitted = 12,
    TaskList = 13,
    WorkerList = 14,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MessageType::Push),
            2 => Some(MessageType::Pop),
            3 => Some(MessageType::Depth),
            4 => Some(MessageType::Ping),
            5 => Some(MessageType::SubmitTask),
            6 => Some(MessageType::ListTasks),
            7 => Some(MessageType::ListWorkers),
            8 => Some(MessageType::Ack),
            9 => Some(MessageType::Nack),
            10 => Some(MessageType::Popped),
            11 => Some(MessageType::QueueDepth),
            12 => Some(MessageType::Submitted),
            13 => Some(MessageType::TaskList),
            14 => Some(MessageType::WorkerList),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Protocol messages.
///
/// `Push`, `Pop`, `Depth` and `Ping` are the broker transport; `SubmitTask`,
/// `ListTasks`, `ListWorkers` (and `Depth`) form the node control surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Append bytes to the tail of a tier
    Push(PushRequest),

    /// Remove and return the head of a tier
    Pop(PopRequest),

    /// Ask for per-tier queue depth
    Depth(DepthRequest),

    /// Liveness probe
    Ping(PingRequest),

    /// Producer submission
    SubmitTask(SubmitTaskRequest),

    /// List persisted tasks
    ListTasks(ListTasksRequest),

    /// List active worker ids
    ListWorkers(ListWorkersRequest),

    /// Positive acknowledgment
    Ack(AckResponse),

    /// Negative acknowledgment
    Nack(NackResponse),

    /// Result of a `Pop`
    Popped(PopResponse),

    /// Result of a `Depth`
    QueueDepth(QueueDepth),

    /// Accepted submission
    Submitted(SubmitTaskResponse),

    /// Result of `ListTasks`
    TaskList(TaskListResponse),

    /// Result of `ListWorkers`
    WorkerList(WorkerListResponse),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Push(_) => MessageType::Push,
            Message::Pop(_) => MessageType::Pop,
            Message::Depth(_) => MessageType::Depth,
            Message::Ping(_) => MessageType::Ping,
            Message::SubmitTask(_) => MessageType::SubmitTask,
            Message::ListTasks(_) => MessageType::ListTasks,
            Message::ListWorkers(_) => MessageType::ListWorkers,
            Message::Ack(_) => MessageType::Ack,
            Message::Nack(_) => MessageType::Nack,
            Message::Popped(_) => MessageType::Popped,
            Message::QueueDepth(_) => MessageType::QueueDepth,
            Message::Submitted(_) => MessageType::Submitted,
            Message::TaskList(_) => MessageType::TaskList,
            Message::WorkerList(_) => MessageType::WorkerList,
        }
    }

    pub fn ack(message: impl Into<String>) -> Self {
        Message::Ack(AckResponse {
            message: Some(message.into()),
        })
    }

    pub fn nack(kind: NackKind, error: impl Into<String>) -> Self {
        Message::Nack(NackResponse {
            kind,
            error: error.into(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub tier: Priority,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopRequest {
    pub tier: Priority,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepthRequest;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PingRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTaskRequest {
    pub submission: NewTask,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListTasksRequest {
    /// Only tasks in this status; all tasks when absent
    pub status: Option<TaskStatus>,
    /// Index of the first task to return
    pub offset: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListWorkersRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    /// Optional message
    pub message: Option<String>,
}

/// Why a request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NackKind {
    /// The request itself is malformed; retrying it will not help
    Validation,
    /// The server could not reach a dependency; the request may be retried
    Unavailable,
    /// Anything else
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NackResponse {
    pub kind: NackKind,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopResponse {
    /// `None` when the tier is empty
    pub data: Option<Vec<u8>>,
}

/// Number of queued tasks per tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepth {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl QueueDepth {
    pub fn get(&self, tier: Priority) -> usize {
        match tier {
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }

    pub fn set(&mut self, tier: Priority, depth: usize) {
        match tier {
            Priority::High => self.high = depth,
            Priority::Medium => self.medium = depth,
            Priority::Low => self.low = depth,
        }
    }

    pub fn total(&self) -> usize {
        self.high + self.medium + self.low
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTaskResponse {
    pub task: Task,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskListResponse {
    pub tasks: Vec<Task>,
    /// Offset of the next page; `None` on the last one
    pub next_offset: Option<usize>,
}

impl TaskListResponse {
    /// Tasks from `offset` on, as many as fit in [`TASK_PAGE_BYTES`].
    /// A non-empty remainder always yields at least one task.
    pub fn page(tasks: Vec<Task>, offset: usize) -> Self {
        let total = tasks.len();
        let mut used: usize = 0;
        let mut page = Vec::new();

        for task in tasks.into_iter().skip(offset) {
            let size = bincode::serialized_size(&task)
                .map(|size| usize::try_from(size).unwrap_or(usize::MAX))
                .unwrap_or(usize::MAX);
            if !page.is_empty() && used.saturating_add(size) > TASK_PAGE_BYTES {
                break;
            }
            used = used.saturating_add(size);
            page.push(task);
        }

        let end = offset.saturating_add(page.len());
        TaskListResponse {
            tasks: page,
            next_offset: (end < total).then_some(end),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerListResponse {
    pub workers: Vec<String>,
}
