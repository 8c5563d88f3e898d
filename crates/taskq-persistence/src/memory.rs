use crate::{record::StoredTask, PersistenceError, Result, TaskStore};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use taskq_core::{Task, TaskId, TaskStatus};

/// In-process ledger. Records live as long as the process.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: DashMap<TaskId, StoredTask>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl TaskStore for MemoryTaskStore {
    fn insert_task(&self, task: &Task) -> Result<()> {
        self.tasks
            .entry(task.id)
            .or_insert_with(|| StoredTask::new(task.clone()));
        Ok(())
    }

    fn update_status(&self, task_id: &TaskId, status: TaskStatus, retry_count: u32) -> Result<()> {
        let mut record = self
            .tasks
            .get_mut(task_id)
            .ok_or(PersistenceError::TaskNotFound(*task_id))?;
        record.apply(status, retry_count);
        Ok(())
    }

    fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>> {
        Ok(self.tasks.get(task_id).map(|record| record.task.clone()))
    }

    fn list_tasks(&self) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .map(|record| record.task.clone())
            .collect();
        tasks.sort_by_key(|task| task.created_at);
        Ok(tasks)
    }

    fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let before = self.tasks.len();
        self.tasks.retain(|_, record| !record.is_purgeable(cutoff));
        Ok(before - self.tasks.len())
    }
}
