use crate::{record::StoredTask, PersistenceError, Result, TaskStore};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use taskq_core::{Task, TaskId, TaskStatus};
use tracing::{debug, info};

/// Configuration for task store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStoreConfig {
    pub data_dir: PathBuf,
}

impl Default for TaskStoreConfig {
    fn default() -> Self {
        TaskStoreConfig {
            data_dir: PathBuf::from("./data"),
        }
    }
}

const CF_TASKS: &str = "tasks";

/// Task ledger backed by RocksDB.
///
/// One record per task id in the `tasks` column family. Read-modify-write
/// paths hold `write_lock` so an insert can never overwrite a concurrent
/// status update.
pub struct RocksTaskStore {
    db: Arc<DB>,
    write_lock: Mutex<()>,
}

impl RocksTaskStore {
    /// Open or create task store
    pub fn open(config: TaskStoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let db_path = config.data_dir.join("tasks");

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors = vec![ColumnFamilyDescriptor::new(CF_TASKS, Options::default())];
        let db = DB::open_cf_descriptors(&db_opts, db_path, cf_descriptors)?;

        info!("Opened task store at {:?}", config.data_dir);

        Ok(RocksTaskStore {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    fn tasks_cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(CF_TASKS)
            .ok_or_else(|| PersistenceError::Other("Tasks CF not found".to_string()))
    }

    fn load(&self, task_id: &TaskId) -> Result<Option<StoredTask>> {
        let cf = self.tasks_cf()?;
        match self.db.get_cf(cf, task_id.as_bytes())? {
            Some(value) => Ok(Some(StoredTask::from_bytes(&value)?)),
            None => Ok(None),
        }
    }

    fn records(&self) -> Result<Vec<StoredTask>> {
        let cf = self.tasks_cf()?;
        let mut records = Vec::new();

        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            records.push(StoredTask::from_bytes(&value)?);
        }

        Ok(records)
    }
}

impl TaskStore for RocksTaskStore {
    fn insert_task(&self, task: &Task) -> Result<()> {
        let _guard = self.write_lock.lock();
        let cf = self.tasks_cf()?;
        let key = task.id.as_bytes();

        if self.db.get_pinned_cf(cf, key)?.is_some() {
            debug!("Task {} already stored, skipping insert", task.id);
            return Ok(());
        }

        self.db
            .put_cf(cf, key, StoredTask::new(task.clone()).to_bytes()?)?;

        debug!("Stored task {}", task.id);
        Ok(())
    }

    fn update_status(&self, task_id: &TaskId, status: TaskStatus, retry_count: u32) -> Result<()> {
        let _guard = self.write_lock.lock();

        let mut record = self
            .load(task_id)?
            .ok_or(PersistenceError::TaskNotFound(*task_id))?;

        if record.apply(status, retry_count) {
            let cf = self.tasks_cf()?;
            self.db.put_cf(cf, task_id.as_bytes(), record.to_bytes()?)?;
            debug!("Task {} is now {}", task_id, status);
        }

        Ok(())
    }

    fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>> {
        Ok(self.load(task_id)?.map(|record| record.task))
    }

    fn list_tasks(&self) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self.records()?.into_iter().map(|r| r.task).collect();
        tasks.sort_by_key(|task| task.created_at);
        Ok(tasks)
    }

    fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let _guard = self.write_lock.lock();
        let cf = self.tasks_cf()?;

        let mut batch = WriteBatch::default();
        let mut count = 0;

        for record in self.records()? {
            if record.is_purgeable(cutoff) {
                batch.delete_cf(cf, record.task.id.as_bytes());
                count += 1;
            }
        }

        if count > 0 {
            self.db.write(batch)?;
            info!("Purged {} finished tasks", count);
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use taskq_core::Priority;
    use tempfile::TempDir;

    fn open_store(temp_dir: &TempDir) -> RocksTaskStore {
        RocksTaskStore::open(TaskStoreConfig {
            data_dir: temp_dir.path().to_path_buf(),
        })
        .unwrap()
    }

    #[test]
    fn test_insert_and_get_task() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);

        let task = Task::new("test data", Priority::Medium);
        store.insert_task(&task).unwrap();

        let retrieved = store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(retrieved, task);
        assert_eq!(retrieved.status, TaskStatus::Pending);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);

        let task = Task::new("data", Priority::High);
        store.insert_task(&task).unwrap();
        store.insert_task(&task).unwrap();

        assert_eq!(store.list_tasks().unwrap().len(), 1);
    }

    #[test]
    fn test_reinsert_does_not_reset_status() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);

        let task = Task::new("data", Priority::Low);
        store.insert_task(&task).unwrap();
        store.update_status(&task.id, TaskStatus::InFlight, 0).unwrap();
        store.insert_task(&task).unwrap();

        let stored = store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::InFlight);
    }

    #[test]
    fn test_update_status_and_retries() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);

        let task = Task::new("data", Priority::High);
        store.insert_task(&task).unwrap();

        store.update_status(&task.id, TaskStatus::InFlight, 0).unwrap();
        store.update_status(&task.id, TaskStatus::Pending, 1).unwrap();

        let retried = store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(retried.status, TaskStatus::Pending);
        assert_eq!(retried.retry_count, 1);

        store.update_status(&task.id, TaskStatus::InFlight, 1).unwrap();
        store.update_status(&task.id, TaskStatus::Completed, 1).unwrap();

        let completed = store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(completed.status, TaskStatus::Completed);
    }

    #[test]
    fn test_terminal_status_is_kept() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);

        let task = Task::new("data", Priority::Low);
        store.insert_task(&task).unwrap();
        store.update_status(&task.id, TaskStatus::Failed, 3).unwrap();
        store.update_status(&task.id, TaskStatus::Pending, 0).unwrap();

        let stored = store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(stored.retry_count, 3);
    }

    #[test]
    fn test_update_unknown_task() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);

        let missing = uuid::Uuid::new_v4();
        match store.update_status(&missing, TaskStatus::Completed, 0) {
            Err(PersistenceError::TaskNotFound(id)) => assert_eq!(id, missing),
            other => panic!("Expected TaskNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let task = Task::new("durable", Priority::Medium);

        {
            let store = open_store(&temp_dir);
            store.insert_task(&task).unwrap();
            store.update_status(&task.id, TaskStatus::InFlight, 0).unwrap();
        }

        let store = open_store(&temp_dir);
        let in_flight = store.list_by_status(TaskStatus::InFlight).unwrap();
        assert_eq!(in_flight.len(), 1);
        assert_eq!(in_flight[0].id, task.id);
    }

    #[test]
    fn test_purge_only_touches_finished_tasks() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);

        let done = Task::new("done", Priority::Low);
        let waiting = Task::new("waiting", Priority::Low);
        store.insert_task(&done).unwrap();
        store.insert_task(&waiting).unwrap();
        store.update_status(&done.id, TaskStatus::Completed, 0).unwrap();

        let purged = store
            .purge_terminal_before(Utc::now() + Duration::seconds(1))
            .unwrap();

        assert_eq!(purged, 1);
        assert!(store.get_task(&done.id).unwrap().is_none());
        assert!(store.get_task(&waiting.id).unwrap().is_some());
    }
}
