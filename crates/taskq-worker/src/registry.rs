use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use taskq_core::TaskId;
use tracing::{info, warn};

/// Information about a registered dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerInfo {
    pub worker_id: String,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Task the dispatcher is processing right now
    pub current_task: Option<TaskId>,
}

impl WorkerInfo {
    fn new(worker_id: String) -> Self {
        let now = Utc::now();
        WorkerInfo {
            worker_id,
            registered_at: now,
            last_seen: now,
            current_task: None,
        }
    }

    /// Seen within `timeout`
    pub fn is_alive(&self, timeout: Duration) -> bool {
        Utc::now() - self.last_seen < timeout
    }
}

/// Live dispatcher identities of this node.
///
/// Without a liveness timeout an entry stays until it is deregistered, so a
/// dispatcher that dies without deregistering leaves a stale entry. With a
/// timeout, entries that stop being touched drop out of [`list_active`]
/// and are removed by [`prune_stale`].
///
/// [`list_active`]: WorkerRegistry::list_active
/// [`prune_stale`]: WorkerRegistry::prune_stale
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, WorkerInfo>>,
    liveness_timeout: Option<Duration>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        WorkerRegistry {
            workers: RwLock::new(HashMap::new()),
            liveness_timeout: None,
        }
    }

    pub fn with_liveness_timeout(timeout: std::time::Duration) -> Self {
        WorkerRegistry {
            workers: RwLock::new(HashMap::new()),
            liveness_timeout: Some(Duration::from_std(timeout).unwrap_or_else(|_| Duration::days(36_500))),
        }
    }

    /// Register a worker. Registering an id twice keeps the first entry.
    pub fn register(&self, worker_id: &str) -> WorkerInfo {
        let mut workers = self.workers.write();
        let info = workers
            .entry(worker_id.to_string())
            .and_modify(|info| info.last_seen = Utc::now())
            .or_insert_with(|| WorkerInfo::new(worker_id.to_string()));
        info.clone()
    }

    /// Deregister a worker. Unknown ids are ignored.
    pub fn deregister(&self, worker_id: &str) -> Option<WorkerInfo> {
        self.workers.write().remove(worker_id)
    }

    /// Refresh the entry's liveness; false if it is not registered
    pub fn touch(&self, worker_id: &str) -> bool {
        let mut workers = self.workers.write();
        match workers.get_mut(worker_id) {
            Some(worker) => {
                worker.last_seen = Utc::now();
                true
            }
            None => false,
        }
    }

    /// How often a busy dispatcher must refresh its entry to stay listed.
    /// `None` without a liveness timeout.
    pub fn heartbeat_interval(&self) -> Option<std::time::Duration> {
        self.liveness_timeout
            .and_then(|timeout| timeout.to_std().ok())
            .map(|timeout| (timeout / 3).max(std::time::Duration::from_millis(1)))
    }

    pub fn assign_task(&self, worker_id: &str, task_id: TaskId) {
        if let Some(worker) = self.workers.write().get_mut(worker_id) {
            worker.current_task = Some(task_id);
            worker.last_seen = Utc::now();
        }
    }

    pub fn clear_task(&self, worker_id: &str) {
        if let Some(worker) = self.workers.write().get_mut(worker_id) {
            worker.current_task = None;
            worker.last_seen = Utc::now();
        }
    }

    pub fn get(&self, worker_id: &str) -> Option<WorkerInfo> {
        self.workers.read().get(worker_id).cloned()
    }

    fn is_live(&self, info: &WorkerInfo) -> bool {
        self.liveness_timeout
            .map_or(true, |timeout| info.is_alive(timeout))
    }

    /// Ids of the active workers, sorted
    pub fn list_active(&self) -> Vec<String> {
        let workers = self.workers.read();
        let mut ids: Vec<String> = workers
            .values()
            .filter(|info| self.is_live(info))
            .map(|info| info.worker_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Active entries with their details, sorted by id
    pub fn active_workers(&self) -> Vec<WorkerInfo> {
        let workers = self.workers.read();
        let mut active: Vec<WorkerInfo> = workers
            .values()
            .filter(|info| self.is_live(info))
            .cloned()
            .collect();
        active.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        active
    }

    /// Remove entries past the liveness timeout. A no-op without one.
    pub fn prune_stale(&self) -> Vec<WorkerInfo> {
        let Some(timeout) = self.liveness_timeout else {
            return Vec::new();
        };

        let mut workers = self.workers.write();
        let stale: Vec<String> = workers
            .values()
            .filter(|info| !info.is_alive(timeout))
            .map(|info| info.worker_id.clone())
            .collect();

        let mut removed = Vec::with_capacity(stale.len());
        for id in stale {
            if let Some(info) = workers.remove(&id) {
                warn!(worker = %id, task = ?info.current_task, "Pruned stale worker");
                removed.push(info);
            }
        }
        if !removed.is_empty() {
            info!("Pruned {} stale workers", removed.len());
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.workers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.read().is_empty()
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
