use crate::{Result, WorkerError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use taskq_broker::LoggingConfig;
use taskq_core::{Backoff, RetryPolicy, DEFAULT_MAX_RETRIES};

/// Configuration of a `tq-worker` node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub broker: BrokerSettings,
    pub store: StoreSettings,
    pub dispatch: DispatchSettings,
    pub registry: RegistrySettings,
    pub processor: ProcessorConfig,
    pub control: ControlSettings,
    pub shutdown: ShutdownSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerBackend {
    /// Tier lists live inside this process
    #[default]
    Memory,
    /// Tier lists live in a `tq-broker` process
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub backend: BrokerBackend,
    pub address: String,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        BrokerSettings {
            backend: BrokerBackend::Memory,
            address: "127.0.0.1:6379".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Rocksdb,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub data_dir: PathBuf,
    /// Terminal records older than this are purged; kept forever when unset
    pub completed_task_retention_days: Option<u64>,
    pub retention_sweep_interval_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            backend: StoreBackend::Rocksdb,
            data_dir: PathBuf::from("./data"),
            completed_task_retention_days: None,
            retention_sweep_interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    pub concurrency: usize,
    pub worker_id_prefix: String,
    pub poll_interval_ms: u64,
    pub max_retries: u32,
    /// Delay before a failed task is re-enqueued; immediate when unset
    pub retry_backoff: Option<Backoff>,
    pub task_timeout_secs: Option<u64>,
    pub persist_attempts: u32,
    pub enqueue_attempts: u32,
    /// Defaults to on for the in-process broker, off for a remote one
    pub recover_on_startup: Option<bool>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        DispatchSettings {
            concurrency: 5,
            worker_id_prefix: "worker".to_string(),
            poll_interval_ms: 1000,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: None,
            task_timeout_secs: None,
            persist_attempts: 5,
            enqueue_attempts: 10,
            recover_on_startup: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Entries not touched within this window are hidden and pruned
    pub liveness_timeout_secs: Option<u64>,
}

/// The processing capability every dispatcher runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProcessorConfig {
    Echo,
    Sleep {
        #[serde(default = "default_work_ms")]
        duration_ms: u64,
    },
    Flaky {
        #[serde(default = "default_failure_rate")]
        failure_rate: f64,
        #[serde(default = "default_work_ms")]
        work_ms: u64,
    },
}

fn default_work_ms() -> u64 {
    2000
}

fn default_failure_rate() -> f64 {
    0.25
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig::Flaky {
            failure_rate: default_failure_rate(),
            work_ms: default_work_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ControlSettings {
    fn default() -> Self {
        ControlSettings {
            host: "127.0.0.1".to_string(),
            port: 7070,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownSettings {
    /// Drain time after which a warning is logged; dispatchers are never aborted
    pub graceful_timeout_secs: u64,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        ShutdownSettings {
            graceful_timeout_secs: 30,
        }
    }
}

impl WorkerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: WorkerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dispatch.concurrency == 0 {
            return Err(WorkerError::Config("dispatch.concurrency must be at least 1".to_string()));
        }
        if self.dispatch.max_retries == 0 {
            return Err(WorkerError::Config("dispatch.max_retries must be at least 1".to_string()));
        }
        if self.dispatch.worker_id_prefix.is_empty() {
            return Err(WorkerError::Config("dispatch.worker_id_prefix must not be empty".to_string()));
        }
        if let ProcessorConfig::Flaky { failure_rate, .. } = self.processor {
            if !(0.0..=1.0).contains(&failure_rate) {
                return Err(WorkerError::Config(format!(
                    "processor.failure_rate must be between 0 and 1 (got {})",
                    failure_rate
                )));
            }
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        let policy = RetryPolicy::new(self.dispatch.max_retries)
            .map_err(|e| WorkerError::Config(e.to_string()))?;
        Ok(match &self.dispatch.retry_backoff {
            Some(backoff) => policy.with_backoff(backoff.clone()),
            None => policy,
        })
    }

    /// Ids `<prefix>-1` .. `<prefix>-<concurrency>`
    pub fn worker_ids(&self) -> Vec<String> {
        (1..=self.dispatch.concurrency)
            .map(|n| format!("{}-{}", self.dispatch.worker_id_prefix, n))
            .collect()
    }

    pub fn recover_on_startup(&self) -> bool {
        self.dispatch
            .recover_on_startup
            .unwrap_or(self.broker.backend == BrokerBackend::Memory)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch.poll_interval_ms)
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.dispatch.task_timeout_secs.map(Duration::from_secs)
    }

    pub fn liveness_timeout(&self) -> Option<Duration> {
        self.registry.liveness_timeout_secs.map(Duration::from_secs)
    }

    pub fn control_address(&self) -> String {
        format!("{}:{}", self.control.host, self.control.port)
    }
}

/// Default worker id prefix for a node started without configuration.
pub fn host_worker_prefix() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .map(|host| format!("{}-{}", host, std::process::id()))
        .unwrap_or_else(|| "worker".to_string())
}
