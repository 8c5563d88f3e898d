pub mod config;
pub mod control;
pub mod dispatcher;
pub mod executor;
pub mod node;
pub mod processor;
pub mod registry;
pub mod service;
pub mod shutdown;
mod error;

pub use config::WorkerConfig;
pub use control::ControlServer;
pub use dispatcher::{DispatchContext, DispatchOptions, Dispatcher};
pub use executor::TaskExecutor;
pub use node::WorkerNode;
pub use processor::{EchoProcessor, FlakyProcessor, SleepProcessor, TaskProcessor};
pub use registry::{WorkerInfo, WorkerRegistry};
pub use service::TaskService;
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
pub use error::{Result, SubmitError, WorkerError};
