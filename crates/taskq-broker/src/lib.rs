pub mod queue;
pub mod transport;
pub mod memory;
pub mod remote;
pub mod server;
pub mod config;
pub mod logging;
pub mod signal;
mod error;

pub use queue::PriorityQueue;
pub use transport::BrokerTransport;
pub use memory::MemoryTransport;
pub use remote::RemoteTransport;
pub use server::BrokerServer;
pub use config::{BrokerConfig, LogFormat, LoggingConfig};
pub use logging::init_tracing;
pub use signal::StopSignals;
pub use error::{BrokerError, Result};
