use clap::Parser;
use std::sync::Arc;
use taskq_broker::{init_tracing, StopSignals};
use taskq_worker::config::{host_worker_prefix, BrokerBackend};
use taskq_worker::{ControlServer, WorkerConfig, WorkerNode};

#[derive(Parser, Debug)]
#[command(name = "tq-worker")]
#[command(about = "taskq worker node: dispatchers, submission and status surface", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "worker.yaml")]
    config: String,

    /// Address of a tq-broker; uses the in-process broker when omitted
    #[arg(short, long)]
    broker: Option<String>,

    /// Number of dispatchers
    #[arg(long)]
    concurrency: Option<usize>,

    /// Prefix of the worker ids (`<prefix>-<n>`)
    #[arg(long, conflicts_with = "host_prefix")]
    worker_prefix: Option<String>,

    /// Use `<hostname>-<pid>` as the worker id prefix
    #[arg(long)]
    host_prefix: bool,

    /// Control surface port
    #[arg(long)]
    control_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_found = std::path::Path::new(&args.config).exists();
    let mut config = if config_found {
        WorkerConfig::from_file(&args.config)?
    } else {
        WorkerConfig::default()
    };

    init_tracing(&config.logging);
    if !config_found {
        tracing::warn!("Config file {} not found, using defaults", args.config);
    }

    if let Some(address) = args.broker {
        config.broker.backend = BrokerBackend::Remote;
        config.broker.address = address;
    }
    if let Some(concurrency) = args.concurrency {
        config.dispatch.concurrency = concurrency;
    }
    if let Some(prefix) = args.worker_prefix {
        config.dispatch.worker_id_prefix = prefix;
    } else if args.host_prefix {
        config.dispatch.worker_id_prefix = host_worker_prefix();
    }
    if let Some(port) = args.control_port {
        config.control.port = port;
    }

    tracing::info!("Starting worker node with config: {:?}", config);

    let mut signals = StopSignals::install()?;
    let control_address = config.control_address();
    let node = WorkerNode::connect(config).await?;
    let listener = tokio::net::TcpListener::bind(&control_address).await?;

    node.start().await?;

    let control = Arc::new(ControlServer::new(node.service()));
    let control_task = tokio::spawn(control.clone().serve(listener));

    let name = signals.recv().await?;
    tracing::info!("Received {}, draining workers", name);

    control.shutdown();
    node.shutdown().await;

    if let Ok(Err(e)) = control_task.await {
        tracing::error!("Control server error: {}", e);
    }

    Ok(())
}
