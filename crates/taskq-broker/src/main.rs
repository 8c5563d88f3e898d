use clap::Parser;
use std::sync::Arc;
use taskq_broker::{init_tracing, BrokerConfig, BrokerServer, StopSignals};

#[derive(Parser, Debug)]
#[command(name = "tq-broker")]
#[command(about = "Priority tier lists shared by taskq worker nodes", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "broker.yaml")]
    config: String,

    /// Broker host
    #[arg(long)]
    host: Option<String>,

    /// Broker port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_found = std::path::Path::new(&args.config).exists();
    let mut config = if config_found {
        BrokerConfig::from_file(&args.config)?
    } else {
        BrokerConfig::default()
    };

    init_tracing(&config.logging);
    if !config_found {
        tracing::warn!("Config file {} not found, using defaults", args.config);
    }

    if let Some(host) = args.host {
        config.broker.host = host;
    }
    if let Some(port) = args.port {
        config.broker.port = port;
    }

    tracing::info!("Starting broker with config: {:?}", config);

    let server = Arc::new(BrokerServer::new(config));

    let mut signals = StopSignals::install()?;
    let signal_server = server.clone();
    tokio::spawn(async move {
        match signals.recv().await {
            Ok(name) => {
                tracing::info!("Received {}, shutting down", name);
                signal_server.shutdown();
            }
            Err(e) => tracing::error!("Cannot listen for stop signals: {}", e),
        }
    });

    server.run().await?;

    Ok(())
}
