use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;
use taskq_client::TaskQueueAsyncClient;
use taskq_core::{Task, TaskStatus};
use taskq_protocol::QueueDepth;

#[derive(Parser, Debug)]
#[command(name = "tq-admin")]
#[command(about = "taskq admin CLI", long_about = None)]
struct Args {
    /// Control address of a worker node
    #[arg(short, long, default_value = "127.0.0.1:7070")]
    node: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Table,
    Json,
    Yaml,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit a new task
    Submit {
        /// Payload text
        #[arg(conflicts_with = "payload_file", required_unless_present = "payload_file")]
        payload: Option<String>,

        /// Read the payload from a file
        #[arg(long)]
        payload_file: Option<String>,

        /// Priority: 1 (low), 2 (medium) or 3 (high)
        #[arg(short = 'P', long)]
        priority: Option<u8>,
    },

    /// List persisted tasks
    Tasks {
        /// Filter by status (pending, in_flight, completed, failed)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// List active workers
    Workers,

    /// Show queue depth per tier
    Depth,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let client = TaskQueueAsyncClient::connect(args.node.clone()).await?;

    match args.command {
        Commands::Submit {
            payload,
            payload_file,
            priority,
        } => {
            let payload = match (payload, payload_file) {
                (Some(payload), _) => payload,
                (None, Some(path)) => std::fs::read_to_string(path)?,
                (None, None) => anyhow::bail!("a payload or --payload-file is required"),
            };

            let task = client.submit_task(payload, priority).await?;
            match args.format {
                Format::Table => println!("Task submitted: {}", task.id),
                format => print_structured(format, &task)?,
            }
        }

        Commands::Tasks { status } => {
            let status = status.map(|s| s.parse::<TaskStatus>()).transpose()?;
            let tasks = client.list_tasks(status).await?;
            match args.format {
                Format::Table => println!("{}", tasks_table(&tasks)),
                format => print_structured(format, &tasks)?,
            }
        }

        Commands::Workers => {
            let workers = client.list_workers().await?;
            match args.format {
                Format::Table => println!("{}", workers_table(&workers)),
                format => print_structured(format, &workers)?,
            }
        }

        Commands::Depth => {
            let depth = client.queue_depth().await?;
            match args.format {
                Format::Table => print!("{}", depth_bars(&depth)),
                format => print_structured(format, &depth)?,
            }
        }
    }

    Ok(())
}

fn print_structured<T: Serialize>(format: Format, value: &T) -> anyhow::Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Format::Yaml | Format::Table => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

fn tasks_table(tasks: &[Task]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["ID", "Payload", "Status", "Priority", "Retries", "Created"]);
    for task in tasks {
        table.add_row(vec![
            task.id.to_string(),
            task.payload.clone(),
            task.status.to_string(),
            task.priority.to_string(),
            task.retry_count.to_string(),
            task.created_at.to_rfc3339(),
        ]);
    }
    table
}

fn workers_table(workers: &[String]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Worker ID"]);
    for worker in workers {
        table.add_row(vec![worker.as_str()]);
    }
    table
}

fn depth_bars(depth: &QueueDepth) -> String {
    format!(
        "Queue Depth by Priority:\n  High:   {} {}\n  Medium: {} {}\n  Low:    {} {}\n",
        depth.high,
        "█".repeat(depth.high.min(50)),
        depth.medium,
        "█".repeat(depth.medium.min(50)),
        depth.low,
        "█".repeat(depth.low.min(50)),
    )
}
