//! contentflow command line
//!
//! Every command prints JSON on stdout; logs go to stderr.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use contentflow::app::{init_tracing, App};
use contentflow::config::{Config, QueueBackendKind};
use contentflow::queue::PriorityJobQueue;
use contentflow::runtime::RunOptions;
use contentflow::scheduling::{ContentScheduler, Recurrence, ScheduleMode};
use contentflow::workflow::{SqliteWorkflowStore, WorkflowDefinition};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "contentflow")]
#[command(version, about = "Content pipeline workflows, job queues and dispatch scheduling")]
struct Cli {
    /// Override the configured queue backend (redis or memory)
    #[arg(long, global = true)]
    queue_backend: Option<QueueBackendKind>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a stored workflow and print its node results
    Run {
        workflow_id: String,
        /// Initial context as a JSON object
        #[arg(long, default_value = "{}")]
        context: String,
        /// Pin the execution id
        #[arg(long)]
        execution_id: Option<String>,
    },
    /// Store (or replace) a workflow definition from a JSON file
    Import { path: PathBuf },
    /// List stored workflows
    List,
    /// Add a job to a queue
    Enqueue {
        queue: String,
        /// Job payload as JSON
        #[arg(long, default_value = "{}")]
        payload: String,
        /// Lower runs first
        #[arg(long, default_value_t = 0)]
        priority: i64,
    },
    /// Show size and head/tail of one or more queues
    QueueStats {
        #[arg(required = true)]
        queues: Vec<String>,
    },
    /// Remove every job from a queue
    ClearQueue { queue: String },
    /// Compute dispatch times for a piece of content
    Schedule {
        content_id: String,
        /// Comma-separated channels
        #[arg(long, value_delimiter = ',', required = true)]
        channels: Vec<String>,
        /// immediate, optimal, specific or recurring
        #[arg(long, default_value = "optimal")]
        mode: String,
        /// RFC 3339 time for the specific mode
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        /// Recurrence as JSON, e.g. {"frequency":"daily","interval":1}
        #[arg(long)]
        recurrence: Option<String>,
    },
    /// Poll the configured queues and run workflow jobs
    Dispatch {
        /// Drain a single batch and exit
        #[arg(long)]
        once: bool,
    },
}

fn parse_json<T: serde::de::DeserializeOwned>(what: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).with_context(|| format!("--{} is not valid JSON", what))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::default();
    if let Some(backend) = cli.queue_backend {
        config.queue.backend = backend;
    }
    init_tracing(&config.logging);

    match cli.command {
        Commands::Run {
            workflow_id,
            context,
            execution_id,
        } => {
            let context: Map<String, Value> = parse_json("context", &context)?;
            let app = App::build(config).await?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            let mut options = RunOptions::default().with_cancel(cancel);
            if let Some(id) = execution_id {
                options = options.with_execution_id(id);
            }

            match app.engine.execute_with(&workflow_id, context, options).await {
                Ok(results) => print_json(&results),
                Err(err) => {
                    if let Some(id) = err.execution_id() {
                        print_json(&app.monitor.status_json(id))?;
                    }
                    Err(err).with_context(|| format!("workflow '{}' failed", workflow_id))
                }
            }
        }
        Commands::Import { path } => {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let workflow: WorkflowDefinition =
                serde_json::from_str(&raw).with_context(|| format!("{} is not a workflow definition", path.display()))?;

            let store = SqliteWorkflowStore::open(&config.database.workflow_db_path).await?;
            store.save_workflow(&workflow).await?;
            print_json(&json!({ "imported": workflow.id, "nodes": workflow.nodes.len() }))
        }
        Commands::List => {
            let store = SqliteWorkflowStore::open(&config.database.workflow_db_path).await?;
            print_json(&store.list_workflows().await?)
        }
        Commands::Enqueue {
            queue,
            payload,
            priority,
        } => {
            let payload: Value = parse_json("payload", &payload)?;
            let jobs = PriorityJobQueue::from_config(&config.queue).await?;
            let job_id = jobs.add_to_queue(&queue, payload, priority).await?;
            print_json(&json!({ "queue": queue, "jobId": job_id, "priority": priority }))
        }
        Commands::QueueStats { queues } => {
            let jobs = PriorityJobQueue::from_config(&config.queue).await?;
            let mut stats = Vec::with_capacity(queues.len());
            for queue in &queues {
                stats.push(jobs.get_queue_stats(queue).await?);
            }
            print_json(&stats)
        }
        Commands::ClearQueue { queue } => {
            let jobs = PriorityJobQueue::from_config(&config.queue).await?;
            jobs.clear_queue(&queue).await?;
            print_json(&json!({ "cleared": queue }))
        }
        Commands::Schedule {
            content_id,
            channels,
            mode,
            at,
            recurrence,
        } => {
            let recurrence: Option<Recurrence> = recurrence
                .as_deref()
                .map(|raw| parse_json("recurrence", raw))
                .transpose()?;
            let mode = ScheduleMode::from_parts(&mode, at, recurrence)?;
            let scheduler = ContentScheduler::from_config(&config.scheduler)?;
            print_json(&scheduler.schedule_content(&content_id, &channels, &mode).await)
        }
        Commands::Dispatch { once } => {
            let app = App::build(config).await?;
            let mut dispatcher = app.dispatcher().await?;

            if once {
                let handled = dispatcher.drain_once().await;
                return print_json(&json!({ "handled": handled }));
            }

            dispatcher.start().await?;
            tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
            dispatcher.shutdown().await
        }
    }
}
