//! Application wiring
//!
//! Builds every component from a `Config` in dependency order: workflow
//! store, job queue, scheduler, node registry, monitor, engine.

use crate::config::{Config, LoggingConfig};
use crate::nodes::{register_builtin_nodes, NodeRegistry, NodeServices};
use crate::queue::PriorityJobQueue;
use crate::runtime::{ExecutionEngine, ExecutionMonitor, QueueDispatcher, WorkflowJobHandler};
use crate::scheduling::ContentScheduler;
use crate::workflow::SqliteWorkflowStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the configured filter.
/// Logs go to stderr so stdout stays free for command output.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let installed = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_level(true)
            .with_writer(std::io::stderr)
            .try_init()
    };

    // A second init (tests, embedding) keeps the first subscriber
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Fully wired component set
pub struct App {
    pub config: Config,
    pub store: Arc<SqliteWorkflowStore>,
    pub queue: PriorityJobQueue,
    pub scheduler: Arc<ContentScheduler>,
    pub registry: Arc<NodeRegistry>,
    pub monitor: Arc<ExecutionMonitor>,
    pub engine: Arc<ExecutionEngine>,
}

impl App {
    /// Open the configured database and queue, then wire the rest
    pub async fn build(config: Config) -> Result<Self> {
        tracing::info!("🚀 Starting contentflow");

        tracing::info!("🗄️ Opening workflow store...");
        let store = SqliteWorkflowStore::open(&config.database.workflow_db_path)
            .await
            .with_context(|| format!("failed to open workflow database '{}'", config.database.workflow_db_path))?;

        tracing::info!("📬 Connecting job queue ({:?})...", config.queue.backend);
        let queue = PriorityJobQueue::from_config(&config.queue)
            .await
            .context("failed to initialize job queue")?;

        Self::from_parts(config, store, queue)
    }

    /// Wire the in-process components around an already opened store and queue
    pub fn from_parts(config: Config, store: SqliteWorkflowStore, queue: PriorityJobQueue) -> Result<Self> {
        let scheduler = Arc::new(
            ContentScheduler::from_config(&config.scheduler).context("invalid scheduler configuration")?,
        );
        tracing::info!("📅 Scheduler ready for channels: {:?}", scheduler.channels().collect::<Vec<_>>());

        let services = NodeServices::new()
            .with_queue(queue.clone())
            .with_scheduler(Arc::clone(&scheduler));
        let registry = Arc::new(NodeRegistry::new());
        register_builtin_nodes(&registry, &services);
        tracing::info!("🧩 Registered {} node types", registry.registered_types().len());

        let store = Arc::new(store);
        let monitor = Arc::new(ExecutionMonitor::new());
        let engine = Arc::new(ExecutionEngine::new(
            store.clone(),
            Arc::clone(&registry),
            Arc::clone(&monitor),
            &config.engine,
        ));
        tracing::info!("✅ Execution engine ready (node timeout {:?})", config.engine.node_timeout());

        Ok(Self {
            config,
            store,
            queue,
            scheduler,
            registry,
            monitor,
            engine,
        })
    }

    /// Dispatcher that runs workflow jobs through this app's engine
    pub async fn dispatcher(&self) -> Result<QueueDispatcher> {
        let handler = Arc::new(WorkflowJobHandler::new(Arc::clone(&self.engine)));
        QueueDispatcher::new(self.queue.clone(), handler, self.config.dispatcher.clone()).await
    }
}
