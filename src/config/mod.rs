//! Configuration management for contentflow
//!
//! Every section reads its defaults from environment variables so the same
//! binary runs unchanged in containers and on a laptop.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workflow definition storage
    pub database: DatabaseConfig,
    /// Execution engine behaviour
    pub engine: EngineConfig,
    /// Priority job queue backing store
    pub queue: QueueConfig,
    /// Content scheduler parameters
    pub scheduler: SchedulerConfig,
    /// Background queue dispatcher
    pub dispatcher: DispatcherConfig,
    /// Log output
    pub logging: LoggingConfig,
}

/// SQLite location for workflow definitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the workflow database file (created if missing)
    pub workflow_db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound for a single node invocation
    pub node_timeout_secs: u64,
    /// Reject forward/missing references and cycles before a run starts
    /// instead of resolving them to absent values
    pub strict_references: bool,
}

impl EngineConfig {
    pub fn node_timeout(&self) -> Duration {
        Duration::from_secs(self.node_timeout_secs.max(1))
    }
}

/// Which store backs the priority queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackendKind {
    /// Redis sorted sets (durable, shared between processes)
    Redis,
    /// Process-local sorted map; jobs are lost on restart
    Memory,
}

impl std::str::FromStr for QueueBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" | "in-memory" | "in_memory" => Ok(Self::Memory),
            other => Err(format!("unknown queue backend '{}' (expected redis or memory)", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub backend: QueueBackendKind,
    /// Connection string used when `backend` is redis
    pub redis_url: String,
    /// Prefix for the sorted-set key of every queue (e.g. "queue:publishing")
    pub key_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Offset of the slot tables' local time from UTC
    pub utc_offset_minutes: i32,
    /// Delay applied when a channel has no slot table
    pub fallback_delay_minutes: i64,
    /// Minimum gap between two posts on one channel; 0 disables collision checks
    pub min_slot_spacing_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Queues polled by the dispatcher
    pub queues: Vec<String>,
    /// Six-field cron expression for the poll tick
    pub poll_schedule: String,
    /// Maximum jobs popped per queue per tick
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when RUST_LOG is unset
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                workflow_db_path: env_or("CONTENTFLOW_DB_PATH", "data/workflows.db"),
            },
            engine: EngineConfig {
                node_timeout_secs: env_parse("CONTENTFLOW_NODE_TIMEOUT_SECS", 300),
                strict_references: env_parse("CONTENTFLOW_STRICT_REFERENCES", false),
            },
            queue: QueueConfig {
                backend: env_parse("CONTENTFLOW_QUEUE_BACKEND", QueueBackendKind::Redis),
                redis_url: env_or("CONTENTFLOW_REDIS_URL", "redis://127.0.0.1:6379/2"),
                key_prefix: env_or("CONTENTFLOW_QUEUE_PREFIX", "queue:"),
            },
            scheduler: SchedulerConfig {
                utc_offset_minutes: env_parse("CONTENTFLOW_UTC_OFFSET_MINUTES", 0),
                fallback_delay_minutes: env_parse("CONTENTFLOW_FALLBACK_DELAY_MINUTES", 60),
                min_slot_spacing_minutes: env_parse("CONTENTFLOW_MIN_SLOT_SPACING_MINUTES", 0),
            },
            dispatcher: DispatcherConfig {
                queues: env_or(
                    "CONTENTFLOW_DISPATCH_QUEUES",
                    "content_generation,publishing,notifications,workflows",
                )
                .split(',')
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .collect(),
                poll_schedule: env_or("CONTENTFLOW_DISPATCH_SCHEDULE", "*/10 * * * * *"),
                batch_size: env_parse("CONTENTFLOW_DISPATCH_BATCH", 10),
            },
            logging: LoggingConfig {
                filter: env_or("CONTENTFLOW_LOG", "info"),
                json: env_parse("CONTENTFLOW_LOG_JSON", false),
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
