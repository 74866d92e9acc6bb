//! Runtime layer
//!
//! - Sequential workflow execution with per-node timeout and cancellation
//! - Execution lifecycle tracking and aggregate metrics
//! - Background dispatcher draining the job queues

// Ordered node execution over a compiled reference plan
pub mod engine;

// Running / completed / failed bookkeeping shared across runs
pub mod monitor;

// Cron-driven queue polling and job hand-off
pub mod dispatcher;

pub use dispatcher::{HandoffLogger, JobHandler, QueueDispatcher, WorkflowJobHandler};
pub use engine::{ExecutionEngine, RunOptions};
pub use monitor::{ExecutionMonitor, ExecutionRecord, ExecutionStatus, PerformanceMetrics};
