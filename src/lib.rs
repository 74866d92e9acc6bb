//! contentflow: content-production pipelines
//!
//! Ordered workflow execution over typed node executors, a priority job queue
//! handing work to background dispatchers, and per-channel dispatch
//! scheduling.

// Core configuration and setup
pub mod config;

// Typed error taxonomy shared by the engine and node implementations
pub mod error;

// Workflow definitions, reference plans and definition storage
pub mod workflow;

// Node contract, registry and the built-in node catalogue
pub mod nodes;

// Priority job queue over Redis or an in-memory store
pub mod queue;

// Dispatch time computation per channel
pub mod scheduling;

// Execution engine, monitor and queue dispatcher
pub mod runtime;

// Component wiring and tracing setup
pub mod app;

// Re-export commonly used types for external consumers
pub use app::App;
pub use error::{EngineError, NodeError};
pub use nodes::{NodeExecutor, NodeKind, NodeRegistry};
pub use queue::PriorityJobQueue;
pub use runtime::{ExecutionEngine, ExecutionMonitor, RunOptions};
pub use scheduling::{ContentScheduler, ScheduleEntry, ScheduleMode};
pub use workflow::{NodeSpec, WorkflowDefinition};
