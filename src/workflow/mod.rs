//! Workflow management layer
//!
//! - Type definitions (WorkflowDefinition, NodeSpec, ExecutionContext)
//! - Reference plan compiled from a definition before each run
//! - Definition storage (SQLite with sqlx, or in-memory)

pub mod types;

pub mod plan;

pub mod storage;

pub use plan::{InputBinding, NodeReference, PlanIssue, PlannedStep, WorkflowPlan};
pub use storage::{InMemoryWorkflowStore, SqliteWorkflowStore, WorkflowStore};
pub use types::{ExecutionContext, NodeInputs, NodeResult, NodeResults, NodeSpec, WorkflowDefinition};
