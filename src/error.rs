//! Error taxonomy for workflow execution
//!
//! `NodeError` is what a node implementation raises; `EngineError` is what a
//! caller of the engine sees. Reference gaps are deliberately absent: an
//! unresolvable `$node.field` yields a null input, not an error.

use crate::queue::QueueError;
use crate::scheduling::ScheduleError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised inside a node's `execute` (or its constructor).
#[derive(Debug, Error)]
pub enum NodeError {
    /// The node's static configuration is unusable.
    #[error("invalid node configuration: {0}")]
    InvalidConfig(String),

    /// A required input was absent or had the wrong shape.
    #[error("missing or invalid input '{0}'")]
    MissingInput(String),

    /// A collaborator the node depends on is not wired in or unreachable.
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    /// The side effect or transformation itself failed.
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// Errors surfaced by the execution engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unregistered node type, or an invalid plan under strict references.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    /// A node raised; the run was aborted at this node.
    #[error("node '{node_id}' failed: {message}")]
    NodeExecution {
        execution_id: String,
        node_id: String,
        message: String,
    },

    #[error("node '{node_id}' timed out after {timeout:?}")]
    NodeTimeout {
        execution_id: String,
        node_id: String,
        timeout: Duration,
    },

    #[error("execution cancelled before node '{node_id}' finished")]
    Cancelled {
        execution_id: String,
        node_id: String,
    },

    /// The workflow store could not be read.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl EngineError {
    /// Execution id of the failed run, when the failure happened mid-run.
    pub fn execution_id(&self) -> Option<&str> {
        match self {
            EngineError::NodeExecution { execution_id, .. }
            | EngineError::NodeTimeout { execution_id, .. }
            | EngineError::Cancelled { execution_id, .. } => Some(execution_id),
            _ => None,
        }
    }
}
