//! Core workflow type definitions
//!
//! Workflow definitions are stored and exchanged as JSON; these types are the
//! in-memory form the engine runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Inputs handed to one node invocation, after reference resolution.
pub type NodeInputs = Map<String, Value>;

/// Output fields produced by exactly one node invocation.
pub type NodeResult = Map<String, Value>;

/// Results of a run so far, keyed by node id.
pub type NodeResults = HashMap<String, NodeResult>;

/// A complete workflow: an ordered list of steps executed as one unit.
///
/// Order matters. The engine runs `nodes` strictly in sequence and a node may
/// only consume outputs of nodes declared before it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique workflow identifier (e.g. "wf-daily-reel")
    pub id: String,
    /// Human-readable workflow name
    pub name: String,
    /// Steps in execution order
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

/// A single typed step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique within the workflow; the name other nodes reference
    pub id: String,
    /// Key into the node registry (e.g. "content_generator")
    #[serde(rename = "type")]
    pub node_type: String,
    /// Static, node-specific configuration
    #[serde(default)]
    pub config: Value,
    /// Parameter name -> literal value, or a `"$<nodeId>.<field>"` reference
    #[serde(default)]
    pub inputs: Map<String, Value>,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            config: Value::Object(Map::new()),
            inputs: Map::new(),
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }
}

/// Read-only data shared by every node of one run
///
/// `data` is whatever the caller supplied when starting the run; the ids and
/// start time are stamped by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution_id: String,
    pub workflow_id: String,
    pub started_at: DateTime<Utc>,
    pub data: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new(execution_id: impl Into<String>, workflow_id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            execution_id: execution_id.into(),
            workflow_id: workflow_id.into(),
            started_at: Utc::now(),
            data,
        }
    }

    /// Look up a caller-supplied value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}
