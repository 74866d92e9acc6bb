//! Execution lifecycle tracking
//!
//! One `ExecutionMonitor` per process, shared behind an `Arc`. Each execution
//! moves `running -> completed` or `running -> failed`; terminal records are
//! kept for later queries. All three sets live under a single lock so a record
//! is never observed in two sets at once.

use crate::workflow::{NodeResult, NodeResults};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    /// Never tracked by this monitor
    NotFound,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub context: Map<String, Value>,
    pub nodes_completed: usize,
    pub current_node: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Completion or failure time
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    /// Per-node results accumulated so far
    pub results: NodeResults,
    pub error: Option<String>,
}

impl ExecutionRecord {
    fn finish(&mut self, status: ExecutionStatus) {
        let now = Utc::now();
        self.status = status;
        self.finished_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub total_executions: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    /// completed / (completed + failed); 0 before anything finished
    pub success_rate: f64,
    /// Mean over completed executions, in milliseconds
    pub average_duration_ms: f64,
}

#[derive(Debug, Default)]
struct Executions {
    running: HashMap<String, ExecutionRecord>,
    completed: HashMap<String, ExecutionRecord>,
    failed: HashMap<String, ExecutionRecord>,
}

impl Executions {
    fn find(&self, execution_id: &str) -> Option<&ExecutionRecord> {
        self.running
            .get(execution_id)
            .or_else(|| self.completed.get(execution_id))
            .or_else(|| self.failed.get(execution_id))
    }
}

#[derive(Debug, Default)]
pub struct ExecutionMonitor {
    executions: RwLock<Executions>,
}

impl ExecutionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin tracking. An id that is already tracked is left untouched.
    pub fn track_start(&self, workflow_id: &str, execution_id: &str, context: &Map<String, Value>) -> bool {
        let mut executions = self.executions.write();
        if executions.find(execution_id).is_some() {
            tracing::warn!(execution_id, "⚠️ Execution id already tracked, ignoring start");
            return false;
        }

        executions.running.insert(
            execution_id.to_string(),
            ExecutionRecord {
                execution_id: execution_id.to_string(),
                workflow_id: workflow_id.to_string(),
                status: ExecutionStatus::Running,
                started_at: Utc::now(),
                context: context.clone(),
                nodes_completed: 0,
                current_node: None,
                last_updated: None,
                finished_at: None,
                duration_ms: None,
                results: NodeResults::new(),
                error: None,
            },
        );
        true
    }

    /// Record progress of a running execution; ignored otherwise
    pub fn track_node_completion(&self, execution_id: &str, node_id: &str, result: &NodeResult) {
        let mut executions = self.executions.write();
        if let Some(record) = executions.running.get_mut(execution_id) {
            record.nodes_completed += 1;
            record.current_node = Some(node_id.to_string());
            record.last_updated = Some(Utc::now());
            record.results.insert(node_id.to_string(), result.clone());
        }
    }

    /// Move a running execution to the completed set. No-op unless running.
    pub fn track_completion(&self, execution_id: &str, results: &NodeResults) {
        let mut executions = self.executions.write();
        let Some(mut record) = executions.running.remove(execution_id) else {
            tracing::debug!(execution_id, "Completion for an execution that is not running, ignored");
            return;
        };

        record.finish(ExecutionStatus::Completed);
        record.results = results.clone();
        executions.completed.insert(execution_id.to_string(), record);
    }

    /// Move a running execution to the failed set. No-op unless running.
    pub fn track_failure(&self, execution_id: &str, error: &str) {
        let mut executions = self.executions.write();
        let Some(mut record) = executions.running.remove(execution_id) else {
            tracing::debug!(execution_id, "Failure for an execution that is not running, ignored");
            return;
        };

        record.finish(ExecutionStatus::Failed);
        record.error = Some(error.to_string());
        executions.failed.insert(execution_id.to_string(), record);
    }

    pub fn get_status(&self, execution_id: &str) -> Option<ExecutionRecord> {
        self.executions.read().find(execution_id).cloned()
    }

    pub fn status(&self, execution_id: &str) -> ExecutionStatus {
        self.executions
            .read()
            .find(execution_id)
            .map_or(ExecutionStatus::NotFound, |record| record.status)
    }

    /// The record as JSON, or `{"status": "not_found"}`
    pub fn status_json(&self, execution_id: &str) -> Value {
        match self.get_status(execution_id) {
            Some(record) => serde_json::to_value(record).unwrap_or(Value::Null),
            None => json!({ "status": ExecutionStatus::NotFound }),
        }
    }

    pub fn running_ids(&self) -> Vec<String> {
        self.executions.read().running.keys().cloned().collect()
    }

    pub fn get_performance_metrics(&self) -> PerformanceMetrics {
        let executions = self.executions.read();
        let completed = executions.completed.len();
        let failed = executions.failed.len();
        let running = executions.running.len();

        let finished = completed + failed;
        let success_rate = if finished > 0 {
            completed as f64 / finished as f64
        } else {
            0.0
        };

        let average_duration_ms = if completed > 0 {
            let total: i64 = executions.completed.values().filter_map(|r| r.duration_ms).sum();
            total as f64 / completed as f64
        } else {
            0.0
        };

        PerformanceMetrics {
            total_executions: finished + running,
            running,
            completed,
            failed,
            success_rate,
            average_duration_ms,
        }
    }
}
