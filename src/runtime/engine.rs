//! Sequential workflow execution engine
//!
//! Runs a workflow's nodes strictly in declared order, one at a time, feeding
//! each node literals and references to earlier nodes' outputs. The first
//! failing node aborts the run; side effects already applied stay applied.
//! Every node invocation is bounded by a timeout and raced against the run's
//! cancellation token.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::nodes::NodeRegistry;
use crate::runtime::monitor::ExecutionMonitor;
use crate::workflow::{ExecutionContext, NodeResults, PlannedStep, WorkflowPlan, WorkflowStore};
use serde_json::{Map, Value};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Per-run knobs
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Use this id instead of generating one, so the caller can query the
    /// monitor while the run is in flight
    pub execution_id: Option<String>,
    pub cancel: CancellationToken,
}

impl RunOptions {
    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

pub struct ExecutionEngine {
    store: Arc<dyn WorkflowStore>,
    registry: Arc<NodeRegistry>,
    monitor: Arc<ExecutionMonitor>,
    node_timeout: Duration,
    strict_references: bool,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("registry", &self.registry)
            .field("node_timeout", &self.node_timeout)
            .field("strict_references", &self.strict_references)
            .finish_non_exhaustive()
    }
}

impl ExecutionEngine {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        registry: Arc<NodeRegistry>,
        monitor: Arc<ExecutionMonitor>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            monitor,
            node_timeout: config.node_timeout(),
            strict_references: config.strict_references,
        }
    }

    pub fn monitor(&self) -> &Arc<ExecutionMonitor> {
        &self.monitor
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Run `workflow_id` with the caller's initial context and return every
    /// node's result keyed by node id
    pub async fn execute_workflow(
        &self,
        workflow_id: &str,
        context: Map<String, Value>,
    ) -> Result<NodeResults, EngineError> {
        self.execute_with(workflow_id, context, RunOptions::default()).await
    }

    pub async fn execute_with(
        &self,
        workflow_id: &str,
        context: Map<String, Value>,
        options: RunOptions,
    ) -> Result<NodeResults, EngineError> {
        let workflow = self
            .store
            .load(workflow_id)
            .await?
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;

        let plan = WorkflowPlan::compile(&workflow);
        if !plan.is_sound() {
            if self.strict_references {
                let issues: Vec<String> = plan.issues.iter().map(ToString::to_string).collect();
                tracing::error!("❌ Workflow '{}' rejected: {}", workflow_id, issues.join("; "));
                return Err(EngineError::Configuration(format!(
                    "workflow '{}' has invalid references: {}",
                    workflow_id,
                    issues.join("; ")
                )));
            }
            for issue in &plan.issues {
                tracing::warn!("⚠️ Workflow '{}': {}", workflow_id, issue);
            }
        }

        let execution_id = options
            .execution_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if !self.monitor.track_start(workflow_id, &execution_id, &context) {
            return Err(EngineError::Configuration(format!(
                "execution id '{}' is already in use",
                execution_id
            )));
        }

        let ctx = ExecutionContext::new(execution_id.clone(), workflow_id, context);
        let run_start = std::time::Instant::now();
        tracing::info!(execution_id = %execution_id, "🚀 Starting workflow '{}' ({} nodes)", workflow_id, plan.steps.len());

        match self.run_steps(&plan, &ctx, &options.cancel).await {
            Ok(results) => {
                self.monitor.track_completion(&execution_id, &results);
                tracing::info!(execution_id = %execution_id, "🎉 Workflow '{}' completed in {:?}", workflow_id, run_start.elapsed());
                Ok(results)
            }
            Err(err) => {
                self.monitor.track_failure(&execution_id, &err.to_string());
                tracing::error!(execution_id = %execution_id, "❌ Workflow '{}' failed after {:?}: {}", workflow_id, run_start.elapsed(), err);
                Err(err)
            }
        }
    }

    async fn run_steps(
        &self,
        plan: &WorkflowPlan,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<NodeResults, EngineError> {
        let mut results = NodeResults::new();

        for (position, step) in plan.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(self.cancelled(ctx, step));
            }

            tracing::info!(
                execution_id = %ctx.execution_id,
                node_id = %step.node_id,
                "📍 Step {}/{}: '{}' ({})",
                position + 1,
                plan.steps.len(),
                step.node_id,
                step.node_type
            );

            let executor = self.registry.create(&step.node_type, &step.config)?;
            let inputs = step.resolve_inputs(&results);
            let node_start = std::time::Instant::now();

            // Own task per node: a panic surfaces as a JoinError instead of
            // unwinding through the run
            let node_ctx = ctx.clone();
            let mut invocation = tokio::spawn(async move { executor.execute(inputs, &node_ctx).await });

            let output = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    invocation.abort();
                    return Err(self.cancelled(ctx, step));
                }
                outcome = tokio::time::timeout(self.node_timeout, &mut invocation) => match outcome {
                    Err(_) => {
                        invocation.abort();
                        return Err(EngineError::NodeTimeout {
                            execution_id: ctx.execution_id.clone(),
                            node_id: step.node_id.clone(),
                            timeout: self.node_timeout,
                        });
                    }
                    Ok(Err(join_error)) => {
                        return Err(EngineError::NodeExecution {
                            execution_id: ctx.execution_id.clone(),
                            node_id: step.node_id.clone(),
                            message: panic_message(join_error),
                        });
                    }
                    Ok(Ok(Err(e))) => {
                        return Err(EngineError::NodeExecution {
                            execution_id: ctx.execution_id.clone(),
                            node_id: step.node_id.clone(),
                            message: e.to_string(),
                        });
                    }
                    Ok(Ok(Ok(output))) => output,
                },
            };

            tracing::debug!(node_id = %step.node_id, "✅ Node finished in {:?} ({} fields)", node_start.elapsed(), output.len());
            self.monitor.track_node_completion(&ctx.execution_id, &step.node_id, &output);
            results.insert(step.node_id.clone(), output);
        }

        Ok(results)
    }

    fn cancelled(&self, ctx: &ExecutionContext, step: &PlannedStep) -> EngineError {
        tracing::warn!(execution_id = %ctx.execution_id, "🛑 Cancelled at node '{}'", step.node_id);
        EngineError::Cancelled {
            execution_id: ctx.execution_id.clone(),
            node_id: step.node_id.clone(),
        }
    }
}

fn panic_message(error: tokio::task::JoinError) -> String {
    if !error.is_panic() {
        return format!("node task aborted: {}", error);
    }
    let payload = error.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("node panicked: {}", detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NodeError;
    use crate::nodes::{NodeExecutor, NodeKind};
    use crate::runtime::monitor::ExecutionStatus;
    use crate::workflow::{InMemoryWorkflowStore, NodeInputs, NodeResult, NodeSpec, WorkflowDefinition};
    use async_trait::async_trait;
    use serde_json::json;

    struct Constant;

    #[async_trait]
    impl NodeExecutor for Constant {
        fn kind(&self) -> NodeKind {
            NodeKind::Processor
        }

        async fn execute(&self, inputs: NodeInputs, _ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
            let mut out = inputs;
            out.insert("result".into(), json!(42));
            Ok(out)
        }
    }

    fn engine(workflow: WorkflowDefinition, strict: bool) -> ExecutionEngine {
        let store = InMemoryWorkflowStore::new();
        store.insert(workflow);
        let registry = NodeRegistry::new();
        registry.register("constant", |_| Ok(Box::new(Constant) as Box<dyn NodeExecutor>));
        let config = EngineConfig {
            node_timeout_secs: 5,
            strict_references: strict,
        };
        ExecutionEngine::new(Arc::new(store), Arc::new(registry), Arc::new(ExecutionMonitor::new()), &config)
    }

    fn forward_reference_workflow() -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf".into(),
            name: "forward".into(),
            nodes: vec![
                NodeSpec::new("a", "constant").with_input("x", "$b.result"),
                NodeSpec::new("b", "constant"),
            ],
        }
    }

    #[tokio::test]
    async fn lenient_mode_resolves_forward_reference_to_null() {
        let engine = engine(forward_reference_workflow(), false);
        let results = engine.execute_workflow("wf", Map::new()).await.unwrap();
        assert_eq!(results["a"]["x"], Value::Null);
        assert_eq!(results["b"]["result"], 42);
    }

    #[tokio::test]
    async fn strict_mode_rejects_before_running() {
        let engine = engine(forward_reference_workflow(), true);
        let err = engine.execute_workflow("wf", Map::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::Configuration(msg) if msg.contains("$b.result")));
        assert_eq!(engine.monitor().get_performance_metrics().total_executions, 0);
    }

    #[tokio::test]
    async fn missing_workflow() {
        let engine = engine(forward_reference_workflow(), false);
        let err = engine.execute_workflow("other", Map::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::WorkflowNotFound(id) if id == "other"));
    }

    #[tokio::test]
    async fn unknown_node_type_fails_run_as_configuration_error() {
        let workflow = WorkflowDefinition {
            id: "wf".into(),
            name: "bad".into(),
            nodes: vec![NodeSpec::new("a", "constant"), NodeSpec::new("b", "teleport")],
        };
        let engine = engine(workflow, false);
        let options = RunOptions::default().with_execution_id("run-1");
        let err = engine.execute_with("wf", Map::new(), options).await.unwrap_err();

        assert!(matches!(err, EngineError::Configuration(_)));
        let record = engine.monitor().get_status("run-1").unwrap();
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.nodes_completed, 1);
    }

    #[tokio::test]
    async fn pinned_execution_id_cannot_be_reused() {
        let engine = engine(forward_reference_workflow(), false);
        let options = RunOptions::default().with_execution_id("run-1");
        engine.execute_with("wf", Map::new(), options.clone()).await.unwrap();
        let err = engine.execute_with("wf", Map::new(), options).await.unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
        assert_eq!(engine.monitor().status("run-1"), ExecutionStatus::Completed);
    }
}
