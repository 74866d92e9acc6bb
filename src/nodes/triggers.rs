//! Trigger nodes
//!
//! Triggers start a pipeline. They record who or what started it and pass
//! their inputs through. The run context is read-only, so provenance lands in
//! the trigger's own result where later nodes reach it as `$trigger.field`.

use super::{parse_config, with_passthrough, NodeExecutor, NodeKind};
use crate::error::NodeError;
use crate::workflow::{ExecutionContext, NodeInputs, NodeResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

/// Time the run was triggered: the caller's `currentTime`, else the run start
fn trigger_time(ctx: &ExecutionContext) -> Value {
    ctx.get("currentTime")
        .cloned()
        .unwrap_or_else(|| json!(ctx.started_at.to_rfc3339()))
}

fn provenance(trigger_type: &str, fields: Vec<(&str, Value)>) -> NodeResult {
    let mut result = NodeResult::new();
    result.insert("triggerType".into(), json!(trigger_type));
    for (key, value) in fields {
        result.insert(key.to_string(), value);
    }
    result
}

#[derive(Debug, Default)]
pub struct ManualTrigger;

#[async_trait]
impl NodeExecutor for ManualTrigger {
    fn kind(&self) -> NodeKind {
        NodeKind::Trigger
    }

    async fn execute(&self, inputs: NodeInputs, ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let user_id = ctx.get("userId").cloned().unwrap_or(Value::Null);
        tracing::debug!("👆 Manual trigger for run {}", ctx.execution_id);
        Ok(with_passthrough(
            provenance("manual", vec![("userId", user_id), ("triggeredAt", trigger_time(ctx))]),
            inputs,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct ScheduleTriggerConfig {
    #[serde(default)]
    schedule_time: Option<Value>,
}

#[derive(Debug)]
pub struct ScheduleTrigger {
    scheduled_time: Value,
}

impl ScheduleTrigger {
    pub fn from_config(config: &Value) -> Result<Self, NodeError> {
        let config: ScheduleTriggerConfig = parse_config("schedule_trigger", config)?;
        Ok(Self {
            scheduled_time: config.schedule_time.unwrap_or(Value::Null),
        })
    }
}

#[async_trait]
impl NodeExecutor for ScheduleTrigger {
    fn kind(&self) -> NodeKind {
        NodeKind::Trigger
    }

    async fn execute(&self, inputs: NodeInputs, ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        Ok(with_passthrough(
            provenance(
                "schedule",
                vec![("scheduledTime", self.scheduled_time.clone()), ("triggeredAt", trigger_time(ctx))],
            ),
            inputs,
        ))
    }
}

/// Unpacks a `webhookData` envelope `{source, eventType, data}`
#[derive(Debug, Default)]
pub struct WebhookTrigger;

#[async_trait]
impl NodeExecutor for WebhookTrigger {
    fn kind(&self) -> NodeKind {
        NodeKind::Trigger
    }

    async fn execute(&self, inputs: NodeInputs, _ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let envelope = inputs.get("webhookData").cloned().unwrap_or_else(|| json!({}));
        let field = |name: &str| envelope.get(name).cloned().unwrap_or(Value::Null);

        tracing::debug!("🪝 Webhook trigger from {}", field("source"));
        Ok(with_passthrough(
            provenance(
                "webhook",
                vec![
                    ("source", field("source")),
                    ("eventType", field("eventType")),
                    ("data", envelope.get("data").cloned().unwrap_or_else(|| json!({}))),
                ],
            ),
            inputs,
        ))
    }
}

#[derive(Debug, Default)]
pub struct ContentUploadTrigger;

#[async_trait]
impl NodeExecutor for ContentUploadTrigger {
    fn kind(&self) -> NodeKind {
        NodeKind::Trigger
    }

    async fn execute(&self, inputs: NodeInputs, ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let file_path = inputs.get("filePath").cloned().unwrap_or(Value::Null);
        let file_type = inputs.get("fileType").cloned().unwrap_or(Value::Null);
        Ok(with_passthrough(
            provenance(
                "content_upload",
                vec![("filePath", file_path), ("fileType", file_type), ("uploadTime", trigger_time(ctx))],
            ),
            inputs,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::testing::{ctx, ctx_with, inputs};

    #[tokio::test]
    async fn manual_trigger_stamps_user_and_passes_inputs() {
        let ctx = ctx_with(json!({ "userId": "u-7", "currentTime": "2024-03-05T09:00:00Z" }));
        let out = ManualTrigger.execute(inputs(json!({ "topic": "cats" })), &ctx).await.unwrap();

        assert_eq!(out["triggerType"], "manual");
        assert_eq!(out["userId"], "u-7");
        assert_eq!(out["triggeredAt"], "2024-03-05T09:00:00Z");
        assert_eq!(out["topic"], "cats");
    }

    #[tokio::test]
    async fn schedule_trigger_reports_configured_time() {
        let node = ScheduleTrigger::from_config(&json!({ "schedule_time": "0 9 * * *" })).unwrap();
        let out = node.execute(NodeInputs::new(), &ctx()).await.unwrap();
        assert_eq!(out["triggerType"], "schedule");
        assert_eq!(out["scheduledTime"], "0 9 * * *");
        assert!(out["triggeredAt"].is_string());
    }

    #[tokio::test]
    async fn webhook_trigger_unpacks_envelope() {
        let payload = json!({
            "webhookData": { "source": "drive", "eventType": "file.created", "data": { "id": 3 } }
        });
        let out = WebhookTrigger.execute(inputs(payload), &ctx()).await.unwrap();
        assert_eq!(out["source"], "drive");
        assert_eq!(out["eventType"], "file.created");
        assert_eq!(out["data"], json!({ "id": 3 }));
        assert!(out.contains_key("webhookData"));
    }

    #[tokio::test]
    async fn webhook_trigger_tolerates_missing_envelope() {
        let out = WebhookTrigger.execute(NodeInputs::new(), &ctx()).await.unwrap();
        assert_eq!(out["source"], Value::Null);
        assert_eq!(out["data"], json!({}));
    }

    #[tokio::test]
    async fn upload_trigger_reports_file() {
        let out = ContentUploadTrigger
            .execute(inputs(json!({ "filePath": "raw/clip.mp4", "fileType": "video" })), &ctx())
            .await
            .unwrap();
        assert_eq!(out["triggerType"], "content_upload");
        assert_eq!(out["filePath"], "raw/clip.mp4");
        assert!(out["uploadTime"].is_string());
    }
}
