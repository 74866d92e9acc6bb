//! Action nodes
//!
//! Actions perform side effects. Provider deliveries (publishing, email,
//! Slack) are handed to the job queue for the dispatcher instead of being
//! performed inline; webhooks and file operations run directly. Queue and
//! scheduler failures propagate and abort the run.

use super::{parse_config, required_str, NodeExecutor, NodeKind, NodeServices};
use crate::error::NodeError;
use crate::scheduling::{Recurrence, ScheduleMode};
use crate::workflow::{ExecutionContext, NodeInputs, NodeResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const PUBLISHING_QUEUE: &str = "publishing";
pub const NOTIFICATIONS_QUEUE: &str = "notifications";

fn publishing_queue() -> String {
    PUBLISHING_QUEUE.into()
}

fn notifications_queue() -> String {
    NOTIFICATIONS_QUEUE.into()
}

fn envelope(fields: Vec<(&str, Value)>) -> NodeResult {
    fields.into_iter().map(|(key, value)| (key.to_string(), value)).collect()
}

#[derive(Debug, Deserialize)]
struct EnqueueJobConfig {
    queue: String,
    #[serde(default)]
    priority: i64,
}

/// Hands arbitrary work to a queue; the payload is the `payload` input, or
/// all inputs when there is none
pub struct EnqueueJob {
    config: EnqueueJobConfig,
    services: NodeServices,
}

impl EnqueueJob {
    pub fn new(config: &Value, services: NodeServices) -> Result<Self, NodeError> {
        Ok(Self {
            config: parse_config("enqueue_job", config)?,
            services,
        })
    }
}

#[async_trait]
impl NodeExecutor for EnqueueJob {
    fn kind(&self) -> NodeKind {
        NodeKind::Action
    }

    async fn execute(&self, inputs: NodeInputs, _ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let payload = match inputs.get("payload") {
            Some(payload) => payload.clone(),
            None => Value::Object(inputs),
        };
        let job_id = self
            .services
            .queue()?
            .add_to_queue(&self.config.queue, payload, self.config.priority)
            .await?;

        Ok(envelope(vec![
            ("action", json!("job_enqueued")),
            ("status", json!("queued")),
            ("queue", json!(self.config.queue)),
            ("jobId", json!(job_id)),
            ("priority", json!(self.config.priority)),
        ]))
    }
}

fn default_mode() -> String {
    "optimal".into()
}

#[derive(Debug, Deserialize)]
struct SchedulePublishConfig {
    #[serde(default)]
    channels: Vec<String>,
    #[serde(default = "default_mode")]
    mode: String,
    #[serde(default)]
    specific_time: Option<DateTime<Utc>>,
    #[serde(default)]
    recurrence: Option<Recurrence>,
    /// Also enqueue one publish job per entry
    #[serde(default)]
    enqueue: bool,
    #[serde(default = "publishing_queue")]
    queue: String,
}

/// Computes dispatch times for `contentId` on each channel and optionally
/// queues the publish jobs. Jobs are prioritised by their scheduled unix
/// time, so the earliest dispatch is the most urgent.
pub struct SchedulePublish {
    mode: ScheduleMode,
    channels: Vec<String>,
    enqueue: bool,
    queue: String,
    services: NodeServices,
}

impl SchedulePublish {
    pub fn new(config: &Value, services: NodeServices) -> Result<Self, NodeError> {
        let config: SchedulePublishConfig = parse_config("schedule_publish", config)?;
        let mode = ScheduleMode::from_parts(&config.mode, config.specific_time, config.recurrence)
            .map_err(|e| NodeError::InvalidConfig(format!("schedule_publish: {}", e)))?;

        Ok(Self {
            mode,
            channels: config.channels,
            enqueue: config.enqueue,
            queue: config.queue,
            services,
        })
    }

    fn channels(&self, inputs: &NodeInputs) -> Result<Vec<String>, NodeError> {
        let channels = match inputs.get("channels") {
            Some(Value::Array(values)) => values
                .iter()
                .map(|v| v.as_str().map(str::to_string).ok_or_else(|| NodeError::MissingInput("channels".into())))
                .collect::<Result<Vec<_>, _>>()?,
            _ => self.channels.clone(),
        };
        if channels.is_empty() {
            return Err(NodeError::MissingInput("channels".into()));
        }
        Ok(channels)
    }
}

#[async_trait]
impl NodeExecutor for SchedulePublish {
    fn kind(&self) -> NodeKind {
        NodeKind::Action
    }

    async fn execute(&self, inputs: NodeInputs, ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let content_id = required_str(&inputs, "contentId")?;
        let channels = self.channels(&inputs)?;
        let queue = if self.enqueue { Some(self.services.queue()?) } else { None };

        let entries = self
            .services
            .scheduler
            .schedule_content(content_id, &channels, &self.mode)
            .await;

        let mut job_ids = Vec::new();
        if let Some(queue) = queue {
            for entry in &entries {
                let payload = json!({
                    "type": "publish",
                    "scheduleId": entry.id,
                    "contentId": entry.content_id,
                    "channel": entry.channel,
                    "scheduledTime": entry.scheduled_time,
                    "content": inputs.get("content").cloned().unwrap_or(Value::Null),
                    "executionId": ctx.execution_id,
                });
                job_ids.push(queue.add_to_queue(&self.queue, payload, entry.scheduled_time.timestamp()).await?);
            }
        }

        let entries = serde_json::to_value(&entries).map_err(|e| NodeError::Failed(e.to_string()))?;
        Ok(envelope(vec![
            ("action", json!("content_scheduled")),
            ("status", json!("scheduled")),
            ("contentId", json!(content_id)),
            ("entries", entries),
            ("jobIds", json!(job_ids)),
        ]))
    }
}

fn default_post_type() -> String {
    "post".into()
}

#[derive(Debug, Deserialize)]
struct SocialPostConfig {
    channel: String,
    #[serde(default = "default_post_type")]
    post_type: String,
    #[serde(default = "publishing_queue")]
    queue: String,
    #[serde(default)]
    priority: i64,
}

/// Queues an immediate publish on one channel
pub struct SocialPost {
    config: SocialPostConfig,
    services: NodeServices,
}

impl SocialPost {
    pub fn new(config: &Value, services: NodeServices) -> Result<Self, NodeError> {
        Ok(Self {
            config: parse_config("social_post", config)?,
            services,
        })
    }
}

#[async_trait]
impl NodeExecutor for SocialPost {
    fn kind(&self) -> NodeKind {
        NodeKind::Action
    }

    async fn execute(&self, inputs: NodeInputs, ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let payload = json!({
            "type": "publish",
            "channel": self.config.channel,
            "postType": self.config.post_type,
            "content": inputs.get("content").cloned().unwrap_or(Value::Null),
            "media": inputs.get("mediaPath").cloned().unwrap_or(Value::Null),
            "executionId": ctx.execution_id,
        });
        let job_id = self
            .services
            .queue()?
            .add_to_queue(&self.config.queue, payload, self.config.priority)
            .await?;

        tracing::info!("📣 Queued {} on {} (job {})", self.config.post_type, self.config.channel, job_id);
        Ok(envelope(vec![
            ("action", json!("post_queued")),
            ("status", json!("queued")),
            ("channel", json!(self.config.channel)),
            ("jobId", json!(job_id)),
        ]))
    }
}

#[derive(Debug, Deserialize)]
struct MultiPlatformPostConfig {
    #[serde(default)]
    channels: Vec<String>,
    /// Publish at this time instead of immediately
    #[serde(default)]
    scheduled_time: Option<DateTime<Utc>>,
    #[serde(default = "publishing_queue")]
    queue: String,
}

/// Queues the same content for every configured channel. Scheduled posts are
/// prioritised by their unix time like `schedule_publish` jobs; immediate
/// ones go ahead of them with priority 0.
pub struct MultiPlatformPost {
    config: MultiPlatformPostConfig,
    services: NodeServices,
}

impl MultiPlatformPost {
    pub fn new(config: &Value, services: NodeServices) -> Result<Self, NodeError> {
        let config: MultiPlatformPostConfig = parse_config("multi_platform_post", config)?;
        if config.channels.is_empty() {
            return Err(NodeError::InvalidConfig("multi_platform_post: channels must not be empty".into()));
        }
        Ok(Self { config, services })
    }
}

#[async_trait]
impl NodeExecutor for MultiPlatformPost {
    fn kind(&self) -> NodeKind {
        NodeKind::Action
    }

    async fn execute(&self, inputs: NodeInputs, ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let queue = self.services.queue()?;
        let (status, priority) = match self.config.scheduled_time {
            Some(at) => ("scheduled", at.timestamp()),
            None => ("queued", 0),
        };
        let content = inputs.get("content").cloned().unwrap_or(Value::Null);

        let mut post_results = Vec::with_capacity(self.config.channels.len());
        for channel in &self.config.channels {
            let payload = json!({
                "type": "publish",
                "channel": channel,
                "content": content,
                "media": inputs.get("mediaPath").cloned().unwrap_or(Value::Null),
                "scheduledTime": self.config.scheduled_time,
                "executionId": ctx.execution_id,
            });
            let job_id = queue.add_to_queue(&self.config.queue, payload, priority).await?;
            post_results.push(json!({
                "channel": channel,
                "status": status,
                "jobId": job_id,
                "scheduledTime": self.config.scheduled_time,
            }));
        }

        tracing::info!("📣 Queued content on {} channel(s)", post_results.len());
        Ok(envelope(vec![
            ("action", json!("multi_post_queued")),
            ("status", json!(status)),
            ("postResults", Value::Array(post_results)),
        ]))
    }
}

fn default_subject() -> String {
    "Workflow Notification".into()
}

fn default_template() -> String {
    "default".into()
}

#[derive(Debug, Deserialize)]
struct SendEmailConfig {
    recipient: String,
    #[serde(default = "default_subject")]
    subject: String,
    #[serde(default = "default_template")]
    template: String,
    #[serde(default = "notifications_queue")]
    queue: String,
}

pub struct SendEmail {
    config: SendEmailConfig,
    services: NodeServices,
}

impl SendEmail {
    pub fn new(config: &Value, services: NodeServices) -> Result<Self, NodeError> {
        Ok(Self {
            config: parse_config("send_email", config)?,
            services,
        })
    }
}

#[async_trait]
impl NodeExecutor for SendEmail {
    fn kind(&self) -> NodeKind {
        NodeKind::Action
    }

    async fn execute(&self, inputs: NodeInputs, _ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let payload = json!({
            "type": "email",
            "recipient": self.config.recipient,
            "subject": self.config.subject,
            "template": self.config.template,
            "data": inputs,
        });
        let job_id = self.services.queue()?.add_to_queue(&self.config.queue, payload, 0).await?;

        Ok(envelope(vec![
            ("action", json!("email_queued")),
            ("status", json!("queued")),
            ("jobId", json!(job_id)),
            ("recipient", json!(self.config.recipient)),
            ("subject", json!(self.config.subject)),
            ("template", json!(self.config.template)),
        ]))
    }
}

/// Replace `{field}` with the matching input; unknown placeholders stay as is
pub fn fill_placeholders(template: &str, inputs: &NodeInputs) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match inputs.get(name) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(other) => out.push_str(&other.to_string()),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn default_slack_channel() -> String {
    "#general".into()
}

fn default_slack_message() -> String {
    "Workflow completed".into()
}

#[derive(Debug, Deserialize)]
struct SlackNotificationConfig {
    #[serde(default = "default_slack_channel")]
    channel: String,
    #[serde(default = "default_slack_message")]
    message: String,
    #[serde(default = "notifications_queue")]
    queue: String,
}

pub struct SlackNotification {
    config: SlackNotificationConfig,
    services: NodeServices,
}

impl SlackNotification {
    pub fn new(config: &Value, services: NodeServices) -> Result<Self, NodeError> {
        Ok(Self {
            config: parse_config("slack_notification", config)?,
            services,
        })
    }
}

#[async_trait]
impl NodeExecutor for SlackNotification {
    fn kind(&self) -> NodeKind {
        NodeKind::Action
    }

    async fn execute(&self, inputs: NodeInputs, _ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let message = fill_placeholders(&self.config.message, &inputs);
        let payload = json!({
            "type": "slack",
            "channel": self.config.channel,
            "message": message,
        });
        let job_id = self.services.queue()?.add_to_queue(&self.config.queue, payload, 0).await?;

        Ok(envelope(vec![
            ("action", json!("slack_queued")),
            ("status", json!("queued")),
            ("channel", json!(self.config.channel)),
            ("message", json!(message)),
            ("jobId", json!(job_id)),
        ]))
    }
}

fn default_method() -> String {
    "POST".into()
}

fn default_webhook_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize)]
struct WebhookConfig {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default = "default_webhook_timeout")]
    timeout_secs: u64,
}

/// Calls an external HTTP endpoint; non-2xx responses fail the node
pub struct WebhookAction {
    url: String,
    method: reqwest::Method,
    headers: HashMap<String, String>,
    timeout: Duration,
    http: reqwest::Client,
}

impl WebhookAction {
    pub fn new(config: &Value, services: NodeServices) -> Result<Self, NodeError> {
        let config: WebhookConfig = parse_config("webhook", config)?;
        let method = reqwest::Method::from_bytes(config.method.to_uppercase().as_bytes())
            .map_err(|_| NodeError::InvalidConfig(format!("webhook: unsupported HTTP method '{}'", config.method)))?;
        reqwest::Url::parse(&config.url)
            .map_err(|e| NodeError::InvalidConfig(format!("webhook: invalid url '{}': {}", config.url, e)))?;

        Ok(Self {
            url: config.url,
            method,
            headers: config.headers,
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            http: services.http,
        })
    }
}

#[async_trait]
impl NodeExecutor for WebhookAction {
    fn kind(&self) -> NodeKind {
        NodeKind::Action
    }

    async fn execute(&self, inputs: NodeInputs, _ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let mut request = self.http.request(self.method.clone(), &self.url).timeout(self.timeout);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        if self.method != reqwest::Method::GET {
            let body = inputs.get("body").cloned().unwrap_or_else(|| Value::Object(inputs.clone()));
            request = request.json(&body);
        }

        tracing::debug!("🌍 Webhook {} {}", self.method, self.url);
        let response = request
            .send()
            .await
            .map_err(|e| NodeError::Failed(format!("webhook request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| NodeError::Failed(format!("failed to read webhook response: {}", e)))?;
        if !status.is_success() {
            return Err(NodeError::Failed(format!("webhook returned {}: {}", status, text)));
        }
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(envelope(vec![
            ("action", json!("webhook_sent")),
            ("status", json!("success")),
            ("url", json!(self.url)),
            ("method", json!(self.method.as_str())),
            ("responseCode", json!(status.as_u16())),
            ("response", body),
        ]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOp {
    Copy,
    Move,
    Delete,
}

fn default_file_op() -> FileOp {
    FileOp::Copy
}

#[derive(Debug, Deserialize)]
struct FileOperationConfig {
    #[serde(default = "default_file_op")]
    operation: FileOp,
    #[serde(default)]
    destination_path: Option<PathBuf>,
}

/// Copies, moves or deletes the file named by the `sourcePath` input
#[derive(Debug)]
pub struct FileOperation {
    operation: FileOp,
    destination: Option<PathBuf>,
}

impl FileOperation {
    pub fn from_config(config: &Value) -> Result<Self, NodeError> {
        let config: FileOperationConfig = parse_config("file_operation", config)?;
        if config.operation != FileOp::Delete && config.destination_path.is_none() {
            return Err(NodeError::InvalidConfig(format!(
                "file_operation: {:?} requires destination_path",
                config.operation
            )));
        }
        Ok(Self {
            operation: config.operation,
            destination: config.destination_path,
        })
    }

    async fn prepare_destination(destination: &PathBuf) -> Result<(), NodeError> {
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| NodeError::Failed(format!("cannot create {}: {}", parent.display(), e)))?;
        }
        Ok(())
    }
}

#[async_trait]
impl NodeExecutor for FileOperation {
    fn kind(&self) -> NodeKind {
        NodeKind::Action
    }

    async fn execute(&self, inputs: NodeInputs, _ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let source = required_str(&inputs, "sourcePath")?;
        let io_error = |verb: &str, e: std::io::Error| NodeError::Failed(format!("{} {} failed: {}", verb, source, e));

        let mut result = Map::new();
        match (self.operation, &self.destination) {
            (FileOp::Delete, _) => {
                tokio::fs::remove_file(source).await.map_err(|e| io_error("delete", e))?;
                result.insert("action".into(), json!("file_deleted"));
                result.insert("path".into(), json!(source));
            }
            (op, Some(destination)) => {
                Self::prepare_destination(destination).await?;
                if op == FileOp::Copy {
                    tokio::fs::copy(source, destination).await.map_err(|e| io_error("copy", e))?;
                    result.insert("action".into(), json!("file_copied"));
                } else {
                    tokio::fs::rename(source, destination).await.map_err(|e| io_error("move", e))?;
                    result.insert("action".into(), json!("file_moved"));
                }
                result.insert("source".into(), json!(source));
                result.insert("destination".into(), json!(destination.to_string_lossy()));
            }
            (op, None) => {
                return Err(NodeError::InvalidConfig(format!("file_operation: {:?} requires destination_path", op)));
            }
        }

        result.insert("status".into(), json!("success"));
        tracing::debug!("📁 File operation {:?} on {}", self.operation, source);
        Ok(result)
    }
}
