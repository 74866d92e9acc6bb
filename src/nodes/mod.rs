//! Node contract and built-in node catalogue
//!
//! Every step of a workflow is a `NodeExecutor`. The engine never matches on
//! concrete node types: it asks the `NodeRegistry` for an executor by type name
//! and invokes it through the trait. `NodeKind` records which of the four
//! capabilities an executor provides.

pub mod actions;

pub mod conditions;

pub mod processors;

pub mod registry;

pub mod triggers;

use crate::error::NodeError;
use crate::queue::PriorityJobQueue;
use crate::scheduling::ContentScheduler;
use crate::workflow::{ExecutionContext, NodeInputs, NodeResult};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

pub use processors::{ContentGenerator, GenerationRequest, TemplateGenerator};
pub use registry::{NodeConstructor, NodeRegistry};

/// Capability a node provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Stamps provenance and passes its inputs through
    Trigger,
    /// Transforms inputs into new fields
    Processor,
    /// Performs (or hands off) an external side effect
    Action,
    /// Evaluates a boolean over its inputs
    Condition,
}

/// The unit of polymorphism: one typed workflow step
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    fn kind(&self) -> NodeKind;

    /// Run the step once with resolved inputs. The context is shared by
    /// every node of the run and is read-only.
    async fn execute(&self, inputs: NodeInputs, ctx: &ExecutionContext) -> Result<NodeResult, NodeError>;
}

/// Collaborators the built-in nodes are wired to
#[derive(Clone)]
pub struct NodeServices {
    /// Absent when no queue is configured; queue-backed actions then fail
    /// with `NodeError::Unavailable`
    pub queue: Option<PriorityJobQueue>,
    pub scheduler: Arc<ContentScheduler>,
    pub http: reqwest::Client,
    pub generator: Arc<dyn ContentGenerator>,
}

impl std::fmt::Debug for NodeServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeServices")
            .field("queue", &self.queue)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl Default for NodeServices {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeServices {
    pub fn new() -> Self {
        Self {
            queue: None,
            scheduler: Arc::new(ContentScheduler::new()),
            http: reqwest::Client::new(),
            generator: Arc::new(TemplateGenerator),
        }
    }

    pub fn with_queue(mut self, queue: PriorityJobQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<ContentScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn ContentGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub(crate) fn queue(&self) -> Result<&PriorityJobQueue, NodeError> {
        self.queue
            .as_ref()
            .ok_or_else(|| NodeError::Unavailable("job queue is not configured".into()))
    }
}

/// Register every built-in node type under its workflow type name
pub fn register_builtin_nodes(registry: &NodeRegistry, services: &NodeServices) {
    registry.register("manual_trigger", |_| Ok(boxed(triggers::ManualTrigger)));
    registry.register("schedule_trigger", |config| Ok(boxed(triggers::ScheduleTrigger::from_config(config)?)));
    registry.register("webhook_trigger", |_| Ok(boxed(triggers::WebhookTrigger)));
    registry.register("content_upload_trigger", |_| Ok(boxed(triggers::ContentUploadTrigger)));

    let generator = Arc::clone(&services.generator);
    registry.register("content_generator", move |config| {
        Ok(boxed(processors::ContentGeneratorNode::new(config, Arc::clone(&generator))?))
    });
    registry.register("video_processor", |config| Ok(boxed(processors::VideoProcessor::from_config(config)?)));
    registry.register("image_processor", |config| Ok(boxed(processors::ImageProcessor::from_config(config)?)));
    registry.register("batch_processor", |config| Ok(boxed(processors::BatchProcessor::from_config(config)?)));
    registry.register("platform_optimizer", |config| {
        Ok(boxed(processors::PlatformOptimizer::from_config(config)?))
    });
    registry.register("transcription", |config| Ok(boxed(processors::Transcription::from_config(config)?)));
    registry.register("video_clipper", |config| Ok(boxed(processors::VideoClipper::from_config(config)?)));

    let s = services.clone();
    registry.register("enqueue_job", move |config| Ok(boxed(actions::EnqueueJob::new(config, s.clone())?)));
    let s = services.clone();
    registry.register("schedule_publish", move |config| Ok(boxed(actions::SchedulePublish::new(config, s.clone())?)));
    let s = services.clone();
    registry.register("social_post", move |config| Ok(boxed(actions::SocialPost::new(config, s.clone())?)));
    let s = services.clone();
    registry.register("multi_platform_post", move |config| {
        Ok(boxed(actions::MultiPlatformPost::new(config, s.clone())?))
    });
    let s = services.clone();
    registry.register("send_email", move |config| Ok(boxed(actions::SendEmail::new(config, s.clone())?)));
    let s = services.clone();
    registry.register("slack_notification", move |config| {
        Ok(boxed(actions::SlackNotification::new(config, s.clone())?))
    });
    let s = services.clone();
    registry.register("webhook", move |config| Ok(boxed(actions::WebhookAction::new(config, s.clone())?)));
    registry.register("file_operation", |config| Ok(boxed(actions::FileOperation::from_config(config)?)));

    registry.register("condition", |config| Ok(boxed(conditions::ConditionNode::from_config(config)?)));

    tracing::debug!("🧩 Registered {} built-in node types", registry.registered_types().len());
}

fn boxed<N: NodeExecutor + 'static>(node: N) -> Box<dyn NodeExecutor> {
    Box::new(node)
}

/// Deserialize a node's static configuration; a missing config is `{}`
pub(crate) fn parse_config<T: DeserializeOwned>(node_type: &str, config: &Value) -> Result<T, NodeError> {
    let config = if config.is_null() {
        Value::Object(Map::new())
    } else {
        config.clone()
    };
    serde_json::from_value(config).map_err(|e| NodeError::InvalidConfig(format!("{}: {}", node_type, e)))
}

pub(crate) fn required_str<'a>(inputs: &'a NodeInputs, name: &str) -> Result<&'a str, NodeError> {
    inputs
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| NodeError::MissingInput(name.to_string()))
}

/// Provenance or output fields followed by the node's inputs
pub(crate) fn with_passthrough(fields: NodeResult, inputs: NodeInputs) -> NodeResult {
    let mut result = fields;
    for (key, value) in inputs {
        result.entry(key).or_insert(value);
    }
    result
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use serde_json::json;

    pub fn ctx() -> ExecutionContext {
        ExecutionContext::new("exec-test", "wf-test", Map::new())
    }

    pub fn ctx_with(data: Value) -> ExecutionContext {
        let data = data.as_object().cloned().unwrap_or_default();
        ExecutionContext::new("exec-test", "wf-test", data)
    }

    pub fn inputs(value: Value) -> NodeInputs {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn passthrough_does_not_override_own_fields() {
        let mut fields = Map::new();
        fields.insert("status".into(), json!("queued"));
        let merged = with_passthrough(fields, inputs(json!({ "status": "draft", "extra": 1 })));
        assert_eq!(merged["status"], "queued");
        assert_eq!(merged["extra"], 1);
    }

    #[test]
    fn null_config_parses_as_empty_object() {
        #[derive(serde::Deserialize)]
        struct Cfg {
            #[serde(default)]
            name: Option<String>,
        }
        let cfg: Cfg = parse_config("test", &Value::Null).unwrap();
        assert!(cfg.name.is_none());
        assert!(parse_config::<Cfg>("test", &json!(5)).is_err());
    }

    #[tokio::test]
    async fn builtin_catalogue_is_complete() {
        let registry = NodeRegistry::new();
        register_builtin_nodes(&registry, &NodeServices::new());
        for name in [
            "manual_trigger",
            "schedule_trigger",
            "webhook_trigger",
            "content_upload_trigger",
            "content_generator",
            "video_processor",
            "image_processor",
            "batch_processor",
            "platform_optimizer",
            "transcription",
            "video_clipper",
            "enqueue_job",
            "schedule_publish",
            "social_post",
            "multi_platform_post",
            "send_email",
            "slack_notification",
            "webhook",
            "file_operation",
            "condition",
        ] {
            assert!(registry.contains(name), "missing {}", name);
        }
        let manual = registry.create("manual_trigger", &Value::Null).unwrap();
        assert_eq!(manual.kind(), NodeKind::Trigger);
    }
}
