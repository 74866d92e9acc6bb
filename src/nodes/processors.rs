//! Processor nodes
//!
//! Side-effect-light transformations. Heavy media work (rendering, encoding)
//! runs outside the engine; processors here compute the derived artefact
//! descriptions that downstream actions hand off.

use super::{parse_config, required_str, NodeExecutor, NodeKind};
use crate::error::NodeError;
use crate::workflow::{ExecutionContext, NodeInputs, NodeResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What a content generator is asked to produce
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub channel: String,
    pub content_type: String,
    /// The caller's prompt
    pub prompt: String,
    /// Channel guidance followed by the caller's prompt
    pub full_prompt: String,
}

/// Text generation collaborator (an AI model in production)
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, NodeError>;
}

/// Offline generator that drafts text straight from the request
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateGenerator;

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, NodeError> {
        Ok(format!(
            "Generated content for {} ({}): {}",
            request.channel, request.content_type, request.prompt
        ))
    }
}

/// Channel guidance prepended to the caller's prompt
fn channel_guidance(channel: &str, content_type: &str) -> Option<&'static str> {
    match (channel, content_type) {
        ("instagram", "caption") => Some("Create an engaging Instagram caption with relevant hashtags. Max 2200 characters."),
        ("instagram", "reel") => Some("Create a script for a 30-60 second Instagram Reel."),
        ("tiktok", "caption") => Some("Create a TikTok caption with trending hashtags. Keep it short and catchy."),
        ("tiktok", "script") => Some("Create a script for a 15-60 second TikTok video."),
        ("youtube", "title") => Some("Create a clickable YouTube title (max 100 characters)."),
        ("youtube", "description") => Some("Create a YouTube description with timestamps and relevant keywords."),
        ("youtube", "shorts") => Some("Create a script for a YouTube Short (max 60 seconds)."),
        _ => None,
    }
}

fn default_channel() -> String {
    "instagram".into()
}

fn default_content_type() -> String {
    "caption".into()
}

#[derive(Debug, Deserialize)]
struct ContentGeneratorConfig {
    #[serde(default)]
    prompt: String,
    #[serde(default = "default_channel")]
    channel: String,
    #[serde(default = "default_content_type")]
    content_type: String,
}

pub struct ContentGeneratorNode {
    config: ContentGeneratorConfig,
    generator: Arc<dyn ContentGenerator>,
}

impl ContentGeneratorNode {
    pub fn new(config: &Value, generator: Arc<dyn ContentGenerator>) -> Result<Self, NodeError> {
        Ok(Self {
            config: parse_config("content_generator", config)?,
            generator,
        })
    }
}

#[async_trait]
impl NodeExecutor for ContentGeneratorNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Processor
    }

    async fn execute(&self, inputs: NodeInputs, _ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        // A `prompt` input (usually a reference) overrides the configured one
        let prompt = inputs
            .get("prompt")
            .and_then(Value::as_str)
            .unwrap_or(&self.config.prompt)
            .to_string();

        let guidance = channel_guidance(&self.config.channel, &self.config.content_type).unwrap_or_default();
        let request = GenerationRequest {
            channel: self.config.channel.clone(),
            content_type: self.config.content_type.clone(),
            full_prompt: format!("{} {}", guidance, prompt).trim().to_string(),
            prompt,
        };

        tracing::debug!("✍️ Generating {} for {}", request.content_type, request.channel);
        let content = self.generator.generate(&request).await?;

        let mut result = NodeResult::new();
        result.insert("content".into(), json!(content));
        result.insert("channel".into(), json!(request.channel));
        result.insert("contentType".into(), json!(request.content_type));
        result.insert("prompt".into(), json!(request.full_prompt));
        Ok(result)
    }
}

fn default_output_dir() -> PathBuf {
    std::env::temp_dir()
}

/// `{output_dir}/{prefix}{file name of source}{suffix}`
fn derived_path(output_dir: &Path, source: &str, prefix: &str, suffix: &str) -> String {
    let file_name = Path::new(source)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string());
    output_dir
        .join(format!("{}{}{}", prefix, file_name, suffix))
        .to_string_lossy()
        .into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoOperation {
    Resize,
    AddSubtitles,
    ExtractAudio,
}

fn default_video_format() -> String {
    "instagram_reel".into()
}

#[derive(Debug, Deserialize)]
struct VideoProcessorConfig {
    operation: VideoOperation,
    #[serde(default = "default_video_format")]
    format: String,
    #[serde(default = "default_output_dir")]
    output_dir: PathBuf,
}

/// Target frame size per publishing format; vertical 1080x1920 otherwise
pub fn format_dimensions(format: &str) -> (u32, u32) {
    match format {
        "instagram_post" => (1080, 1080),
        "youtube_video" => (1920, 1080),
        _ => (1080, 1920),
    }
}

#[derive(Debug)]
pub struct VideoProcessor {
    config: VideoProcessorConfig,
}

impl VideoProcessor {
    pub fn from_config(config: &Value) -> Result<Self, NodeError> {
        Ok(Self {
            config: parse_config("video_processor", config)?,
        })
    }
}

#[async_trait]
impl NodeExecutor for VideoProcessor {
    fn kind(&self) -> NodeKind {
        NodeKind::Processor
    }

    async fn execute(&self, inputs: NodeInputs, _ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let video_path = required_str(&inputs, "videoPath")?;
        let dir = &self.config.output_dir;
        let mut result = NodeResult::new();

        match self.config.operation {
            VideoOperation::Resize => {
                let (width, height) = format_dimensions(&self.config.format);
                let prefix = format!("resized_{}_", self.config.format);
                result.insert("videoPath".into(), json!(derived_path(dir, video_path, &prefix, "")));
                result.insert("width".into(), json!(width));
                result.insert("height".into(), json!(height));
                result.insert("format".into(), json!(self.config.format));
            }
            VideoOperation::AddSubtitles => {
                let subtitle_path = inputs.get("subtitlePath").cloned().unwrap_or(Value::Null);
                result.insert("videoPath".into(), json!(derived_path(dir, video_path, "subtitled_", "")));
                result.insert("subtitlePath".into(), subtitle_path);
            }
            VideoOperation::ExtractAudio => {
                result.insert("audioPath".into(), json!(derived_path(dir, video_path, "audio_", ".mp3")));
            }
        }

        tracing::debug!("🎬 Video {:?} planned for {}", self.config.operation, video_path);
        Ok(result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageOperation {
    CreateThumbnail,
}

fn default_thumbnail_width() -> u32 {
    1280
}

fn default_thumbnail_height() -> u32 {
    720
}

#[derive(Debug, Deserialize)]
struct ImageProcessorConfig {
    operation: ImageOperation,
    #[serde(default = "default_thumbnail_width")]
    width: u32,
    #[serde(default = "default_thumbnail_height")]
    height: u32,
    #[serde(default = "default_output_dir")]
    output_dir: PathBuf,
}

#[derive(Debug)]
pub struct ImageProcessor {
    config: ImageProcessorConfig,
}

impl ImageProcessor {
    pub fn from_config(config: &Value) -> Result<Self, NodeError> {
        Ok(Self {
            config: parse_config("image_processor", config)?,
        })
    }
}

#[async_trait]
impl NodeExecutor for ImageProcessor {
    fn kind(&self) -> NodeKind {
        NodeKind::Processor
    }

    async fn execute(&self, inputs: NodeInputs, ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let ImageOperation::CreateThumbnail = self.config.operation;
        let text = inputs.get("text").and_then(Value::as_str).unwrap_or_default();
        let image_path = self
            .config
            .output_dir
            .join(format!("thumbnail_{}.png", ctx.execution_id))
            .to_string_lossy()
            .into_owned();

        let mut result = NodeResult::new();
        result.insert("imagePath".into(), json!(image_path));
        result.insert("width".into(), json!(self.config.width));
        result.insert("height".into(), json!(self.config.height));
        result.insert("text".into(), json!(text));
        Ok(result)
    }
}

#[derive(Debug, Deserialize)]
struct BatchProcessorConfig {
    node_type: String,
    #[serde(default)]
    node_config: Value,
}

/// Expands a list of items into per-item work descriptions for `node_type`
#[derive(Debug)]
pub struct BatchProcessor {
    config: BatchProcessorConfig,
}

impl BatchProcessor {
    pub fn from_config(config: &Value) -> Result<Self, NodeError> {
        Ok(Self {
            config: parse_config("batch_processor", config)?,
        })
    }
}

#[async_trait]
impl NodeExecutor for BatchProcessor {
    fn kind(&self) -> NodeKind {
        NodeKind::Processor
    }

    async fn execute(&self, inputs: NodeInputs, _ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let items = match inputs.get("items") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(_) => return Err(NodeError::MissingInput("items".into())),
        };

        let results: Vec<Value> = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                json!({
                    "index": index,
                    "item": item,
                    "nodeType": self.config.node_type,
                    "nodeConfig": self.config.node_config,
                })
            })
            .collect();

        tracing::debug!("📦 Batched {} item(s) for {}", results.len(), self.config.node_type);
        let mut result = NodeResult::new();
        result.insert("count".into(), json!(results.len()));
        result.insert("results".into(), Value::Array(results));
        Ok(result)
    }
}

fn default_language() -> String {
    "auto".into()
}

#[derive(Debug, Deserialize)]
struct TranscriptionConfig {
    #[serde(default = "default_language")]
    language: String,
    #[serde(default = "default_output_dir")]
    output_dir: PathBuf,
}

/// Plans a transcript for the `audioPath` input
#[derive(Debug)]
pub struct Transcription {
    config: TranscriptionConfig,
}

impl Transcription {
    pub fn from_config(config: &Value) -> Result<Self, NodeError> {
        Ok(Self {
            config: parse_config("transcription", config)?,
        })
    }
}

#[async_trait]
impl NodeExecutor for Transcription {
    fn kind(&self) -> NodeKind {
        NodeKind::Processor
    }

    async fn execute(&self, inputs: NodeInputs, _ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let audio_path = required_str(&inputs, "audioPath")?;
        let transcript_path = derived_path(&self.config.output_dir, audio_path, "transcript_", ".txt");

        tracing::debug!("🎙️ Transcript ({}) planned for {}", self.config.language, audio_path);
        let mut result = NodeResult::new();
        result.insert("transcriptPath".into(), json!(transcript_path));
        result.insert("audioPath".into(), json!(audio_path));
        result.insert("language".into(), json!(self.config.language));
        Ok(result)
    }
}

/// One requested cut, in seconds from the start of the source
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ClipRange {
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Deserialize)]
struct VideoClipperConfig {
    #[serde(default = "default_output_dir")]
    output_dir: PathBuf,
}

/// Cuts the `videoPath` input into the ranges listed in the `clips` input
#[derive(Debug)]
pub struct VideoClipper {
    config: VideoClipperConfig,
}

impl VideoClipper {
    pub fn from_config(config: &Value) -> Result<Self, NodeError> {
        Ok(Self {
            config: parse_config("video_clipper", config)?,
        })
    }

    fn ranges(inputs: &NodeInputs) -> Result<Vec<ClipRange>, NodeError> {
        let ranges: Vec<ClipRange> = match inputs.get("clips") {
            None | Some(Value::Null) => Vec::new(),
            Some(clips) => {
                serde_json::from_value(clips.clone()).map_err(|_| NodeError::MissingInput("clips".into()))?
            }
        };
        if ranges.iter().any(|r| !(r.start >= 0.0 && r.end > r.start)) {
            return Err(NodeError::MissingInput("clips".into()));
        }
        Ok(ranges)
    }
}

#[async_trait]
impl NodeExecutor for VideoClipper {
    fn kind(&self) -> NodeKind {
        NodeKind::Processor
    }

    async fn execute(&self, inputs: NodeInputs, _ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let video_path = required_str(&inputs, "videoPath")?;
        let ranges = Self::ranges(&inputs)?;

        let clips: Vec<Value> = ranges
            .iter()
            .enumerate()
            .map(|(index, range)| {
                let prefix = format!("clip_{}_", index);
                json!({
                    "index": index,
                    "start": range.start,
                    "end": range.end,
                    "duration": range.end - range.start,
                    "videoPath": derived_path(&self.config.output_dir, video_path, &prefix, ""),
                })
            })
            .collect();

        tracing::debug!("✂️ {} clip(s) planned from {}", clips.len(), video_path);
        let mut result = NodeResult::new();
        result.insert("sourcePath".into(), json!(video_path));
        result.insert("count".into(), json!(clips.len()));
        result.insert("clips".into(), Value::Array(clips));
        Ok(result)
    }
}

/// Caption length limit per channel
pub fn channel_text_limit(channel: &str) -> Option<usize> {
    match channel {
        "instagram" | "tiktok" => Some(2200),
        "youtube" => Some(5000),
        "twitter" | "x" => Some(280),
        "linkedin" => Some(3000),
        _ => None,
    }
}

/// Fit `text` within `limit` characters, marking the cut with "..."
fn fit_to_limit(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let keep = limit.saturating_sub(3);
    let mut fitted: String = text.chars().take(keep).collect();
    fitted.push_str("...");
    fitted
}

#[derive(Debug, Deserialize)]
struct PlatformOptimizerConfig {
    #[serde(default)]
    channels: Vec<String>,
}

#[derive(Debug)]
pub struct PlatformOptimizer {
    config: PlatformOptimizerConfig,
}

impl PlatformOptimizer {
    pub fn from_config(config: &Value) -> Result<Self, NodeError> {
        Ok(Self {
            config: parse_config("platform_optimizer", config)?,
        })
    }
}

#[async_trait]
impl NodeExecutor for PlatformOptimizer {
    fn kind(&self) -> NodeKind {
        NodeKind::Processor
    }

    async fn execute(&self, inputs: NodeInputs, _ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
        let content = inputs.get("content").and_then(Value::as_str).unwrap_or_default();

        let optimized: Map<String, Value> = self
            .config
            .channels
            .iter()
            .map(|channel| {
                let text = match channel_text_limit(channel) {
                    Some(limit) => fit_to_limit(content, limit),
                    None => content.to_string(),
                };
                (channel.clone(), json!(text))
            })
            .collect();

        let mut result = NodeResult::new();
        result.insert("optimizedContent".into(), Value::Object(optimized));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::testing::{ctx, inputs};

    struct Recording(parking_lot::Mutex<Vec<GenerationRequest>>);

    #[async_trait]
    impl ContentGenerator for Recording {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, NodeError> {
            self.0.lock().push(request.clone());
            Ok("draft".into())
        }
    }

    #[tokio::test]
    async fn generator_composes_channel_prompt() {
        let recorder = Arc::new(Recording(parking_lot::Mutex::new(Vec::new())));
        let node = ContentGeneratorNode::new(
            &json!({ "prompt": "cats", "channel": "tiktok", "content_type": "script" }),
            recorder.clone(),
        )
        .unwrap();

        let out = node.execute(NodeInputs::new(), &ctx()).await.unwrap();
        assert_eq!(out["content"], "draft");
        assert_eq!(out["contentType"], "script");

        let seen = recorder.0.lock();
        assert_eq!(seen[0].full_prompt, "Create a script for a 15-60 second TikTok video. cats");
    }

    #[tokio::test]
    async fn prompt_input_overrides_config() {
        let node = ContentGeneratorNode::new(&json!({ "prompt": "static" }), Arc::new(TemplateGenerator)).unwrap();
        let out = node.execute(inputs(json!({ "prompt": "dynamic" })), &ctx()).await.unwrap();
        assert_eq!(out["content"], "Generated content for instagram (caption): dynamic");
        assert_eq!(out["channel"], "instagram");
    }

    #[tokio::test]
    async fn resize_uses_format_dimensions() {
        let node = VideoProcessor::from_config(&json!({
            "operation": "resize", "format": "youtube_video", "output_dir": "/out"
        }))
        .unwrap();
        let out = node.execute(inputs(json!({ "videoPath": "raw/take1.mp4" })), &ctx()).await.unwrap();
        assert_eq!(out["videoPath"], "/out/resized_youtube_video_take1.mp4");
        assert_eq!(out["width"], 1920);
        assert_eq!(out["height"], 1080);
    }

    #[tokio::test]
    async fn extract_audio_requires_video_path() {
        let node = VideoProcessor::from_config(&json!({ "operation": "extract_audio", "output_dir": "/out" })).unwrap();
        let err = node.execute(NodeInputs::new(), &ctx()).await.unwrap_err();
        assert!(matches!(err, NodeError::MissingInput(name) if name == "videoPath"));

        let out = node.execute(inputs(json!({ "videoPath": "a.mp4" })), &ctx()).await.unwrap();
        assert_eq!(out["audioPath"], "/out/audio_a.mp4.mp3");
    }

    #[test]
    fn unknown_video_operation_is_rejected() {
        assert!(VideoProcessor::from_config(&json!({ "operation": "explode" })).is_err());
    }

    #[tokio::test]
    async fn thumbnail_is_named_after_run() {
        let node = ImageProcessor::from_config(&json!({ "operation": "create_thumbnail", "output_dir": "/out" })).unwrap();
        let out = node.execute(inputs(json!({ "text": "Top 5" })), &ctx()).await.unwrap();
        assert_eq!(out["imagePath"], "/out/thumbnail_exec-test.png");
        assert_eq!(out["width"], 1280);
    }

    #[tokio::test]
    async fn batch_maps_every_item() {
        let node = BatchProcessor::from_config(&json!({ "node_type": "video_processor" })).unwrap();
        let out = node.execute(inputs(json!({ "items": ["a", "b"] })), &ctx()).await.unwrap();
        assert_eq!(out["count"], 2);
        assert_eq!(out["results"][1]["item"], "b");
        assert_eq!(out["results"][1]["index"], 1);

        let empty = node.execute(NodeInputs::new(), &ctx()).await.unwrap();
        assert_eq!(empty["count"], 0);
    }

    #[tokio::test]
    async fn transcript_follows_audio_name() {
        let node = Transcription::from_config(&json!({ "language": "id", "output_dir": "/out" })).unwrap();
        let out = node.execute(inputs(json!({ "audioPath": "/tmp/audio_take1.mp3" })), &ctx()).await.unwrap();
        assert_eq!(out["transcriptPath"], "/out/transcript_audio_take1.mp3.txt");
        assert_eq!(out["language"], "id");

        let err = node.execute(NodeInputs::new(), &ctx()).await.unwrap_err();
        assert!(matches!(err, NodeError::MissingInput(name) if name == "audioPath"));
    }

    #[tokio::test]
    async fn clipper_cuts_each_range() {
        let node = VideoClipper::from_config(&json!({ "output_dir": "/out" })).unwrap();
        let out = node
            .execute(
                inputs(json!({
                    "videoPath": "raw/podcast.mp4",
                    "clips": [{ "start": 0, "end": 30 }, { "start": 95.5, "end": 120 }]
                })),
                &ctx(),
            )
            .await
            .unwrap();

        assert_eq!(out["count"], 2);
        assert_eq!(out["clips"][0]["videoPath"], "/out/clip_0_podcast.mp4");
        assert_eq!(out["clips"][1]["videoPath"], "/out/clip_1_podcast.mp4");
        assert_eq!(out["clips"][1]["duration"], 24.5);

        let none = node.execute(inputs(json!({ "videoPath": "a.mp4" })), &ctx()).await.unwrap();
        assert_eq!(none["count"], 0);
    }

    #[tokio::test]
    async fn clipper_rejects_inverted_range() {
        let node = VideoClipper::from_config(&Value::Null).unwrap();
        let err = node
            .execute(inputs(json!({ "videoPath": "a.mp4", "clips": [{ "start": 10, "end": 5 }] })), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::MissingInput(name) if name == "clips"));
    }

    #[tokio::test]
    async fn optimizer_fits_channel_limits() {
        let node = PlatformOptimizer::from_config(&json!({ "channels": ["twitter", "blog"] })).unwrap();
        let long = "x".repeat(300);
        let out = node.execute(inputs(json!({ "content": long })), &ctx()).await.unwrap();

        let twitter = out["optimizedContent"]["twitter"].as_str().unwrap();
        assert_eq!(twitter.chars().count(), 280);
        assert!(twitter.ends_with("..."));
        assert_eq!(out["optimizedContent"]["blog"].as_str().unwrap().len(), 300);
    }
}
