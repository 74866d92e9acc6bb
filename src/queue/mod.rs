//! Priority job queue
//!
//! Jobs are JSON envelopes stored in a sorted collection per queue, scored by
//! priority (lower = more urgent). Handing a job to exactly one consumer relies
//! on the backing store's atomic pop-minimum; this layer holds no locks.
//!
//! Backends:
//! - `RedisBackend`: sorted sets, shared between processes
//! - `InMemoryBackend`: explicit process-local fallback with the same ordering

pub mod memory;

pub mod redis_store;

use crate::config::{QueueBackendKind, QueueConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub use self::memory::InMemoryBackend;
pub use self::redis_store::RedisBackend;

#[derive(Debug, Error)]
pub enum QueueError {
    /// The backing store cannot be reached; the job was NOT queued.
    #[error("queue backend unavailable: {0}")]
    Unavailable(String),

    #[error("queue backend error: {0}")]
    Backend(String),

    #[error("job serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
}

/// Unit of deferred work, serialized as the queue member
///
/// Field order is significant: the id is serialized first and is a UUIDv7, so
/// members with equal scores sort by creation order in stores that break ties
/// lexicographically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub data: Value,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
    pub status: JobStatus,
}

impl Job {
    pub fn new(data: Value, priority: i64) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            data,
            priority,
            created_at: Utc::now(),
            status: JobStatus::Pending,
        }
    }
}

/// Snapshot of a queue without consuming anything
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub queue_name: String,
    pub backend: &'static str,
    pub size: u64,
    /// Lowest-score (next to be popped) entry
    pub next_job: Option<Job>,
    /// Highest-score entry
    pub last_job: Option<Job>,
}

/// Sorted-set operations a queue store must provide atomically
#[async_trait]
pub trait QueueBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Insert `member` with `score`
    async fn add_with_score(&self, key: &str, member: String, score: f64) -> QueueResult<()>;

    /// Atomically remove and return up to `count` lowest-score members
    async fn pop_min(&self, key: &str, count: usize) -> QueueResult<Vec<(String, f64)>>;

    async fn cardinality(&self, key: &str) -> QueueResult<u64>;

    /// Members by rank, inclusive; negative indexes count from the end
    async fn range_by_rank(&self, key: &str, start: isize, stop: isize) -> QueueResult<Vec<String>>;

    async fn delete(&self, key: &str) -> QueueResult<()>;
}

/// Score-ordered work queue over a `QueueBackend`
#[derive(Clone)]
pub struct PriorityJobQueue {
    backend: Arc<dyn QueueBackend>,
    key_prefix: String,
}

impl std::fmt::Debug for PriorityJobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityJobQueue")
            .field("backend", &self.backend.name())
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl PriorityJobQueue {
    pub fn new(backend: Arc<dyn QueueBackend>, key_prefix: impl Into<String>) -> Self {
        Self {
            backend,
            key_prefix: key_prefix.into(),
        }
    }

    /// Process-local queue; jobs do not survive a restart
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()), "queue:")
    }

    /// Build the queue selected by configuration.
    ///
    /// A configured Redis that cannot be reached is an error: the queue refuses
    /// to start rather than dropping jobs.
    pub async fn from_config(config: &QueueConfig) -> QueueResult<Self> {
        let backend: Arc<dyn QueueBackend> = match config.backend {
            QueueBackendKind::Redis => Arc::new(RedisBackend::connect(&config.redis_url).await?),
            QueueBackendKind::Memory => {
                tracing::warn!("⚠️ Using in-memory job queue: jobs are process-local and lost on restart");
                Arc::new(InMemoryBackend::new())
            }
        };
        Ok(Self::new(backend, config.key_prefix.clone()))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn key(&self, queue_name: &str) -> String {
        format!("{}{}", self.key_prefix, queue_name)
    }

    /// Enqueue `payload` with `priority`; returns the new job id
    pub async fn add_to_queue(&self, queue_name: &str, payload: Value, priority: i64) -> QueueResult<String> {
        let job = Job::new(payload, priority);
        let member = serde_json::to_string(&job)?;

        self.backend
            .add_with_score(&self.key(queue_name), member, priority as f64)
            .await?;

        tracing::debug!(queue = queue_name, job_id = %job.id, priority, "📥 Job enqueued");
        Ok(job.id)
    }

    /// Remove and return the most urgent job, if any
    pub async fn get_next_job(&self, queue_name: &str) -> QueueResult<Option<Job>> {
        Ok(self.pop_jobs(queue_name, 1).await?.into_iter().next())
    }

    /// Remove and return up to `count` jobs, most urgent first
    pub async fn pop_jobs(&self, queue_name: &str, count: usize) -> QueueResult<Vec<Job>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let popped = self.backend.pop_min(&self.key(queue_name), count).await?;

        let mut jobs = Vec::with_capacity(popped.len());
        for (member, score) in popped {
            match serde_json::from_str::<Job>(&member) {
                Ok(job) => {
                    tracing::debug!(queue = queue_name, job_id = %job.id, "📤 Job popped");
                    jobs.push(job);
                }
                Err(e) => self.dead_letter(queue_name, member, score, &e).await?,
            }
        }
        Ok(jobs)
    }

    /// Name of the queue holding members of `queue_name` that failed to decode
    pub fn dead_letter_queue(queue_name: &str) -> String {
        format!("{}:dead", queue_name)
    }

    /// Park an undecodable member so the rest of the batch is still delivered
    async fn dead_letter(&self, queue_name: &str, member: String, score: f64, error: &serde_json::Error) -> QueueResult<()> {
        let dead = Self::dead_letter_queue(queue_name);
        tracing::error!(queue = queue_name, "❌ Undecodable job moved to '{}': {}", dead, error);
        self.backend.add_with_score(&self.key(&dead), member, score).await
    }

    pub async fn get_queue_stats(&self, queue_name: &str) -> QueueResult<QueueStats> {
        let key = self.key(queue_name);
        let size = self.backend.cardinality(&key).await?;
        let next_job = self.peek(&key, 0).await?;
        let last_job = self.peek(&key, -1).await?;

        Ok(QueueStats {
            queue_name: queue_name.to_string(),
            backend: self.backend.name(),
            size,
            next_job,
            last_job,
        })
    }

    /// Delete the whole queue
    pub async fn clear_queue(&self, queue_name: &str) -> QueueResult<()> {
        self.backend.delete(&self.key(queue_name)).await?;
        tracing::info!(queue = queue_name, "🧹 Queue cleared");
        Ok(())
    }

    async fn peek(&self, key: &str, rank: isize) -> QueueResult<Option<Job>> {
        let Some(member) = self.backend.range_by_rank(key, rank, rank).await?.into_iter().next() else {
            return Ok(None);
        };
        match serde_json::from_str(&member) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                tracing::warn!(key, "⚠️ Queue member at rank {} is not a job: {}", rank, e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn pops_in_priority_order() {
        let queue = PriorityJobQueue::in_memory();
        for priority in [9, 1, 5] {
            queue.add_to_queue("render", json!({ "p": priority }), priority).await.unwrap();
        }

        let mut order = Vec::new();
        while let Some(job) = queue.get_next_job("render").await.unwrap() {
            order.push(job.priority);
        }
        assert_eq!(order, vec![1, 5, 9]);
    }

    #[tokio::test]
    async fn round_trip_preserves_id_and_data() {
        let queue = PriorityJobQueue::in_memory();
        queue.add_to_queue("render", json!("other"), 3).await.unwrap();
        let id = queue.add_to_queue("render", json!({ "video": "a.mp4" }), 1).await.unwrap();
        assert_eq!(queue.get_queue_stats("render").await.unwrap().size, 2);

        let job = queue.get_next_job("render").await.unwrap().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.data, json!({ "video": "a.mp4" }));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(queue.get_queue_stats("render").await.unwrap().size, 1);
    }

    #[tokio::test]
    async fn stats_report_both_ends_without_consuming() {
        let queue = PriorityJobQueue::in_memory();
        queue.add_to_queue("q", json!("late"), 10).await.unwrap();
        queue.add_to_queue("q", json!("urgent"), 0).await.unwrap();

        let stats = queue.get_queue_stats("q").await.unwrap();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.next_job.unwrap().data, json!("urgent"));
        assert_eq!(stats.last_job.unwrap().data, json!("late"));
        assert_eq!(stats.backend, "memory");
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let queue = PriorityJobQueue::in_memory();
        queue.clear_queue("empty").await.unwrap();
        assert_eq!(queue.get_queue_stats("empty").await.unwrap().size, 0);

        queue.add_to_queue("full", json!(1), 1).await.unwrap();
        queue.clear_queue("full").await.unwrap();
        queue.clear_queue("full").await.unwrap();
        let stats = queue.get_queue_stats("full").await.unwrap();
        assert_eq!(stats.size, 0);
        assert!(stats.next_job.is_none());
    }

    #[tokio::test]
    async fn queues_are_isolated_by_name() {
        let queue = PriorityJobQueue::in_memory();
        queue.add_to_queue("a", json!(1), 1).await.unwrap();
        assert!(queue.get_next_job("b").await.unwrap().is_none());
        assert!(queue.get_next_job("a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn corrupt_member_is_parked_and_batch_still_delivered() {
        let queue = PriorityJobQueue::in_memory();
        queue
            .backend
            .add_with_score(&queue.key("q"), "not json".to_string(), 0.0)
            .await
            .unwrap();
        let first = queue.add_to_queue("q", json!("a"), 1).await.unwrap();
        let second = queue.add_to_queue("q", json!("b"), 2).await.unwrap();

        let jobs = queue.pop_jobs("q", 10).await.unwrap();

        assert_eq!(jobs.iter().map(|j| j.id.clone()).collect::<Vec<_>>(), vec![first, second]);
        assert_eq!(queue.get_queue_stats("q").await.unwrap().size, 0);
        let dead = PriorityJobQueue::dead_letter_queue("q");
        assert_eq!(dead, "q:dead");
        let dead_stats = queue.get_queue_stats(&dead).await.unwrap();
        assert_eq!(dead_stats.size, 1);
        assert!(dead_stats.next_job.is_none());
    }

    #[test]
    fn job_wire_shape_is_camel_case() {
        let job = Job::new(json!({"k": 1}), 4);
        let wire = serde_json::to_value(&job).unwrap();
        assert_eq!(wire["priority"], 4);
        assert_eq!(wire["status"], "pending");
        assert!(wire["createdAt"].is_string());
        assert!(serde_json::to_string(&job).unwrap().starts_with("{\"id\":"));
    }
}
