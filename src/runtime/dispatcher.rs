//! Background queue dispatcher
//!
//! Polls the configured queues on a cron tick (tokio-cron-scheduler) and hands
//! each popped job to a `JobHandler`. Pop-minimum on the backing store means a
//! job reaches at most one dispatcher even when several processes poll the
//! same queues. Failed jobs are logged and dropped; there is no retry.

use crate::config::DispatcherConfig;
use crate::queue::{Job, PriorityJobQueue};
use crate::runtime::engine::{ExecutionEngine, RunOptions};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};

/// Consumer of dispatched jobs
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, queue_name: &str, job: Job) -> Result<()>;
}

/// Acknowledges provider-bound jobs by logging the hand-off
#[derive(Debug, Default)]
pub struct HandoffLogger;

#[async_trait]
impl JobHandler for HandoffLogger {
    async fn handle(&self, queue_name: &str, job: Job) -> Result<()> {
        let kind = job.data.get("type").and_then(Value::as_str).unwrap_or("job");
        tracing::info!(queue = queue_name, job_id = %job.id, "📤 Handed off {} job", kind);
        Ok(())
    }
}

/// Runs jobs that name a `workflowId` through the engine; everything else
/// goes to the fallback handler
pub struct WorkflowJobHandler {
    engine: Arc<ExecutionEngine>,
    fallback: Arc<dyn JobHandler>,
}

impl WorkflowJobHandler {
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        Self {
            engine,
            fallback: Arc::new(HandoffLogger),
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn JobHandler>) -> Self {
        self.fallback = fallback;
        self
    }
}

#[async_trait]
impl JobHandler for WorkflowJobHandler {
    async fn handle(&self, queue_name: &str, job: Job) -> Result<()> {
        let Some(workflow_id) = job.data.get("workflowId").and_then(Value::as_str) else {
            return self.fallback.handle(queue_name, job).await;
        };

        let mut context: Map<String, Value> = job
            .data
            .get("context")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        context.insert("jobId".into(), Value::String(job.id.clone()));

        // The job id doubles as the execution id so both can be correlated
        let options = RunOptions::default().with_execution_id(job.id.clone());
        let results = self.engine.execute_with(workflow_id, context, options).await?;
        tracing::info!(queue = queue_name, job_id = %job.id, "✅ Queued workflow '{}' ran {} node(s)", workflow_id, results.len());
        Ok(())
    }
}

pub struct QueueDispatcher {
    scheduler: JobScheduler,
    queue: PriorityJobQueue,
    handler: Arc<dyn JobHandler>,
    config: DispatcherConfig,
    tick_guard: Arc<Mutex<()>>,
}

impl QueueDispatcher {
    pub async fn new(queue: PriorityJobQueue, handler: Arc<dyn JobHandler>, config: DispatcherConfig) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler,
            queue,
            handler,
            config,
            tick_guard: Arc::new(Mutex::new(())),
        })
    }

    /// Register the poll tick and start the scheduler
    pub async fn start(&self) -> Result<()> {
        tracing::info!(
            "⏰ Starting queue dispatcher: {:?} every '{}' (batch {})",
            self.config.queues,
            self.config.poll_schedule,
            self.config.batch_size
        );

        let queue = self.queue.clone();
        let handler = Arc::clone(&self.handler);
        let queues = self.config.queues.clone();
        let batch_size = self.config.batch_size;
        let tick_guard = Arc::clone(&self.tick_guard);

        let tick = CronJob::new_async(self.config.poll_schedule.as_str(), move |_uuid, _l| {
            let queue = queue.clone();
            let handler = Arc::clone(&handler);
            let queues = queues.clone();
            let tick_guard = Arc::clone(&tick_guard);

            Box::pin(async move {
                // A slow tick must not overlap the next one
                let Ok(_guard) = tick_guard.try_lock() else {
                    tracing::debug!("⏭️ Previous dispatch tick still running, skipping");
                    return;
                };
                let handled = drain(&queue, handler.as_ref(), &queues, batch_size).await;
                if handled > 0 {
                    tracing::debug!("🔔 Dispatch tick handled {} job(s)", handled);
                }
            })
        })?;

        self.scheduler.add(tick).await?;
        self.scheduler.start().await?;
        tracing::info!("✅ Queue dispatcher started");
        Ok(())
    }

    /// Run a single poll pass over every queue without the scheduler
    pub async fn drain_once(&self) -> usize {
        let _guard = self.tick_guard.lock().await;
        drain(&self.queue, self.handler.as_ref(), &self.config.queues, self.config.batch_size).await
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("⏹️ Stopping queue dispatcher");
        self.scheduler.shutdown().await?;
        Ok(())
    }
}

/// Pop up to `batch_size` jobs from each queue and hand them over; returns
/// the number of jobs handed over
async fn drain(queue: &PriorityJobQueue, handler: &dyn JobHandler, queues: &[String], batch_size: usize) -> usize {
    let mut handled = 0;

    for queue_name in queues {
        let jobs = match queue.pop_jobs(queue_name, batch_size).await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::warn!(queue = %queue_name, "⚠️ Could not poll queue: {}", e);
                continue;
            }
        };

        for job in jobs {
            let job_id = job.id.clone();
            handled += 1;
            if let Err(e) = handler.handle(queue_name, job).await {
                tracing::error!(queue = %queue_name, job_id = %job_id, "❌ Job failed: {:#}", e);
            }
        }
    }

    handled
}
