use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::PgPool;
use tokio::time::{sleep, timeout};

use crate::db::queries::{self, JobStoreError};
use crate::models::job::JobState;
use crate::services::queue::{JobDescriptor, JobQueue, QueueError};
use crate::services::results::{ResultStore, ResultStoreError};
use crate::services::upscaler::{ComputeEngine, ComputeOutput};

const DEQUEUE_WAIT: Duration = Duration::from_secs(5);
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// One worker execution context. The worker binary spawns
/// `worker_concurrency` of these over shared stores and a shared engine;
/// each runs an independent blocking-dequeue loop, so the spawn count bounds
/// concurrent compute invocations.
pub struct Worker {
    db: PgPool,
    queue: Arc<JobQueue>,
    results: Arc<ResultStore>,
    engine: Arc<dyn ComputeEngine>,
    compute_deadline: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] JobStoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Results(#[from] ResultStoreError),
}

impl Worker {
    pub fn new(
        db: PgPool,
        queue: Arc<JobQueue>,
        results: Arc<ResultStore>,
        engine: Arc<dyn ComputeEngine>,
        compute_deadline: Duration,
    ) -> Self {
        Self {
            db,
            queue,
            results,
            engine,
            compute_deadline,
        }
    }

    /// Dequeue loop; runs until the process is killed.
    pub async fn run(&self, worker_index: usize) {
        tracing::info!(worker = worker_index, "Worker loop started");

        loop {
            match self.queue.dequeue(DEQUEUE_WAIT).await {
                Ok(Some(descriptor)) => {
                    if let Err(e) = self.process(&descriptor).await {
                        tracing::error!(
                            worker = worker_index,
                            job_id = %descriptor.job_id,
                            error = %e,
                            "Error processing job"
                        );
                    }
                }
                Ok(None) => {
                    // Dequeue wait elapsed with nothing queued.
                }
                Err(e) => {
                    tracing::error!(worker = worker_index, error = %e, "Dequeue failed, backing off");
                    sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// Process one descriptor to a terminal job state.
    ///
    /// Redelivered descriptors for jobs that are already terminal (or were
    /// never recorded) are dropped without side effects, which is what makes
    /// the broker's at-least-once delivery safe.
    pub async fn process(&self, descriptor: &JobDescriptor) -> Result<(), WorkerError> {
        let job_id = descriptor.job_id;

        match queries::transition_job(&self.db, job_id, JobState::Running, None, None).await {
            Ok(_) => {}
            Err(JobStoreError::NotFound { .. }) | Err(JobStoreError::IllegalTransition { .. }) => {
                tracing::info!(job_id = %job_id, "Dropping duplicate or stale descriptor");
                self.queue.complete(descriptor).await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let _ = queries::update_progress(&self.db, job_id, 25).await;

        let start = Instant::now();
        let outcome = self.execute(descriptor).await;
        metrics::histogram!("upscale_processing_seconds").record(start.elapsed().as_secs_f64());

        match outcome {
            Ok(output) => {
                let result_ref = self
                    .results
                    .put(job_id, &output.bytes, output.content_type)
                    .await?;
                queries::transition_job(
                    &self.db,
                    job_id,
                    JobState::Succeeded,
                    Some(&result_ref),
                    None,
                )
                .await?;
                metrics::counter!("upscale_jobs_completed_total").increment(1);
                tracing::info!(
                    job_id = %job_id,
                    result_ref = %result_ref,
                    output_bytes = output.bytes.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Job completed"
                );
            }
            Err(cause) => {
                queries::transition_job(&self.db, job_id, JobState::Failed, None, Some(&cause))
                    .await?;
                metrics::counter!("upscale_jobs_failed_total").increment(1);
                tracing::warn!(job_id = %job_id, error = %cause, "Job failed");
            }
        }

        self.queue.complete(descriptor).await?;
        if let Ok(depth) = self.queue.queue_depth().await {
            metrics::gauge!("upscale_queue_depth").set(depth as f64);
        }

        Ok(())
    }

    /// Run the compute step under the configured deadline. Errors come back
    /// as normalized cause strings for the job record; no retry here, the
    /// broker's redelivery is the only retry mechanism.
    async fn execute(&self, descriptor: &JobDescriptor) -> Result<ComputeOutput, String> {
        if !self.engine.is_ready() {
            return Err("resource not ready: compute engine failed to initialize".to_string());
        }

        let input = descriptor
            .image_bytes()
            .map_err(|e| format!("invalid descriptor payload: {e}"))?;

        let _ = queries::update_progress(&self.db, descriptor.job_id, 50).await;

        let engine = Arc::clone(&self.engine);
        let task = tokio::task::spawn_blocking(move || engine.compute(&input));

        match timeout(self.compute_deadline, task).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(e))) => Err(format!("compute failed: {e}")),
            Ok(Err(join_err)) => Err(format!("compute task panicked: {join_err}")),
            Err(_) => Err(format!(
                "compute deadline exceeded after {}s",
                self.compute_deadline.as_secs()
            )),
        }
    }
}
