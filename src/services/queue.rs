use base64::Engine;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

const QUEUE_KEY: &str = "upscale:jobs";
const PROCESSING_KEY: &str = "upscale:processing";

/// Descriptor carried across the broker: the job id plus the raw input
/// bytes, so intermediate state never touches the filesystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_id: Uuid,
    /// Input image, base64-encoded for the JSON payload.
    pub image_b64: String,
    pub original_filename: String,
}

impl JobDescriptor {
    pub fn new(job_id: Uuid, image_bytes: &[u8], original_filename: &str) -> Self {
        Self {
            job_id,
            image_b64: base64::engine::general_purpose::STANDARD.encode(image_bytes),
            original_filename: original_filename.to_string(),
        }
    }

    /// Decode the input bytes back out of the payload.
    pub fn image_bytes(&self) -> Result<Vec<u8>, QueueError> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.image_b64)
            .map_err(QueueError::Decode)
    }
}

/// Redis-backed job queue with at-least-once delivery.
///
/// Descriptors move from the pending list to a processing list on dequeue
/// and are removed on `complete`; anything left in the processing list by a
/// crashed worker is pushed back by `recover_processing`.
pub struct JobQueue {
    client: redis::Client,
}

impl JobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client })
    }

    /// Enqueue a job descriptor.
    pub async fn enqueue(&self, descriptor: &JobDescriptor) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let payload = serde_json::to_string(descriptor).map_err(QueueError::Serialize)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Blocking dequeue: wait up to `wait` for the next descriptor, moving
    /// it onto the processing list in the same operation. `None` on timeout.
    pub async fn dequeue(&self, wait: Duration) -> Result<Option<JobDescriptor>, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let result: Option<String> = conn
            .blmove(
                QUEUE_KEY,
                PROCESSING_KEY,
                redis::Direction::Right,
                redis::Direction::Left,
                wait.as_secs_f64(),
            )
            .await
            .map_err(QueueError::Redis)?;

        match result {
            Some(payload) => {
                let descriptor: JobDescriptor =
                    serde_json::from_str(&payload).map_err(QueueError::Serialize)?;
                Ok(Some(descriptor))
            }
            None => Ok(None),
        }
    }

    /// Mark a descriptor as handled (remove from the processing list).
    pub async fn complete(&self, descriptor: &JobDescriptor) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let payload = serde_json::to_string(descriptor).map_err(QueueError::Serialize)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Push descriptors stranded on the processing list back onto the queue.
    /// Run at worker startup; redelivered descriptors for jobs that already
    /// reached a terminal state are dropped by the worker's claim step.
    pub async fn recover_processing(&self) -> Result<u64, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;

        let mut moved = 0;
        loop {
            let item: Option<String> = conn
                .rpoplpush(PROCESSING_KEY, QUEUE_KEY)
                .await
                .map_err(QueueError::Redis)?;
            if item.is_none() {
                break;
            }
            moved += 1;
        }
        Ok(moved)
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Get the current queue depth (pending descriptors).
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let depth: u64 = conn.llen(QUEUE_KEY).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Descriptor payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
}
