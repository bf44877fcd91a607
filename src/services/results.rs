use chrono::{DateTime, Duration as ChronoDuration, Utc};
use redis::AsyncCommands;
use std::time::Duration;
use uuid::Uuid;

const RESULT_KEY_PREFIX: &str = "upscale:result:";

/// How long result bytes stay physically present past logical expiry, so
/// `Expired` can be told apart from `NotFound` before reclamation.
const RECLAIM_GRACE: Duration = Duration::from_secs(300);

/// A stored result, immutable once written.
#[derive(Debug, Clone)]
pub struct StoredResult {
    pub job_id: Uuid,
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StoredResult {
    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Outcome of a result lookup.
#[derive(Debug)]
pub enum ResultStatus {
    Ready(StoredResult),
    /// The result existed but its TTL has elapsed (bytes may or may not
    /// still be physically present).
    Expired,
    NotFound,
}

/// Redis-backed store for completed job output, with fixed TTL from write
/// time. Bytes are opaque here; no decoding or validation.
pub struct ResultStore {
    client: redis::Client,
    ttl: Duration,
}

impl ResultStore {
    pub fn new(redis_url: &str, ttl: Duration) -> Result<Self, ResultStoreError> {
        let client = redis::Client::open(redis_url).map_err(ResultStoreError::Redis)?;
        Ok(Self { client, ttl })
    }

    /// Store result bytes for a completed job, returning an opaque handle.
    pub async fn put(
        &self,
        job_id: Uuid,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, ResultStoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(ResultStoreError::Redis)?;

        let result_ref = format!("{}{}", RESULT_KEY_PREFIX, Uuid::new_v4().simple());
        let created_at = Utc::now();
        let expires_at = created_at
            + ChronoDuration::from_std(self.ttl).map_err(|_| ResultStoreError::InvalidTtl)?;

        redis::pipe()
            .atomic()
            .hset(&result_ref, "job_id", job_id.to_string())
            .hset(&result_ref, "bytes", bytes)
            .hset(&result_ref, "content_type", content_type)
            .hset(&result_ref, "created_at", created_at.to_rfc3339())
            .hset(&result_ref, "expires_at", expires_at.to_rfc3339())
            .expire(&result_ref, (self.ttl + RECLAIM_GRACE).as_secs() as i64)
            .query_async::<()>(&mut conn)
            .await
            .map_err(ResultStoreError::Redis)?;

        Ok(result_ref)
    }

    /// Look up a result by its handle.
    pub async fn get(&self, result_ref: &str) -> Result<ResultStatus, ResultStoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(ResultStoreError::Redis)?;

        type ResultFields = (
            Option<String>,
            Option<Vec<u8>>,
            Option<String>,
            Option<String>,
            Option<String>,
        );
        let (job_id, bytes, content_type, created_at, expires_at): ResultFields =
            redis::cmd("HMGET")
                .arg(result_ref)
                .arg("job_id")
                .arg("bytes")
                .arg("content_type")
                .arg("created_at")
                .arg("expires_at")
                .query_async(&mut conn)
                .await
                .map_err(ResultStoreError::Redis)?;

        let (Some(job_id), Some(bytes), Some(content_type), Some(created_at), Some(expires_at)) =
            (job_id, bytes, content_type, created_at, expires_at)
        else {
            return Ok(ResultStatus::NotFound);
        };

        let stored = StoredResult {
            job_id: job_id
                .parse()
                .map_err(|_| ResultStoreError::Corrupt(result_ref.to_string()))?,
            bytes,
            content_type,
            created_at: parse_timestamp(&created_at, result_ref)?,
            expires_at: parse_timestamp(&expires_at, result_ref)?,
        };

        if stored.expired_at(Utc::now()) {
            return Ok(ResultStatus::Expired);
        }

        Ok(ResultStatus::Ready(stored))
    }
}

fn parse_timestamp(value: &str, result_ref: &str) -> Result<DateTime<Utc>, ResultStoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ResultStoreError::Corrupt(result_ref.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum ResultStoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Result record {0} is corrupt")]
    Corrupt(String),

    #[error("Configured result TTL is not representable")]
    InvalidTtl,
}
