use sqlx::PgPool;

use crate::config::AppConfig;
use crate::db::queries::{self, JobStoreError};
use crate::models::job::{JobState, UpscaleJob};
use crate::services::queue::{JobDescriptor, JobQueue};

/// Reasons an upload is rejected before any job record exists.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no file was provided")]
    MissingFile,

    #[error("uploaded file is empty")]
    EmptyFile,

    #[error("uploaded file exceeds the {limit_bytes} byte limit")]
    TooLarge { limit_bytes: usize },

    #[error("file extension of '{filename}' is not allowed")]
    ExtensionNotAllowed { filename: String },
}

impl ValidationError {
    /// Stable machine-readable code for the API error body.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MissingFile => "missing_file",
            ValidationError::EmptyFile => "empty_file",
            ValidationError::TooLarge { .. } => "file_too_large",
            ValidationError::ExtensionNotAllowed { .. } => "extension_not_allowed",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] JobStoreError),
}

/// Check an upload against the configured constraints. No job record is
/// created for anything this rejects.
pub fn validate_upload(
    bytes: &[u8],
    declared_filename: &str,
    config: &AppConfig,
) -> Result<(), ValidationError> {
    if bytes.is_empty() {
        return Err(ValidationError::EmptyFile);
    }

    if bytes.len() > config.max_upload_bytes {
        return Err(ValidationError::TooLarge {
            limit_bytes: config.max_upload_bytes,
        });
    }

    let extension = declared_filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());

    let allowed = extension
        .map(|ext| config.allowed_extensions.iter().any(|a| *a == ext))
        .unwrap_or(false);

    if !allowed {
        return Err(ValidationError::ExtensionNotAllowed {
            filename: declared_filename.to_string(),
        });
    }

    Ok(())
}

/// Create a job record and hand its descriptor to the broker.
///
/// The record is written first so the returned id is always resolvable; if
/// the enqueue then fails, the job is immediately moved to `failed` with a
/// queue-unavailable cause instead of being left `pending` forever. The
/// caller still gets the job back and discovers the failure by polling.
pub async fn submit(
    pool: &PgPool,
    queue: &JobQueue,
    config: &AppConfig,
    bytes: Vec<u8>,
    declared_filename: &str,
) -> Result<UpscaleJob, SubmitError> {
    validate_upload(&bytes, declared_filename, config)?;

    let job = queries::create_job(pool, declared_filename).await?;
    let descriptor = JobDescriptor::new(job.id, &bytes, declared_filename);

    if let Err(e) = queue.enqueue(&descriptor).await {
        tracing::error!(job_id = %job.id, error = %e, "Failed to enqueue job descriptor");
        let failed = queries::transition_job(
            pool,
            job.id,
            JobState::Failed,
            None,
            Some("queue unavailable: job was never dispatched"),
        )
        .await?;
        metrics::counter!("upscale_jobs_failed_total").increment(1);
        return Ok(failed);
    }

    metrics::counter!("upscale_jobs_submitted_total").increment(1);
    if let Ok(depth) = queue.queue_depth().await {
        metrics::gauge!("upscale_queue_depth").set(depth as f64);
    }

    tracing::info!(
        job_id = %job.id,
        filename = %declared_filename,
        size_bytes = bytes.len(),
        "Upscale job submitted"
    );

    Ok(job)
}
