use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::job::{JobState, UpscaleJob};

/// Errors surfaced by the job store.
#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("job {job_id} not found")]
    NotFound { job_id: Uuid },

    /// A transition outside the state machine was requested. Rejected, never
    /// applied; under correct worker behavior this only happens for
    /// redelivered descriptors of already-terminal jobs.
    #[error("illegal transition {from} -> {to} for job {job_id}")]
    IllegalTransition {
        job_id: Uuid,
        from: JobState,
        to: JobState,
    },

    #[error("job {job_id} has an unrecognized state value: {value}")]
    CorruptState { job_id: Uuid, value: String },

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

fn job_from_row(row: &PgRow) -> Result<UpscaleJob, JobStoreError> {
    let id: Uuid = row.try_get("id")?;
    let state_value: String = row.try_get("state")?;
    let state = state_value
        .parse::<JobState>()
        .map_err(|_| JobStoreError::CorruptState {
            job_id: id,
            value: state_value,
        })?;

    Ok(UpscaleJob {
        id,
        state,
        original_filename: row.try_get("original_filename")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        progress: row.try_get("progress")?,
        error: row.try_get("error")?,
        result_ref: row.try_get("result_ref")?,
    })
}

/// Insert a new job in state `pending`.
pub async fn create_job(
    pool: &PgPool,
    original_filename: &str,
) -> Result<UpscaleJob, JobStoreError> {
    let row = sqlx::query(
        r#"
        INSERT INTO upscale_jobs (id, state, original_filename)
        VALUES ($1, 'pending', $2)
        RETURNING id, state, original_filename, created_at, updated_at, progress, error, result_ref
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(original_filename)
    .fetch_one(pool)
    .await?;

    job_from_row(&row)
}

/// Get a job by ID. `Ok(None)` means the id was never issued.
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<UpscaleJob>, JobStoreError> {
    let row = sqlx::query(
        r#"
        SELECT id, state, original_filename, created_at, updated_at, progress, error, result_ref
        FROM upscale_jobs
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Atomically transition a job to `new_state`.
///
/// The update is guarded on the set of states from which `new_state` may
/// legally be entered, so concurrent transition attempts on the same job
/// cannot interleave: the losing writer gets `IllegalTransition` (or
/// `NotFound`), never a silent overwrite. Terminal transitions also pin
/// `progress` to 100.
pub async fn transition_job(
    pool: &PgPool,
    job_id: Uuid,
    new_state: JobState,
    result_ref: Option<&str>,
    error: Option<&str>,
) -> Result<UpscaleJob, JobStoreError> {
    let prior: Vec<String> = JobState::legal_prior(new_state)
        .iter()
        .map(|s| s.to_string())
        .collect();

    let row = sqlx::query(
        r#"
        UPDATE upscale_jobs
        SET state = $1,
            result_ref = $2,
            error = $3,
            progress = CASE WHEN $1 IN ('succeeded', 'failed') THEN 100 ELSE progress END,
            updated_at = NOW()
        WHERE id = $4 AND state = ANY($5)
        RETURNING id, state, original_filename, created_at, updated_at, progress, error, result_ref
        "#,
    )
    .bind(new_state.to_string())
    .bind(result_ref)
    .bind(error)
    .bind(job_id)
    .bind(&prior)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(r) => job_from_row(&r),
        None => match get_job(pool, job_id).await? {
            Some(job) => Err(JobStoreError::IllegalTransition {
                job_id,
                from: job.state,
                to: new_state,
            }),
            None => Err(JobStoreError::NotFound { job_id }),
        },
    }
}

/// Best-effort progress update. Guarded on `state = 'running'` so a racing
/// terminal transition always wins; returns whether a row was touched.
pub async fn update_progress(
    pool: &PgPool,
    job_id: Uuid,
    progress: i16,
) -> Result<bool, JobStoreError> {
    let result = sqlx::query(
        r#"
        UPDATE upscale_jobs
        SET progress = $1, updated_at = NOW()
        WHERE id = $2 AND state = 'running'
        "#,
    )
    .bind(progress)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
