use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::queries;
use crate::models::api::{JobStatusResponse, SubmitResponse};
use crate::models::job::JobState;
use crate::routes::ApiError;
use crate::services::results::ResultStatus;
use crate::services::submission::{self, SubmitError, ValidationError};

/// POST /api/v1/upscale — accept an image upload and enqueue an upscale job.
pub async fn submit_upscale(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let mut upload: Option<(Vec<u8>, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::MalformedUpload)?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await.map_err(|_| ApiError::MalformedUpload)?;
            upload = Some((data.to_vec(), filename));
        }
    }

    let (bytes, filename) =
        upload.ok_or(ApiError::Validation(ValidationError::MissingFile))?;

    let job = submission::submit(&state.db, &state.queue, &state.config, bytes, &filename)
        .await
        .map_err(|e| match e {
            SubmitError::Validation(v) => ApiError::Validation(v),
            SubmitError::Store(err) => {
                tracing::error!(error = %err, "Failed to record submitted job");
                ApiError::Internal
            }
        })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: job.id,
            status_url: format!("/api/v1/jobs/{}", job.id),
            result_url: format!("/api/v1/jobs/{}/result", job.id),
        }),
    ))
}

/// GET /api/v1/jobs/{job_id} — report the job's current state.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job = queries::get_job(&state.db, job_id)
        .await
        .map_err(|e| {
            tracing::error!(job_id = %job_id, error = %e, "Failed to read job");
            ApiError::Internal
        })?
        .ok_or(ApiError::JobNotFound)?;

    Ok(Json(JobStatusResponse {
        job_id: job.id,
        state: job.state,
        progress: job.progress,
        error: job.error,
    }))
}

/// GET /api/v1/jobs/{job_id}/result — stream the upscaled image.
///
/// 409 while the job is pending or running, 404 for unknown or failed jobs,
/// 410 once the stored result has passed its TTL.
pub async fn download_result(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let job = queries::get_job(&state.db, job_id)
        .await
        .map_err(|e| {
            tracing::error!(job_id = %job_id, error = %e, "Failed to read job");
            ApiError::Internal
        })?
        .ok_or(ApiError::JobNotFound)?;

    match job.state {
        JobState::Pending | JobState::Running => Err(ApiError::ResultNotReady),
        // Failed jobs have no result to expose.
        JobState::Failed => Err(ApiError::JobNotFound),
        JobState::Succeeded => {
            let result_ref = job.result_ref.as_deref().ok_or_else(|| {
                tracing::error!(job_id = %job_id, "Succeeded job is missing its result_ref");
                ApiError::Internal
            })?;

            let status = state.results.get(result_ref).await.map_err(|e| {
                tracing::error!(job_id = %job_id, error = %e, "Failed to read result");
                ApiError::Internal
            })?;

            match status {
                ResultStatus::Ready(stored) => {
                    let filename = download_filename(&job.original_filename);
                    Ok((
                        [
                            (header::CONTENT_TYPE, stored.content_type),
                            (
                                header::CONTENT_DISPOSITION,
                                format!("attachment; filename=\"{filename}\""),
                            ),
                        ],
                        stored.bytes,
                    )
                        .into_response())
                }
                // A succeeded job with a reclaimed result still means
                // "expired": the result_ref proves the bytes once existed.
                ResultStatus::Expired | ResultStatus::NotFound => Err(ApiError::ResultExpired),
            }
        }
    }
}

/// Download name for the result, derived from the uploaded filename.
fn download_filename(original: &str) -> String {
    let stem = std::path::Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    format!("upscaled_{stem}.png")
}
