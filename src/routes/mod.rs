pub mod health;
pub mod index;
pub mod metrics;
pub mod upscale;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::models::api::ErrorBody;
use crate::services::submission::ValidationError;

/// Error surface of the API. Every failure maps to a status code plus a
/// machine-readable `{error, code}` body; internal causes are logged at the
/// call site and never leak verbatim.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("multipart upload could not be read")]
    MalformedUpload,

    #[error("job not found")]
    JobNotFound,

    #[error("job has not finished yet")]
    ResultNotReady,

    #[error("result has expired")]
    ResultExpired,

    #[error("internal error")]
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::MalformedUpload => StatusCode::BAD_REQUEST,
            ApiError::JobNotFound => StatusCode::NOT_FOUND,
            ApiError::ResultNotReady => StatusCode::CONFLICT,
            ApiError::ResultExpired => StatusCode::GONE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(e) => e.code(),
            ApiError::MalformedUpload => "malformed_upload",
            ApiError::JobNotFound => "not_found",
            ApiError::ResultNotReady => "not_ready",
            ApiError::ResultExpired => "expired",
            ApiError::Internal => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
