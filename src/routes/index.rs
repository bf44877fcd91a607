use axum::Json;
use serde_json::{json, Value};

/// GET / — service index describing the available endpoints.
pub async fn service_index() -> Json<Value> {
    Json(json!({
        "service": "Image Upscaling API",
        "endpoints": {
            "POST /api/v1/upscale": "Upload an image for upscaling",
            "GET /api/v1/jobs/{job_id}": "Check job status",
            "GET /api/v1/jobs/{job_id}/result": "Download the upscaled image"
        }
    }))
}
