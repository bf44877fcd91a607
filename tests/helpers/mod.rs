//! Test helper utilities for E2E testing

use reqwest::multipart;
use std::io::Cursor;
use std::time::Duration;
use tokio::time::sleep;

use image_upscaler::models::api::{JobStatusResponse, SubmitResponse};
use image_upscaler::models::job::JobState;

/// Generate a small in-memory PNG for upload tests.
pub fn test_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 20) as u8, (y * 20) as u8, 200])
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Upload an image to the upscale endpoint; returns the raw response so
/// callers can assert on rejections too.
pub async fn upload_image(
    client: &reqwest::Client,
    base_url: &str,
    bytes: Vec<u8>,
    filename: &str,
) -> Result<reqwest::Response, Box<dyn std::error::Error>> {
    let form = multipart::Form::new().part(
        "file",
        multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")?,
    );

    let response = client
        .post(format!("{}/api/v1/upscale", base_url))
        .multipart(form)
        .send()
        .await?;

    Ok(response)
}

/// Upload an image and parse the accepted-submission body.
pub async fn submit_image(
    client: &reqwest::Client,
    base_url: &str,
    bytes: Vec<u8>,
    filename: &str,
) -> Result<SubmitResponse, Box<dyn std::error::Error>> {
    let response = upload_image(client, base_url, bytes, filename).await?;

    let status = response.status();
    if status != reqwest::StatusCode::ACCEPTED {
        let error_text = response.text().await?;
        return Err(format!("Upload failed with status {}: {}", status, error_text).into());
    }

    Ok(response.json::<SubmitResponse>().await?)
}

/// Poll job status until it reaches a terminal state (with timeout).
pub async fn poll_until_terminal(
    client: &reqwest::Client,
    base_url: &str,
    job_id: &str,
    timeout_secs: u64,
) -> Result<JobStatusResponse, Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs * 2; // Poll every 500ms

    for _ in 0..max_attempts {
        let response = client
            .get(format!("{}/api/v1/jobs/{}", base_url, job_id))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(format!("Status check failed: {}", error_text).into());
        }

        let status_response = response.json::<JobStatusResponse>().await?;

        match status_response.state {
            JobState::Succeeded | JobState::Failed => return Ok(status_response),
            JobState::Pending | JobState::Running => {
                sleep(Duration::from_millis(500)).await;
            }
        }
    }

    Err(format!("Job did not complete within {} seconds", timeout_secs).into())
}
