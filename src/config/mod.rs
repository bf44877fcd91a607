use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string (job store)
    pub database_url: String,

    /// Redis connection string (job queue + result store)
    pub redis_url: String,

    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Allowed upload file extensions (comma-separated in the environment)
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Time-to-live for stored results, in seconds
    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,

    /// Number of concurrent worker loops per worker process
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Deadline for a single compute invocation, in seconds
    #[serde(default = "default_compute_deadline_secs")]
    pub compute_deadline_secs: u64,

    /// Upscale factor applied by the compute engine (2, 3 or 4)
    #[serde(default = "default_upscale_factor")]
    pub upscale_factor: u32,

    /// Address the worker process serves its Prometheus metrics on
    #[serde(default = "default_worker_metrics_addr")]
    pub worker_metrics_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_max_upload_bytes() -> usize {
    16 * 1024 * 1024 // 16 MiB
}

fn default_allowed_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "bmp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_result_ttl_secs() -> u64 {
    3600
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_compute_deadline_secs() -> u64 {
    120
}

fn default_upscale_factor() -> u32 {
    2
}

fn default_worker_metrics_addr() -> String {
    "0.0.0.0:9464".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
