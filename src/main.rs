use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use image_upscaler::app_state::AppState;
use image_upscaler::config::AppConfig;
use image_upscaler::db;
use image_upscaler::routes;
use image_upscaler::services::{queue::JobQueue, results::ResultStore};
use std::time::Duration;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing image-upscaler API server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_histogram!(
        "upscale_processing_seconds",
        "Time to process one upscale job"
    );
    metrics::describe_counter!("upscale_jobs_submitted_total", "Total upscale jobs submitted");
    metrics::describe_counter!("upscale_jobs_completed_total", "Total upscale jobs completed");
    metrics::describe_counter!("upscale_jobs_failed_total", "Total upscale jobs that failed");
    metrics::describe_gauge!(
        "upscale_queue_depth",
        "Current number of pending jobs in the queue"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL job store");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize Redis job queue and result store
    tracing::info!("Connecting to Redis job queue");
    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize job queue");

    let results = ResultStore::new(
        &config.redis_url,
        Duration::from_secs(config.result_ttl_secs),
    )
    .expect("Failed to initialize result store");

    let bind_addr = config.bind_addr.clone();
    let max_upload_bytes = config.max_upload_bytes;

    // Create shared application state
    let state = AppState::new(db_pool, queue, results, config);

    // Build API routes
    let app = Router::new()
        .route("/", get(routes::index::service_index))
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/upscale", post(routes::upscale::submit_upscale))
        .route("/api/v1/jobs/{job_id}", get(routes::upscale::get_job_status))
        .route(
            "/api/v1/jobs/{job_id}/result",
            get(routes::upscale::download_result),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        // Allow multipart framing overhead on top of the payload ceiling
        .layer(RequestBodyLimitLayer::new(max_upload_bytes + 64 * 1024));

    tracing::info!("Starting image-upscaler on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
