use image_upscaler::{
    config::AppConfig,
    db,
    services::{
        queue::JobQueue,
        results::ResultStore,
        upscaler::{ComputeEngine, Upscaler},
    },
    worker::Worker,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting upscale worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Expose worker-side metrics on a scrape port of their own
    let metrics_addr: SocketAddr = config
        .worker_metrics_addr
        .parse()
        .expect("Invalid worker metrics address");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("Failed to install Prometheus metrics exporter");

    metrics::describe_histogram!(
        "upscale_processing_seconds",
        "Time to process one upscale job"
    );
    metrics::describe_counter!("upscale_jobs_completed_total", "Total upscale jobs completed");
    metrics::describe_counter!("upscale_jobs_failed_total", "Total upscale jobs that failed");
    metrics::describe_gauge!(
        "upscale_queue_depth",
        "Current number of pending jobs in the queue"
    );

    // Initialize job store
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize queue and result store
    tracing::info!("Initializing services");
    let queue = Arc::new(JobQueue::new(&config.redis_url).expect("Failed to initialize job queue"));

    let results = Arc::new(
        ResultStore::new(
            &config.redis_url,
            Duration::from_secs(config.result_ttl_secs),
        )
        .expect("Failed to initialize result store"),
    );

    // The compute engine is built exactly once and shared read-only across
    // every worker context. A not-ready engine stays up and fails jobs
    // loudly until an operator fixes the configuration.
    let engine: Arc<dyn ComputeEngine> = Arc::new(Upscaler::new(config.upscale_factor));
    if !engine.is_ready() {
        tracing::error!(
            factor = config.upscale_factor,
            "Compute engine is not ready; all dispatched jobs will fail"
        );
    }

    // Re-queue descriptors stranded by a previous crash before pulling new work.
    match queue.recover_processing().await {
        Ok(0) => {}
        Ok(moved) => tracing::warn!(count = moved, "Recovered stranded descriptors"),
        Err(e) => tracing::error!(error = %e, "Failed to recover processing list"),
    }

    tracing::info!(
        concurrency = config.worker_concurrency,
        "Worker ready, starting job processing loops"
    );

    let compute_deadline = Duration::from_secs(config.compute_deadline_secs);

    let mut handles = Vec::with_capacity(config.worker_concurrency);
    for worker_index in 0..config.worker_concurrency {
        let worker = Worker::new(
            db_pool.clone(),
            Arc::clone(&queue),
            Arc::clone(&results),
            Arc::clone(&engine),
            compute_deadline,
        );
        handles.push(tokio::spawn(async move { worker.run(worker_index).await }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Worker task exited unexpectedly");
        }
    }
}
