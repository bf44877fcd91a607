use image_upscaler::{
    config::AppConfig,
    db::{self, queries, queries::JobStoreError},
    models::job::JobState,
    services::{
        queue::JobQueue,
        results::{ResultStatus, ResultStore},
        submission::{self, SubmitError, ValidationError},
        upscaler::{ComputeEngine, Upscaler},
    },
    worker::Worker,
};
use sqlx::PgPool;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Integration tests for the full job pipeline.
///
/// These require live PostgreSQL and Redis instances configured via
/// environment variables. Run with:
/// cargo test --test integration_test -- --ignored --test-threads=1

fn test_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 20) as u8, (y * 20) as u8, 64])
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

struct TestContext {
    config: AppConfig,
    pool: PgPool,
    queue: Arc<JobQueue>,
    results: Arc<ResultStore>,
}

async fn setup() -> TestContext {
    let config = AppConfig::from_env().expect("Failed to load config");

    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let queue = Arc::new(JobQueue::new(&config.redis_url).expect("Failed to initialize queue"));
    let results = Arc::new(
        ResultStore::new(
            &config.redis_url,
            Duration::from_secs(config.result_ttl_secs),
        )
        .expect("Failed to initialize result store"),
    );

    TestContext {
        config,
        pool,
        queue,
        results,
    }
}

fn make_worker(ctx: &TestContext, engine: Arc<dyn ComputeEngine>) -> Worker {
    Worker::new(
        ctx.pool.clone(),
        Arc::clone(&ctx.queue),
        Arc::clone(&ctx.results),
        engine,
        Duration::from_secs(60),
    )
}

#[tokio::test]
#[ignore] // Requires PostgreSQL and Redis
async fn full_pipeline_submit_process_fetch() {
    let ctx = setup().await;

    // Submit
    let job = submission::submit(
        &ctx.pool,
        &ctx.queue,
        &ctx.config,
        test_png(10, 10),
        "tiny.png",
    )
    .await
    .expect("Submission failed");

    // Before any worker runs, the job is pending, never terminal.
    assert_eq!(job.state, JobState::Pending);
    assert!(job.result_ref.is_none());
    assert!(job.error.is_none());

    // Worker processes the descriptor
    let worker = make_worker(&ctx, Arc::new(Upscaler::new(2)));
    let descriptor = ctx
        .queue
        .dequeue(Duration::from_secs(5))
        .await
        .expect("Dequeue failed")
        .expect("No descriptor in queue");
    assert_eq!(descriptor.job_id, job.id);

    worker.process(&descriptor).await.expect("Processing failed");

    // Terminal state is stable under repeated polling
    for _ in 0..3 {
        let polled = queries::get_job(&ctx.pool, job.id)
            .await
            .expect("Failed to read job")
            .expect("Job disappeared");
        assert_eq!(polled.state, JobState::Succeeded);
        assert_eq!(polled.progress, Some(100));
        assert!(polled.error.is_none());
    }

    // Fetch the result and verify the upscale actually happened
    let stored = queries::get_job(&ctx.pool, job.id)
        .await
        .unwrap()
        .unwrap();
    let result_ref = stored.result_ref.expect("Succeeded job missing result_ref");

    let fetched = ctx.results.get(&result_ref).await.expect("Result fetch failed");
    let ResultStatus::Ready(result) = fetched else {
        panic!("Expected a ready result");
    };
    assert_eq!(result.content_type, "image/png");
    assert_eq!(result.job_id, job.id);

    let decoded = image::load_from_memory(&result.bytes).expect("Result is not a valid image");
    assert_eq!((decoded.width(), decoded.height()), (20, 20));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL and Redis
async fn redelivered_descriptor_is_a_noop() {
    let ctx = setup().await;

    let job = submission::submit(
        &ctx.pool,
        &ctx.queue,
        &ctx.config,
        test_png(6, 6),
        "tiny.png",
    )
    .await
    .expect("Submission failed");

    let worker = make_worker(&ctx, Arc::new(Upscaler::new(2)));
    let descriptor = ctx
        .queue
        .dequeue(Duration::from_secs(5))
        .await
        .unwrap()
        .expect("No descriptor in queue");

    worker.process(&descriptor).await.expect("First processing failed");

    let first = queries::get_job(&ctx.pool, job.id).await.unwrap().unwrap();
    assert_eq!(first.state, JobState::Succeeded);
    let first_ref = first.result_ref.clone().unwrap();

    // At-least-once delivery: the same descriptor arrives again.
    ctx.queue.enqueue(&descriptor).await.expect("Re-enqueue failed");
    let redelivered = ctx
        .queue
        .dequeue(Duration::from_secs(5))
        .await
        .unwrap()
        .expect("No redelivered descriptor");
    assert_eq!(redelivered.job_id, job.id);

    worker
        .process(&redelivered)
        .await
        .expect("Redelivery processing failed");

    // Final state unchanged, result not double-written.
    let second = queries::get_job(&ctx.pool, job.id).await.unwrap().unwrap();
    assert_eq!(second.state, JobState::Succeeded);
    assert_eq!(second.result_ref.unwrap(), first_ref);
    assert_eq!(second.updated_at, first.updated_at);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL and Redis
async fn not_ready_engine_fails_jobs_loudly() {
    let ctx = setup().await;

    let job = submission::submit(
        &ctx.pool,
        &ctx.queue,
        &ctx.config,
        test_png(4, 4),
        "tiny.png",
    )
    .await
    .expect("Submission failed");

    // Factor 7 is unsupported, so the engine constructs not-ready.
    let worker = make_worker(&ctx, Arc::new(Upscaler::new(7)));
    let descriptor = ctx
        .queue
        .dequeue(Duration::from_secs(5))
        .await
        .unwrap()
        .expect("No descriptor in queue");

    worker.process(&descriptor).await.expect("Processing failed");

    let failed = queries::get_job(&ctx.pool, job.id).await.unwrap().unwrap();
    assert_eq!(failed.state, JobState::Failed);
    assert!(failed.result_ref.is_none());
    let cause = failed.error.expect("Failed job missing error");
    assert!(cause.contains("resource not ready"), "cause: {cause}");
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn job_store_rejects_illegal_transitions() {
    let ctx = setup().await;

    let job = queries::create_job(&ctx.pool, "direct.png")
        .await
        .expect("Failed to create job");

    // pending -> succeeded skips running and must be rejected
    let err = queries::transition_job(&ctx.pool, job.id, JobState::Succeeded, Some("ref"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, JobStoreError::IllegalTransition { .. }));

    // pending -> running is the legal claim; a second claim loses
    queries::transition_job(&ctx.pool, job.id, JobState::Running, None, None)
        .await
        .expect("Legal claim rejected");
    let err = queries::transition_job(&ctx.pool, job.id, JobState::Running, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, JobStoreError::IllegalTransition { .. }));

    // running -> failed is terminal; nothing moves a terminal job
    queries::transition_job(&ctx.pool, job.id, JobState::Failed, None, Some("boom"))
        .await
        .expect("Legal terminal transition rejected");
    let err = queries::transition_job(&ctx.pool, job.id, JobState::Running, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, JobStoreError::IllegalTransition { .. }));

    // unknown ids are NotFound, distinguished from rejection
    let err = queries::transition_job(&ctx.pool, Uuid::new_v4(), JobState::Running, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, JobStoreError::NotFound { .. }));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL and Redis
async fn invalid_submission_creates_no_job() {
    let ctx = setup().await;

    let count_before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM upscale_jobs")
        .fetch_one(&ctx.pool)
        .await
        .unwrap();

    let err = submission::submit(&ctx.pool, &ctx.queue, &ctx.config, Vec::new(), "empty.png")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Validation(ValidationError::EmptyFile)
    ));

    let err = submission::submit(
        &ctx.pool,
        &ctx.queue,
        &ctx.config,
        test_png(4, 4),
        "payload.exe",
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Validation(ValidationError::ExtensionNotAllowed { .. })
    ));

    let count_after: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM upscale_jobs")
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(count_before, count_after);
}

#[tokio::test]
#[ignore] // Requires Redis
async fn results_expire_after_ttl() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let results = ResultStore::new(&config.redis_url, Duration::from_secs(1))
        .expect("Failed to initialize result store");

    let result_ref = results
        .put(Uuid::new_v4(), b"result bytes", "image/png")
        .await
        .expect("Put failed");

    // Fresh results are readable
    assert!(matches!(
        results.get(&result_ref).await.unwrap(),
        ResultStatus::Ready(_)
    ));

    tokio::time::sleep(Duration::from_millis(1500)).await;

    // Past the TTL the bytes are still physically present (reclaim grace)
    // but the store reports them expired, not missing.
    assert!(matches!(
        results.get(&result_ref).await.unwrap(),
        ResultStatus::Expired
    ));

    // A handle that never existed is NotFound, not Expired.
    assert!(matches!(
        results.get("upscale:result:doesnotexist").await.unwrap(),
        ResultStatus::NotFound
    ));
}
