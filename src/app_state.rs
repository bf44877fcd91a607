use sqlx::PgPool;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{queue::JobQueue, results::ResultStore};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub queue: Arc<JobQueue>,
    pub results: Arc<ResultStore>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(db: PgPool, queue: JobQueue, results: ResultStore, config: AppConfig) -> Self {
        Self {
            db,
            queue: Arc::new(queue),
            results: Arc::new(results),
            config: Arc::new(config),
        }
    }
}
