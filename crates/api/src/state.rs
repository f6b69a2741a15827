//! Shared application state for the Axum API server.

use redis::aio::ConnectionManager;
use sqlx::PgPool;

use smartnotify_common::config::AppConfig;
use smartnotify_common::tasks::TaskQueue;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// Throttle counters (`REDIS_URL`)
    pub redis: ConnectionManager,
    /// Task broker (`CELERY_BROKER_URL`)
    pub broker: ConnectionManager,
    pub queue: TaskQueue,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        redis: ConnectionManager,
        broker: ConnectionManager,
        config: AppConfig,
    ) -> Self {
        Self {
            pool,
            redis,
            broker,
            queue: TaskQueue::default(),
            config,
        }
    }
}
