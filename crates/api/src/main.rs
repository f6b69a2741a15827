//! SmartNotify API server binary entrypoint.

use std::net::SocketAddr;

use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use smartnotify_common::config::AppConfig;
use smartnotify_common::db::create_pool;
use smartnotify_common::redis_pool::create_redis_pool;

use smartnotify_api::routes::create_router;
use smartnotify_api::state::AppState;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(config.log_filter(&[
                "smartnotify_api",
                "smartnotify_engine",
                "smartnotify_common",
                "tower_http",
            ]))
        }))
        .init();

    tracing::info!(debug = config.debug, "Starting SmartNotify API server...");

    // Create database connection pool
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;

    // Task broker, and throttle counters (same connection when the URLs match)
    let broker = create_redis_pool(&config.broker_url).await?;
    let redis = if config.redis_url == config.broker_url {
        broker.clone()
    } else {
        create_redis_pool(&config.redis_url).await?
    };

    let addr: SocketAddr = config.bind_addr.parse()?;

    // Build application state
    let state = AppState::new(pool, redis, broker, config);

    // Build router
    let app = create_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received shutdown signal, stopping gracefully...");
    })
    .await?;

    Ok(())
}
