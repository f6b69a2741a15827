//! Liveness endpoint. Reports database and broker reachability.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Database and broker reachable"),
        (status = 503, description = "Database or broker down")
    )
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .is_ok();

    let mut broker = state.broker.clone();
    let broker_ok = redis::cmd("PING")
        .query_async::<String>(&mut broker)
        .await
        .is_ok();

    let status = if database && broker_ok {
        StatusCode::OK
    } else {
        tracing::warn!(database, broker = broker_ok, "Health check degraded");
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if status.is_success() { "ok" } else { "degraded" },
            "service": "smartnotify-api",
            "version": env!("CARGO_PKG_VERSION"),
            "database": database,
            "broker": broker_ok,
        })),
    )
}
