pub mod accounts;
pub mod health;
pub mod notifications;
pub mod preferences;
pub mod threads;

use axum::Router;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use smartnotify_common::error::AppError;

use crate::docs;
use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(accounts::router())
        .merge(preferences::router())
        .merge(threads::router())
        .merge(notifications::router())
        .merge(docs::swagger_ui())
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state)
}

async fn not_found() -> AppError {
    AppError::NotFound("Not found.".to_string())
}

async fn method_not_allowed(method: Method) -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        axum::Json(json!({
            "message": "Method Not Allowed.",
            "data": {},
            "errors": [{
                "method_not_allowed": format!("Method \"{}\" not allowed.", method),
            }],
        })),
    )
        .into_response()
}
