//! Notification preference routes.

use axum::Router;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::routing::get;

use smartnotify_common::envelope::{self, Envelope, Reply};
use smartnotify_common::error::AppError;
use smartnotify_common::types::PreferenceView;
use smartnotify_engine::preferences::{PreferencePatch, PreferenceService};

use crate::extract::Json;
use crate::middleware::auth::AuthUser;
use crate::middleware::throttle::{self, Ident, ThrottleScope};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/v1/notifications/notification-preferences/{user_id}/",
        get(get_preferences).patch(update_preferences),
    )
}

/// A non-integer id matches no route.
fn user_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, AppError> {
    path.map(|Path(id)| id)
        .map_err(|_| AppError::NotFound("Not found.".to_string()))
}

/// GET /api/v1/notifications/notification-preferences/{user_id}/
#[utoipa::path(
    get,
    path = "/api/v1/notifications/notification-preferences/{user_id}/",
    tag = "Notification Preference",
    params(("user_id" = i64, Path, description = "Owner of the preferences")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Channel switches", body = Envelope<PreferenceView>),
        (status = 403, description = "Not the owner and not staff"),
        (status = 404, description = "No preferences for this user")
    )
)]
pub async fn get_preferences(
    State(state): State<AppState>,
    auth: AuthUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Reply<PreferenceView>, AppError> {
    throttle::check(
        &state,
        ThrottleScope::NotificationPrefGet,
        &Ident::User(auth.user_id),
    )
    .await?;

    let user_id = user_id(path)?;
    let pref = PreferenceService::get(&state.pool, auth.user_id, user_id).await?;
    tracing::info!(user_id, requester = auth.user_id, "Notification preferences fetched");
    Ok(envelope::ok(
        "Notification Preferences Fetched Successful",
        PreferenceView::from(&pref),
    ))
}

/// PATCH /api/v1/notifications/notification-preferences/{user_id}/
#[utoipa::path(
    patch,
    path = "/api/v1/notifications/notification-preferences/{user_id}/",
    tag = "Notification Preference",
    params(("user_id" = i64, Path, description = "Owner of the preferences")),
    request_body = PreferencePatch,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Updated switches", body = Envelope<PreferenceView>),
        (status = 400, description = "Field errors"),
        (status = 403, description = "Not the owner and not staff"),
        (status = 404, description = "No preferences for this user")
    )
)]
pub async fn update_preferences(
    State(state): State<AppState>,
    auth: AuthUser,
    path: Result<Path<i64>, PathRejection>,
    Json(patch): Json<PreferencePatch>,
) -> Result<Reply<PreferenceView>, AppError> {
    throttle::check(
        &state,
        ThrottleScope::NotificationPrefPatch,
        &Ident::User(auth.user_id),
    )
    .await?;

    let user_id = user_id(path)?;
    let pref = PreferenceService::update(&state.pool, auth.user_id, user_id, &patch).await?;
    Ok(envelope::ok(
        "Notification Preference Updated Successful",
        PreferenceView::from(&pref),
    ))
}
