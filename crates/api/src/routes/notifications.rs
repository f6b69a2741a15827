//! Inbox routes: unread list, mark-as-read and history.

use axum::Router;
use axum::extract::{Query, State};
use axum::http::Uri;
use axum::routing::{get, post};
use serde::Serialize;
use utoipa::ToSchema;

use smartnotify_common::envelope::{self, Envelope, Reply};
use smartnotify_common::error::AppError;
use smartnotify_common::pagination::{Listing, PageQuery};
use smartnotify_engine::inbox::{InboxService, MarkReadParams, MarkReadResult, NotificationView};

use crate::extract::Json;
use crate::middleware::auth::AuthUser;
use crate::middleware::throttle::{self, Ident, ThrottleScope};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/notifications/notifications/unread/", get(unread))
        .route("/api/v1/notifications/notifications/read/", post(mark_read))
        .route("/api/v1/notifications/notifications/history/", get(history))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkedRead {
    pub marked_read: MarkReadResult,
}

/// GET /api/v1/notifications/notifications/unread/
#[utoipa::path(
    get,
    path = "/api/v1/notifications/notifications/unread/",
    tag = "Notification",
    params(PageQuery),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Unread notifications, full list or one page", body = Envelope<Listing<NotificationView>>),
        (status = 404, description = "Invalid page")
    )
)]
pub async fn unread(
    State(state): State<AppState>,
    auth: AuthUser,
    uri: Uri,
    Query(query): Query<PageQuery>,
) -> Result<Reply<Listing<NotificationView>>, AppError> {
    throttle::check(
        &state,
        ThrottleScope::UnreadNotifications,
        &Ident::User(auth.user_id),
    )
    .await?;

    let page = query.resolve(state.config.page_size, state.config.max_page_size)?;
    let listing = InboxService::unread(&state.pool, auth.user_id, page, uri.path()).await?;
    tracing::info!(user_id = auth.user_id, paginated = page.is_some(), "Unread notifications fetched");
    Ok(envelope::ok("Unread Notification fetched successfully.", listing))
}

/// POST /api/v1/notifications/notifications/read/
#[utoipa::path(
    post,
    path = "/api/v1/notifications/notifications/read/",
    tag = "Notification",
    request_body = MarkReadParams,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Ids marked read", body = Envelope<MarkedRead>),
        (status = 400, description = "Field errors or ids not owned by the caller")
    )
)]
pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(params): Json<MarkReadParams>,
) -> Result<Reply<MarkedRead>, AppError> {
    throttle::check(
        &state,
        ThrottleScope::MarkNotificationsRead,
        &Ident::User(auth.user_id),
    )
    .await?;

    let result = InboxService::mark_read(&state.pool, auth.user_id, &params).await?;
    Ok(envelope::ok(
        "Notifications Marked as read.",
        MarkedRead {
            marked_read: result,
        },
    ))
}

/// GET /api/v1/notifications/notifications/history/
#[utoipa::path(
    get,
    path = "/api/v1/notifications/notifications/history/",
    tag = "Notification",
    params(PageQuery),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All notifications, full list or one page", body = Envelope<Listing<NotificationView>>),
        (status = 404, description = "Invalid page")
    )
)]
pub async fn history(
    State(state): State<AppState>,
    auth: AuthUser,
    uri: Uri,
    Query(query): Query<PageQuery>,
) -> Result<Reply<Listing<NotificationView>>, AppError> {
    throttle::check(
        &state,
        ThrottleScope::NotificationHistory,
        &Ident::User(auth.user_id),
    )
    .await?;

    let page = query.resolve(state.config.page_size, state.config.max_page_size)?;
    let listing = InboxService::history(&state.pool, auth.user_id, page, uri.path()).await?;
    tracing::info!(user_id = auth.user_id, paginated = page.is_some(), "Notification history fetched");
    Ok(envelope::ok("Notifications fetched successfully.", listing))
}
