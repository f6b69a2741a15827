//! Thread, subscription and comment routes.
//!
//! Posting a comment (`/trigger/`) is what fans notifications out to the
//! thread's subscribers.

use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};
use serde::Serialize;
use utoipa::ToSchema;

use smartnotify_common::envelope::{self, Envelope, Reply};
use smartnotify_common::error::AppError;
use smartnotify_common::types::{CommentView, ThreadSummary};
use smartnotify_engine::threads::{
    CommentService, CreateCommentParams, CreateThreadParams, SubscribeParams, ThreadService,
};

use crate::extract::{ClientInfo, Json};
use crate::middleware::auth::AuthUser;
use crate::middleware::throttle;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/notifications/trigger/", post(create_comment))
        .route("/api/v1/notifications/thread/create/", post(create_thread))
        .route("/api/v1/notifications/thread/fetch/", get(list_threads))
        .route(
            "/api/v1/notifications/thread-subscription/create/",
            post(subscribe),
        )
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubscriptionView {
    pub thread: i64,
}

/// POST /api/v1/notifications/trigger/
///
/// Post a comment and notify subscribers.
#[utoipa::path(
    post,
    path = "/api/v1/notifications/trigger/",
    tag = "Comment",
    request_body = CreateCommentParams,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Comment created", body = Envelope<CommentView>),
        (status = 400, description = "Field errors")
    )
)]
pub async fn create_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    Json(params): Json<CreateCommentParams>,
) -> Result<Reply<CommentView>, AppError> {
    throttle::check_user_or_anon(&state, Some(&auth), &client.ip).await?;

    let mut broker = state.broker.clone();
    let (comment, summary) =
        CommentService::create(&state.pool, &mut broker, &state.queue, auth.user_id, &params)
            .await?;

    tracing::info!(
        user_id = auth.user_id,
        comment_id = comment.id,
        notifications = summary.notifications,
        "Comment posted"
    );
    Ok(envelope::created(
        "Comments Created Successful",
        CommentView::from(&comment),
    ))
}

/// POST /api/v1/notifications/thread/create/
///
/// Create a thread and subscribe its creator.
#[utoipa::path(
    post,
    path = "/api/v1/notifications/thread/create/",
    tag = "Thread",
    request_body = CreateThreadParams,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Thread created", body = Envelope<ThreadSummary>),
        (status = 400, description = "Field errors")
    )
)]
pub async fn create_thread(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    Json(params): Json<CreateThreadParams>,
) -> Result<Reply<ThreadSummary>, AppError> {
    throttle::check_user_or_anon(&state, Some(&auth), &client.ip).await?;

    let thread = ThreadService::create(&state.pool, auth.user_id, &params).await?;
    Ok(envelope::created(
        "Threads Created Successful",
        ThreadSummary::from(&thread),
    ))
}

/// GET /api/v1/notifications/thread/fetch/
///
/// List every thread. Public.
#[utoipa::path(
    get,
    path = "/api/v1/notifications/thread/fetch/",
    tag = "Thread",
    responses(
        (status = 200, description = "All threads", body = Envelope<Vec<ThreadSummary>>)
    )
)]
pub async fn list_threads(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    client: ClientInfo,
) -> Result<Reply<Vec<ThreadSummary>>, AppError> {
    throttle::check_user_or_anon(&state, auth.as_ref(), &client.ip).await?;

    let threads = ThreadService::list(&state.pool).await?;
    tracing::info!(count = threads.len(), "Fetched threads");
    Ok(envelope::ok("Threads Fetched Successful", threads))
}

/// POST /api/v1/notifications/thread-subscription/create/
///
/// Subscribe to a thread.
#[utoipa::path(
    post,
    path = "/api/v1/notifications/thread-subscription/create/",
    tag = "Thread",
    request_body = SubscribeParams,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Subscribed", body = Envelope<SubscriptionView>),
        (status = 400, description = "Unknown thread or already subscribed")
    )
)]
pub async fn subscribe(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    Json(params): Json<SubscribeParams>,
) -> Result<Reply<SubscriptionView>, AppError> {
    throttle::check_user_or_anon(&state, Some(&auth), &client.ip).await?;

    let subscription = ThreadService::subscribe(&state.pool, auth.user_id, &params).await?;
    Ok(envelope::created(
        "Threads Subscription Created Successful",
        SubscriptionView {
            thread: subscription.thread_id,
        },
    ))
}
