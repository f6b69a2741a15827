//! Account routes: registration, login and token refresh.

use axum::extract::State;
use axum::routing::post;
use axum::Router;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use smartnotify_common::envelope::{self, Envelope, Reply};
use smartnotify_common::error::{AppError, AuthFailure};
use smartnotify_common::types::UserSummary;
use smartnotify_engine::accounts::{AccountService, LoginParams, RegisterParams, RegisteredUser};

use crate::extract::{ClientInfo, Json};
use crate::middleware::auth::{TokenType, decode_token, issue_access, issue_tokens};
use crate::middleware::throttle::{self, Ident, ThrottleScope};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/user/register/", post(register))
        .route("/api/v1/user/login/", post(login))
        .route("/api/v1/user/token/refresh/", post(refresh_token))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub refresh: String,
    pub access: String,
    pub user: UserSummary,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub access: String,
}

/// POST /api/v1/user/register/
///
/// Create an account with default preferences.
#[utoipa::path(
    post,
    path = "/api/v1/user/register/",
    tag = "Users",
    request_body = RegisterParams,
    responses(
        (status = 201, description = "Account created", body = Envelope<RegisteredUser>),
        (status = 400, description = "Field errors"),
        (status = 429, description = "Throttled")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(params): Json<RegisterParams>,
) -> Result<Reply<RegisteredUser>, AppError> {
    throttle::check(&state, ThrottleScope::Anon, &Ident::Ip(client.ip.clone())).await?;

    let user = AccountService::register(&state.pool, &params).await?;
    Ok(envelope::created(
        "User Registration Successful!",
        RegisteredUser::from(&user),
    ))
}

/// POST /api/v1/user/login/
///
/// Issue tokens and record the login device.
#[utoipa::path(
    post,
    path = "/api/v1/user/login/",
    tag = "Users",
    request_body = LoginParams,
    responses(
        (status = 200, description = "Access and refresh tokens", body = Envelope<LoginResponse>),
        (status = 400, description = "Field errors"),
        (status = 401, description = "Bad credentials or inactive account"),
        (status = 429, description = "Throttled")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(params): Json<LoginParams>,
) -> Result<Reply<LoginResponse>, AppError> {
    throttle::check(&state, ThrottleScope::Login, &Ident::Ip(client.ip.clone())).await?;

    let mut broker = state.broker.clone();
    let outcome = AccountService::login(
        &state.pool,
        &mut broker,
        &state.queue,
        &params,
        &client.device(),
    )
    .await?;

    let tokens = issue_tokens(outcome.user.id, &state.config)?;
    Ok(envelope::ok(
        "User Login Successful!",
        LoginResponse {
            refresh: tokens.refresh,
            access: tokens.access,
            user: UserSummary::from(&outcome.user),
        },
    ))
}

/// POST /api/v1/user/token/refresh/
///
/// Exchange a refresh token for a new access token.
#[utoipa::path(
    post,
    path = "/api/v1/user/token/refresh/",
    tag = "Users",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = Envelope<RefreshResponse>),
        (status = 401, description = "Invalid or expired refresh token")
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(req): Json<RefreshRequest>,
) -> Result<Reply<RefreshResponse>, AppError> {
    throttle::check(&state, ThrottleScope::Anon, &Ident::Ip(client.ip.clone())).await?;

    let refresh = req
        .refresh
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::field("refresh", "This field is required."))?;

    let claims = decode_token(refresh.trim(), &state.config.secret_key, TokenType::Refresh)?;
    let user_id: i64 = claims
        .sub
        .parse()
        .map_err(|_| AppError::Auth(AuthFailure::Invalid))?;
    let user = AccountService::get(&state.pool, user_id)
        .await
        .map_err(|_| AppError::Auth(AuthFailure::Invalid))?;
    if !user.is_active {
        return Err(AppError::Auth(AuthFailure::Invalid));
    }

    tracing::debug!(user_id, "Access token refreshed");
    Ok(envelope::ok(
        "Token Refreshed Successful",
        RefreshResponse {
            access: issue_access(user.id, &state.config)?,
        },
    ))
}
