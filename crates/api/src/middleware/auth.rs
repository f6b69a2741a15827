//! JWT authentication helpers and extractors.
//!
//! Login issues a short-lived access token and a longer-lived refresh
//! token, both HS256-signed with `SECRET_KEY`. Protected routes take an
//! `AuthUser`, which validates the `Authorization: Bearer <access>` header.

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use smartnotify_common::config::AppConfig;
use smartnotify_common::error::{AppError, AuthFailure};

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims stored in the token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (the user id)
    pub sub: String,
    /// Expiration time (UNIX timestamp)
    pub exp: i64,
    /// Issued at (UNIX timestamp)
    pub iat: i64,
    /// Unique token id
    pub jti: String,
    pub token_type: TokenType,
}

/// Access + refresh pair returned by login.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub refresh: String,
    pub access: String,
}

/// Authenticated user extracted from an access token.
///
/// Use as an Axum extractor on protected routes, or as `Option<AuthUser>`
/// where anonymous access is allowed.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub claims: Claims,
}

/// Encode a token of the given type for a user.
pub fn encode_token(
    user_id: i64,
    token_type: TokenType,
    secret: &str,
    ttl: Duration,
) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now + ttl).timestamp(),
        iat: now.timestamp(),
        jti: Uuid::new_v4().simple().to_string(),
        token_type,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to encode JWT: {}", e)))
}

/// Decode and validate a token, requiring it to be of `expected` type.
pub fn decode_token(token: &str, secret: &str, expected: TokenType) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::Auth(AuthFailure::Expired),
        _ => AppError::Auth(AuthFailure::Invalid),
    })?;

    if token_data.claims.token_type != expected {
        return Err(AppError::Auth(AuthFailure::Invalid));
    }
    Ok(token_data.claims)
}

/// Issue a fresh access + refresh pair using the configured lifetimes.
pub fn issue_tokens(user_id: i64, config: &AppConfig) -> Result<TokenPair, AppError> {
    Ok(TokenPair {
        refresh: encode_token(
            user_id,
            TokenType::Refresh,
            &config.secret_key,
            Duration::hours(config.jwt_refresh_hours as i64),
        )?,
        access: issue_access(user_id, config)?,
    })
}

pub fn issue_access(user_id: i64, config: &AppConfig) -> Result<String, AppError> {
    encode_token(
        user_id,
        TokenType::Access,
        &config.secret_key,
        Duration::minutes(config.jwt_access_minutes as i64),
    )
}

/// Resolve an access token to an active user.
async fn authenticate(token: &str, secret: &str, pool: &PgPool) -> Result<AuthUser, AppError> {
    let claims = decode_token(token, secret, TokenType::Access)?;
    let user_id: i64 = claims
        .sub
        .parse()
        .map_err(|_| AppError::Auth(AuthFailure::Invalid))?;

    let active: Option<bool> = sqlx::query_scalar("SELECT is_active FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    if active != Some(true) {
        return Err(AppError::Auth(AuthFailure::Invalid));
    }

    Ok(AuthUser { user_id, claims })
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
}

/// Extracts and validates the JWT from the `Authorization: Bearer <token>` header.
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let secret = state.config.secret_key.clone();
        let pool = state.pool.clone();
        let token = bearer_token(parts);

        async move {
            let token = token.ok_or(AppError::Auth(AuthFailure::Missing))?;
            authenticate(&token, &secret, &pool).await
        }
    }
}

/// No header means anonymous; a bad token is still rejected.
impl OptionalFromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Option<Self>, Self::Rejection>> + Send {
        let secret = state.config.secret_key.clone();
        let pool = state.pool.clone();
        let token = bearer_token(parts);

        async move {
            match token {
                Some(token) => authenticate(&token, &secret, &pool).await.map(Some),
                None => Ok(None),
            }
        }
    }
}
