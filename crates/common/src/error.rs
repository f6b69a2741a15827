use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use thiserror::Error;

/// Field name → message map carried by validation errors.
pub type FieldErrors = serde_json::Map<String, Value>;

/// Why a request could not be authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No `Authorization: Bearer` header was sent.
    Missing,
    /// The token is malformed, forged, or of the wrong kind.
    Invalid,
    /// The token was valid once but has expired.
    Expired,
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthFailure::Missing => write!(f, "missing credentials"),
            AuthFailure::Invalid => write!(f, "invalid token"),
            AuthFailure::Expired => write!(f, "expired token"),
        }
    }
}

/// Common error types used across the application.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(AuthFailure),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0:?}")]
    Validation(FieldErrors),

    #[error("Throttled: retry in {0}s")]
    Throttled(u64),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Validation error for a single field.
    pub fn field(name: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(name.to_string(), Value::String(message.into()));
        AppError::Validation(errors)
    }

    /// `<Model> instance not found.`
    pub fn not_found(model: &str) -> Self {
        AppError::NotFound(format!("{} instance not found.", model))
    }

    fn parts(&self) -> (StatusCode, String, Vec<Value>) {
        match self {
            AppError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                "Invalid data.".to_string(),
                vec![Value::Object(fields.clone())],
            ),
            AppError::Auth(AuthFailure::Expired) => (
                StatusCode::UNAUTHORIZED,
                "Token expire.".to_string(),
                vec![json!({
                    "authentication": "The token is no longer valid.Please login or refresh the token."
                })],
            ),
            AppError::Auth(AuthFailure::Invalid) => (
                StatusCode::UNAUTHORIZED,
                "Unauthorized User".to_string(),
                vec![json!({ "token": "Invalid Token" })],
            ),
            AppError::Auth(AuthFailure::Missing) => (
                StatusCode::UNAUTHORIZED,
                "Unauthorized User".to_string(),
                vec![json!({ "token": "Authentication credentials were not provided." })],
            ),
            AppError::PermissionDenied => (
                StatusCode::FORBIDDEN,
                "Permission Denied.".to_string(),
                vec![json!({
                    "message": ["You do not have permission to perform this action."]
                })],
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), Vec::new()),
            AppError::Throttled(wait) => (
                StatusCode::TOO_MANY_REQUESTS,
                "Request was throttled.".to_string(),
                vec![json!({ "throttle": format!("Expected available in {} seconds.", wait) })],
            ),
            AppError::Database(_)
            | AppError::Redis(_)
            | AppError::Config(_)
            | AppError::Queue(_)
            | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error.".to_string(),
                Vec::new(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, errors) = self.parts();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = json!({
            "message": message,
            "data": {},
            "errors": errors,
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_bad_request() {
        let (status, message, errors) = AppError::field("email", "User already exists.").parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "Invalid data.");
        assert_eq!(errors, vec![json!({"email": "User already exists."})]);
    }

    #[test]
    fn test_not_found_message() {
        let (status, message, errors) = AppError::not_found("User").parts();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(message, "User instance not found.");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_expired_token_is_distinguished() {
        let (status, message, _) = AppError::Auth(AuthFailure::Expired).parts();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(message, "Token expire.");

        let (_, message, errors) = AppError::Auth(AuthFailure::Invalid).parts();
        assert_eq!(message, "Unauthorized User");
        assert_eq!(errors, vec![json!({"token": "Invalid Token"})]);
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let (status, message, errors) =
            AppError::Internal("connection refused to 10.0.0.1".to_string()).parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "Internal Server Error.");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_throttled_reports_wait() {
        let (status, _, errors) = AppError::Throttled(42).parts();
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            errors,
            vec![json!({"throttle": "Expected available in 42 seconds."})]
        );
    }
}
