//! Response envelope shared by every HTTP endpoint.
//!
//! Success bodies look like `{"message": ..., "data": ..., "errors": []}`;
//! error bodies are produced by `AppError::into_response` with the same keys.

use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct Envelope<T> {
    pub message: String,
    pub data: T,
    #[schema(value_type = Vec<Object>)]
    pub errors: Vec<serde_json::Value>,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data,
            errors: Vec::new(),
        }
    }
}

/// Handler return type for enveloped responses.
pub type Reply<T> = (StatusCode, Json<Envelope<T>>);

/// 200 OK with an enveloped body.
pub fn ok<T: Serialize>(message: impl Into<String>, data: T) -> Reply<T> {
    (StatusCode::OK, Json(Envelope::new(message, data)))
}

/// 201 Created with an enveloped body.
pub fn created<T: Serialize>(message: impl Into<String>, data: T) -> Reply<T> {
    (StatusCode::CREATED, Json(Envelope::new(message, data)))
}
