//! API handlers

pub mod contacts;
pub mod drip;
pub mod health;
pub mod messages;
pub mod settings;
pub mod templates;
pub mod webhooks;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use zapflow_core::OutreachError;

/// Error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Rejection type shared by all handlers
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Convert an outreach error into its API shape
pub(crate) fn outreach_error(e: OutreachError) -> ApiError {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorResponse {
            error: e.code().to_string(),
            message: e.to_string(),
        }),
    )
}

/// Convert a store failure into an opaque persistence error
pub(crate) fn db_error(e: sqlx::Error) -> ApiError {
    tracing::error!("Database operation failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "database_error".to_string(),
            message: "Persistence operation failed".to_string(),
        }),
    )
}

/// Build a 404 response
pub(crate) fn not_found(what: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "not_found".to_string(),
            message: format!("{} not found", what),
        }),
    )
}

/// Build a 422 response
pub(crate) fn validation_error(message: impl Into<String>) -> ApiError {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorResponse {
            error: "validation_error".to_string(),
            message: message.into(),
        }),
    )
}

pub(crate) fn default_limit() -> i64 {
    50
}
