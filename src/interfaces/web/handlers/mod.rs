pub mod auth;
pub mod health;
pub mod logs;
pub mod mom;
pub mod workflows;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// `{"error": message}` with `status`.
pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}
