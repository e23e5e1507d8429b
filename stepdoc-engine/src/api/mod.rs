//! HTTP API for the step document engine
//!
//! Handlers are thin views over the `StepController`; every error is caught
//! here and surfaced as a single JSON message with a mapped status. Nothing
//! propagates uncaught to the caller.

pub mod health;
pub mod projects;
pub mod sse;
pub mod steps;

pub use health::health_routes;
pub use projects::{create_project, get_project};
pub use sse::event_stream;
pub use steps::{get_reference, get_step, save_step, submit_step, withdraw_step};

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use stepdoc_common::Error;
use tracing::error;

/// Error surface of the HTTP API: one message, one status
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let (status, message) = match &err {
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::Permission(_) => (
                StatusCode::FORBIDDEN,
                "You do not have access to this project".to_string(),
            ),
            Error::InsufficientCredit { .. } => (
                StatusCode::PAYMENT_REQUIRED,
                "Not enough credits to save this step".to_string(),
            ),
            Error::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Internal(_) => {
                // Details go to the log; the caller gets one transient message
                error!("Request failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong, please try again".to_string(),
                )
            }
        };

        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

/// Caller identity from the `X-User-Id` header
///
/// Identity issuance and role checks belong to the external identity
/// provider; the engine only consumes the id for membership checks.
pub fn user_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(ApiError {
            status: StatusCode::BAD_REQUEST,
            message: "missing X-User-Id header".to_string(),
        })
}
