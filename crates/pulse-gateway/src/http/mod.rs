pub mod bulk;
pub mod feedback;
pub mod health;
pub mod history;
pub mod metrics;

use axum::{http::StatusCode, Json};
use pulse_core::PulseError;
use serde::Serialize;

/// Error body shared by every HTTP handler: `{"error": "..."}`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

pub type ErrorResponse = (StatusCode, Json<ApiError>);

pub fn error_response(status: StatusCode, message: impl Into<String>) -> ErrorResponse {
    (
        status,
        Json(ApiError {
            error: message.into(),
        }),
    )
}

/// Map a storage failure to a 500.
pub fn storage_error(e: impl std::fmt::Display) -> ErrorResponse {
    pulse_error(PulseError::Storage(e.to_string()))
}

/// Input errors become 400s; anything else is a 500.
pub fn pulse_error(e: PulseError) -> ErrorResponse {
    let status = match e {
        PulseError::Input(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, e.to_string())
}
