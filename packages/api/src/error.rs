// ABOUTME: HTTP error type for sandbox endpoints with structured JSON bodies
// ABOUTME: Maps session errors to status codes and stable machine-readable codes

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sparkbox_sessions::SessionError;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

/// Error type returned by every handler
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Structured error response format for API consistency
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: ErrorDetail,
    request_id: String,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl AppError {
    fn to_status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::Session(e) if e.is_client_error() => (StatusCode::BAD_REQUEST, e.code()),
            AppError::Session(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.code()),
        }
    }

    /// Message safe to hand back to callers
    fn to_user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => format!("Validation failed: {}", msg),
            AppError::Session(SessionError::InvalidRequest(msg)) => msg.clone(),
            AppError::Session(SessionError::Configuration(_)) => {
                "Server configuration error".to_string()
            }
            AppError::Session(SessionError::Unexpected { message, .. }) => message.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();
        let (status_code, error_code) = self.to_status_and_code();
        let user_message = self.to_user_message();

        if status_code.is_server_error() {
            error!(
                request_id = %request_id,
                error = %self,
                "Sandbox request failed"
            );
        } else {
            info!(
                request_id = %request_id,
                error_code = error_code,
                "Sandbox request rejected"
            );
        }

        let body = ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: error_code.to_string(),
                message: user_message,
            },
            request_id,
        };

        (status_code, Json(body)).into_response()
    }
}
