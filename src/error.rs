//! API error type and error-code plumbing.
//!
//! DESIGN
//! ======
//! Each module owns a `thiserror` enum. Those enums implement [`ErrorCode`]
//! so route handlers can turn any of them into an [`ApiError`], which renders
//! as `{ "error": ..., "code": ..., "retryable": ... }` with a matching HTTP
//! status. Browsers surface these as transient notifications.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Grepable error code and retry hint carried by every domain error.
pub trait ErrorCode {
    /// Stable, upper-case code such as `E_BACKEND_STATUS`.
    fn error_code(&self) -> &'static str;

    /// Whether repeating the same request may succeed.
    fn retryable(&self) -> bool {
        false
    }
}

/// Error returned by HTTP handlers.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into(), retryable: false }
    }

    /// Build from a domain error with an explicit status.
    pub fn from_error<E>(status: StatusCode, err: &E) -> Self
    where
        E: ErrorCode + std::fmt::Display,
    {
        Self { status, code: err.error_code(), message: err.to_string(), retryable: err.retryable() }
    }

    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "E_UNAUTHORIZED", "authentication required")
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "E_BAD_REQUEST", message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.status, self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, status = %self.status, message = %self.message, "api: request failed");
        } else {
            tracing::debug!(code = self.code, status = %self.status, message = %self.message, "api: request rejected");
        }
        let body = serde_json::json!({
            "error": self.message,
            "code": self.code,
            "retryable": self.retryable,
        });
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
