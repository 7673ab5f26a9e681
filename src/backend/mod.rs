//! Booking backend client.
//!
//! DESIGN
//! ======
//! The portal owns no data. Every domain read or write is a JSON call to the
//! booking backend, authenticated with the caller's bearer token when one is
//! present. `BackendClient` wraps a single pooled `reqwest::Client` with the
//! configured timeouts; typed helpers live next to the routes that use them.

pub mod types;

use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::chat::api::ChatApi;
use crate::chat::message::{ChatMessage, RoomId};
use crate::config::BackendTimeouts;
use types::RoomInfo;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Request(String),

    #[error("backend request timed out")]
    Timeout,

    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("backend response parse failed: {0}")]
    Parse(String),

    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl BackendError {
    /// HTTP status the portal should answer with for this failure.
    #[must_use]
    pub fn http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::Status { status: 400 | 422, .. } => StatusCode::BAD_REQUEST,
            Self::Status { status: 401, .. } => StatusCode::UNAUTHORIZED,
            Self::Status { status: 403, .. } => StatusCode::FORBIDDEN,
            Self::Status { status: 404, .. } => StatusCode::NOT_FOUND,
            Self::Status { status: 409, .. } => StatusCode::CONFLICT,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl crate::error::ErrorCode for BackendError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Request(_) => "E_BACKEND_REQUEST",
            Self::Timeout => "E_BACKEND_TIMEOUT",
            Self::Status { .. } => "E_BACKEND_STATUS",
            Self::Parse(_) => "E_BACKEND_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Timeout | Self::Status { status: 429 | 500..=599, .. })
    }
}

impl From<BackendError> for crate::error::ApiError {
    fn from(err: BackendError) -> Self {
        Self::from_error(err.http_status(), &err)
    }
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, timeouts: BackendTimeouts) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| BackendError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `GET path` and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Transport failure, non-2xx status, or undecodable body.
    pub async fn fetch<T>(&self, path: &str, token: Option<&str>) -> Result<T, BackendError>
    where
        T: DeserializeOwned,
    {
        let req = self.http.get(self.url(path));
        self.execute(req, token).await
    }

    /// `GET path?query` and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Transport failure, non-2xx status, or undecodable body.
    pub async fn get<T, Q>(&self, path: &str, token: Option<&str>, query: &Q) -> Result<T, BackendError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let req = self.http.get(self.url(path)).query(query);
        self.execute(req, token).await
    }

    /// Send a JSON body with `method` and decode the JSON reply.
    ///
    /// # Errors
    ///
    /// Transport failure, non-2xx status, or undecodable body.
    pub async fn send<T, B>(&self, method: Method, path: &str, token: Option<&str>, body: &B) -> Result<T, BackendError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let req = self.http.request(method, self.url(path)).json(body);
        self.execute(req, token).await
    }

    async fn execute<T>(&self, mut req: reqwest::RequestBuilder, token: Option<&str>) -> Result<T, BackendError>
    where
        T: DeserializeOwned,
    {
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let response = req.send().await.map_err(request_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(request_error)?;

        if !(200..300).contains(&status) {
            tracing::warn!(status, "backend: non-success response");
            return Err(BackendError::Status { status, message: error_message(&text) });
        }
        decode_body(&text)
    }
}

fn request_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() { BackendError::Timeout } else { BackendError::Request(err.to_string()) }
}

/// Decode a success body. An empty body decodes as JSON `null`.
fn decode_body<T: DeserializeOwned>(text: &str) -> Result<T, BackendError> {
    let text = if text.trim().is_empty() { "null" } else { text };
    serde_json::from_str(text).map_err(|e| BackendError::Parse(e.to_string()))
}

/// Pull a human-readable message out of a backend error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

// =============================================================================
// CHAT API
// =============================================================================

#[async_trait::async_trait]
impl ChatApi for BackendClient {
    async fn create_room(&self, token: &str) -> Result<RoomId, BackendError> {
        let info: RoomInfo = self
            .send(Method::POST, "/chat/rooms", Some(token), &serde_json::json!({}))
            .await?;
        RoomId::parse(&info.room_id).ok_or_else(|| BackendError::Parse("backend returned an empty room id".into()))
    }

    async fn history(&self, token: &str, room: &RoomId) -> Result<Vec<ChatMessage>, BackendError> {
        let path = format!("/chat/rooms/{room}/messages");
        self.fetch(&path, Some(token)).await
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
