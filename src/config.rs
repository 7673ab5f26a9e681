//! Portal configuration parsed from environment variables.
//!
//! Required:
//! - `BACKEND_URL`: base URL of the booking backend REST API
//! - `BROKER_URL`: STOMP-over-websocket endpoint for chat
//!
//! Optional:
//! - `PORT`: default 3000
//! - `PUBLIC_URL`: externally visible origin, used to infer cookie security
//! - `COOKIE_SECURE`: overrides the inference above
//! - `BACKEND_REQUEST_TIMEOUT_SECS`: default 30
//! - `BACKEND_CONNECT_TIMEOUT_SECS`: default 10
//! - `CHAT_RECONNECT_DELAY_MS`: default 5000
//! - `BOOKING_HOLD_SECS`: default 600
//! - `OAUTH_GOOGLE_AUTHORIZE_URL`: Google login disabled when absent

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BACKEND_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BACKEND_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CHAT_RECONNECT_DELAY_MS: u64 = 5000;
pub const DEFAULT_BOOKING_HOLD_SECS: u64 = 600;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub backend_url: String,
    pub broker_url: String,
    pub public_url: Option<String>,
    pub cookie_secure: bool,
    pub backend_timeouts: BackendTimeouts,
    pub chat_reconnect_delay: Duration,
    pub booking_hold: Duration,
    pub google_authorize_url: Option<String>,
}

impl AppConfig {
    /// Build typed config from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing or `PORT` is not
    /// a valid port number.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid { key: "PORT", value: raw })?,
            Err(_) => DEFAULT_PORT,
        };

        let backend_url = required("BACKEND_URL")?;
        let broker_url = required("BROKER_URL")?;
        let public_url = std::env::var("PUBLIC_URL").ok().filter(|v| !v.trim().is_empty());
        let cookie_secure = resolve_cookie_secure(env_bool("COOKIE_SECURE"), public_url.as_deref());

        Ok(Self {
            port,
            backend_url: normalize_base_url(&backend_url),
            broker_url,
            public_url,
            cookie_secure,
            backend_timeouts: BackendTimeouts {
                request_secs: env_parse("BACKEND_REQUEST_TIMEOUT_SECS", DEFAULT_BACKEND_REQUEST_TIMEOUT_SECS),
                connect_secs: env_parse("BACKEND_CONNECT_TIMEOUT_SECS", DEFAULT_BACKEND_CONNECT_TIMEOUT_SECS),
            },
            chat_reconnect_delay: Duration::from_millis(env_parse(
                "CHAT_RECONNECT_DELAY_MS",
                DEFAULT_CHAT_RECONNECT_DELAY_MS,
            )),
            booking_hold: Duration::from_secs(env_parse("BOOKING_HOLD_SECS", DEFAULT_BOOKING_HOLD_SECS)),
            google_authorize_url: std::env::var("OAUTH_GOOGLE_AUTHORIZE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| parse_bool(&raw))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Explicit flag wins; otherwise cookies are secure when served over https.
fn resolve_cookie_secure(explicit: Option<bool>, public_url: Option<&str>) -> bool {
    explicit.unwrap_or_else(|| public_url.is_some_and(|url| url.starts_with("https://")))
}

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_owned()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
