//! Auth routes: password login, Google OAuth, logout, locale.
//!
//! The backend issues the tokens; the portal keeps them in HttpOnly cookies
//! and forwards the access token as a bearer on every backend call.

use axum::Json;
use axum::extract::{FromRequestParts, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::Rng;
use reqwest::Method;
use serde::Deserialize;
use time::Duration;

use crate::backend::types::{AuthTokens, Profile};
use crate::error::ApiError;
use crate::state::AppState;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";
pub const LOCALE_COOKIE: &str = "locale";
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

pub const SUPPORTED_LOCALES: [&str; 2] = ["vi", "en"];

const ACCESS_MAX_AGE: Duration = Duration::days(1);
const REFRESH_MAX_AGE: Duration = Duration::days(7);
const LOCALE_MAX_AGE: Duration = Duration::days(365);
const OAUTH_STATE_MAX_AGE: Duration = Duration::minutes(10);
const OAUTH_STATE_LEN: usize = 32;

// =============================================================================
// COOKIES
// =============================================================================

/// HttpOnly, `SameSite=Lax`, site-wide cookie.
pub(crate) fn http_only_cookie(name: &'static str, value: String, secure: bool, max_age: Duration) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(max_age)
        .build()
}

/// Expired copy of `name`, which makes the browser drop it.
pub(crate) fn cleared_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    http_only_cookie(name, String::new(), secure, Duration::ZERO)
}

fn with_tokens(jar: CookieJar, tokens: AuthTokens, secure: bool) -> CookieJar {
    let jar = jar.add(http_only_cookie(ACCESS_COOKIE, tokens.access_token, secure, ACCESS_MAX_AGE));
    match tokens.refresh_token {
        Some(refresh) => jar.add(http_only_cookie(REFRESH_COOKIE, refresh, secure, REFRESH_MAX_AGE)),
        None => jar,
    }
}

pub(crate) fn generate_state_token() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(OAUTH_STATE_LEN)
        .map(char::from)
        .collect()
}

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Bearer token from the `access_token` cookie. Use as a handler parameter
/// to require a signed-in caller; the backend validates the token itself.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub token: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar.get(ACCESS_COOKIE).map(Cookie::value).unwrap_or_default();
        if token.is_empty() {
            return Err(ApiError::unauthorized());
        }
        Ok(Self { token: token.to_owned() })
    }
}

/// Same as [`AuthUser`] but optional, for routes that work signed out.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl MaybeAuthUser {
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.0.as_ref().map(|a| a.token.as_str())
    }
}

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(AuthUser::from_request_parts(parts, state).await.ok()))
    }
}

// =============================================================================
// PASSWORD LOGIN
// =============================================================================

#[derive(Debug, Deserialize, serde::Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// `POST /api/auth/login`: exchange credentials for tokens, set cookies,
/// return the profile.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::bad_request("email and password are required"));
    }
    let tokens: AuthTokens = state
        .backend
        .send(Method::POST, "/auth/login", None, &body)
        .await?;
    let profile: Profile = state
        .backend
        .fetch("/users/me", Some(&tokens.access_token))
        .await?;
    tracing::info!(user_id = %profile.id, "auth: login");
    let jar = with_tokens(jar, tokens, state.config.cookie_secure);
    Ok((jar, Json(profile)).into_response())
}

/// `POST /api/auth/register`: pass the registration form through.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let created: serde_json::Value = state
        .backend
        .send(Method::POST, "/auth/register", None, &body)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/auth/me`
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Profile>, ApiError> {
    let profile = state.backend.fetch("/users/me", Some(&auth.token)).await?;
    Ok(Json(profile))
}

/// `POST /api/auth/logout`: best-effort backend logout, then clear cookies.
pub async fn logout(State(state): State<AppState>, auth: MaybeAuthUser) -> impl IntoResponse {
    if let Some(token) = auth.token() {
        let result: Result<serde_json::Value, _> = state
            .backend
            .send(Method::POST, "/auth/logout", Some(token), &serde_json::json!({}))
            .await;
        if let Err(e) = result {
            tracing::debug!(error = %e, "auth: backend logout failed");
        }
    }
    let secure = state.config.cookie_secure;
    let jar = CookieJar::new()
        .add(cleared_cookie(ACCESS_COOKIE, secure))
        .add(cleared_cookie(REFRESH_COOKIE, secure));
    (jar, StatusCode::NO_CONTENT)
}

// =============================================================================
// GOOGLE OAUTH
// =============================================================================

/// Where the OAuth provider sends the browser back to.
pub(crate) fn google_callback_url(state: &AppState) -> String {
    let origin = state
        .config
        .public_url
        .clone()
        .unwrap_or_else(|| format!("http://localhost:{}", state.config.port));
    format!("{}/auth/google/callback", origin.trim_end_matches('/'))
}

/// Authorize URL with `redirect_uri` and `state` appended.
pub(crate) fn google_authorize_url(base: &str, callback: &str, oauth_state: &str) -> Result<String, ApiError> {
    reqwest::Url::parse_with_params(base, &[("redirect_uri", callback), ("state", oauth_state)])
        .map(String::from)
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "E_OAUTH_CONFIG", e.to_string()))
}

fn oauth_disabled() -> ApiError {
    ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "E_OAUTH_DISABLED", "Google sign-in is not configured")
}

/// `GET /auth/google`: set the CSRF state cookie and redirect to the provider.
pub async fn google_redirect(State(state): State<AppState>) -> Result<Response, ApiError> {
    let Some(authorize) = state.config.google_authorize_url.as_deref() else {
        return Err(oauth_disabled());
    };
    let oauth_state = generate_state_token();
    let url = google_authorize_url(authorize, &google_callback_url(&state), &oauth_state)?;
    let cookie = http_only_cookie(OAUTH_STATE_COOKIE, oauth_state, state.config.cookie_secure, OAUTH_STATE_MAX_AGE);
    Ok((CookieJar::new().add(cookie), Redirect::temporary(&url)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// `GET /auth/google/callback`: verify state, exchange the code through the
/// backend, set cookies and redirect home.
pub async fn google_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    if state.config.google_authorize_url.is_none() {
        return Err(oauth_disabled());
    }
    if let Some(error) = params.error {
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "E_OAUTH_DENIED", error));
    }

    let expected = jar
        .get(OAUTH_STATE_COOKIE)
        .map(Cookie::value)
        .unwrap_or_default();
    match params.state.as_deref() {
        Some(got) if !expected.is_empty() && got == expected => {}
        Some(_) => return Err(ApiError::new(StatusCode::UNAUTHORIZED, "E_OAUTH_STATE", "invalid oauth state")),
        None => return Err(ApiError::bad_request("missing oauth state")),
    }
    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return Err(ApiError::bad_request("missing authorization code"));
    };

    let body = serde_json::json!({ "code": code, "redirectUri": google_callback_url(&state) });
    let tokens: AuthTokens = state
        .backend
        .send(Method::POST, "/auth/oauth2/google", None, &body)
        .await?;
    tracing::info!("auth: google sign-in completed");

    let secure = state.config.cookie_secure;
    let jar = with_tokens(jar, tokens, secure).add(cleared_cookie(OAUTH_STATE_COOKIE, secure));
    Ok((jar, Redirect::temporary("/")).into_response())
}

// =============================================================================
// LOCALE
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LocaleRequest {
    pub locale: String,
}

/// Normalized supported locale, or `None`.
#[must_use]
pub fn normalize_locale(raw: &str) -> Option<&'static str> {
    let raw = raw.trim().to_ascii_lowercase();
    SUPPORTED_LOCALES.into_iter().find(|l| *l == raw)
}

/// `POST /api/locale`: remember the UI language. Readable by scripts.
pub async fn set_locale(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LocaleRequest>,
) -> Result<Response, ApiError> {
    let Some(locale) = normalize_locale(&body.locale) else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "E_LOCALE_UNSUPPORTED",
            format!("unsupported locale: {}", body.locale),
        ));
    };
    let cookie = Cookie::build((LOCALE_COOKIE, locale))
        .path("/")
        .same_site(SameSite::Lax)
        .secure(state.config.cookie_secure)
        .max_age(LOCALE_MAX_AGE)
        .build();
    Ok((jar.add(cookie), StatusCode::NO_CONTENT).into_response())
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
