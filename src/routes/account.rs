//! Profile, password and operator contract routes. All require sign-in
//! except contract registration, which operators submit before they have an
//! account.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::auth::{AuthUser, MaybeAuthUser};
use crate::backend::types::Profile;
use crate::error::ApiError;
use crate::state::AppState;

pub const MIN_PASSWORD_LEN: usize = 8;

/// `GET /api/profile`
pub async fn profile(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Profile>, ApiError> {
    Ok(Json(state.backend.fetch("/users/me", Some(&auth.token)).await?))
}

/// `PUT /api/profile`
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<Value>,
) -> Result<Json<Profile>, ApiError> {
    if !body.is_object() {
        return Err(ApiError::bad_request("profile update must be a JSON object"));
    }
    let updated = state
        .backend
        .send(Method::PUT, "/users/me", Some(&auth.token), &body)
        .await?;
    Ok(Json(updated))
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

impl PasswordChange {
    /// # Errors
    ///
    /// Rejects short passwords and no-op changes.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "E_PASSWORD_TOO_SHORT",
                format!("new password must be at least {MIN_PASSWORD_LEN} characters"),
            ));
        }
        if self.new_password == self.current_password {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "E_PASSWORD_UNCHANGED",
                "new password must differ from the current one",
            ));
        }
        Ok(())
    }
}

/// `PUT /api/profile/password`
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<PasswordChange>,
) -> Result<StatusCode, ApiError> {
    body.validate()?;
    let _: Value = state
        .backend
        .send(Method::PUT, "/users/me/password", Some(&auth.token), &body)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/contracts`: operator partnership registration.
pub async fn register_contract(
    State(state): State<AppState>,
    auth: MaybeAuthUser,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let created = state
        .backend
        .send(Method::POST, "/contracts", auth.token(), &body)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}
