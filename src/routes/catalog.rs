//! Read-only catalog lookups: locations, operators, buses, promotions.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde_json::Value;

use super::auth::MaybeAuthUser;
use super::trips::PageQuery;
use crate::error::ApiError;
use crate::state::AppState;

/// `GET /api/locations`
pub async fn locations(State(state): State<AppState>, auth: MaybeAuthUser) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.backend.fetch("/locations", auth.token()).await?))
}

/// `GET /api/operators`
pub async fn operators(State(state): State<AppState>, auth: MaybeAuthUser) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.backend.fetch("/operators", auth.token()).await?))
}

/// `GET /api/buses/{id}`
pub async fn bus(
    State(state): State<AppState>,
    auth: MaybeAuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.backend.fetch(&format!("/buses/{id}"), auth.token()).await?))
}

/// `GET /api/promotions`
pub async fn promotions(
    State(state): State<AppState>,
    auth: MaybeAuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.backend.get("/promotions", auth.token(), &query.to_backend()).await?))
}

/// Promotion codes are case-insensitive; the backend stores them upper-case.
#[must_use]
pub fn normalize_promo_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_ascii_uppercase();
    (!code.is_empty()).then_some(code)
}

/// `GET /api/promotions/{code}`
pub async fn promotion(
    State(state): State<AppState>,
    auth: MaybeAuthUser,
    Path(code): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let Some(code) = normalize_promo_code(&code) else {
        return Err(ApiError::bad_request("promotion code is empty"));
    };
    Ok(Json(state.backend.fetch(&format!("/promotions/{code}"), auth.token()).await?))
}
