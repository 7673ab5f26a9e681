//! Trip search, detail, seat map and reviews.
//!
//! DESIGN
//! ======
//! Search parameters are normalized here before they reach the backend:
//! paging is 1-based for browsers and 0-based on the backend, page size is
//! clamped, price ranges and dates are checked, and sort keys come from a
//! closed set. Everything else about a trip is passed through untouched.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::auth::{AuthUser, MaybeAuthUser};
use crate::backend::types::TripSeats;
use crate::error::{ApiError, ErrorCode};
use crate::seats::{self, LayoutSpec, SeatLayout, SeatLayoutError};
use crate::state::AppState;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 50;

const DATE_FORMAT: &[time::format_description::BorrowedFormatItem<'static>] =
    time::macros::format_description!("[year]-[month]-[day]");

// =============================================================================
// QUERY NORMALIZATION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("page must be at least 1")]
    InvalidPage,
    #[error("date must be YYYY-MM-DD, got {0:?}")]
    InvalidDate(String),
    #[error("min_price {min} is greater than max_price {max}")]
    PriceRange { min: u64, max: u64 },
    #[error("unknown sort {0:?}")]
    UnknownSort(String),
}

impl ErrorCode for QueryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidPage => "E_QUERY_PAGE",
            Self::InvalidDate(_) => "E_QUERY_DATE",
            Self::PriceRange { .. } => "E_QUERY_PRICE_RANGE",
            Self::UnknownSort(_) => "E_QUERY_SORT",
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        Self::from_error(StatusCode::BAD_REQUEST, &err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TripSort {
    DepartureAsc,
    DepartureDesc,
    PriceAsc,
    PriceDesc,
    Rating,
}

impl TripSort {
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownSort`] for anything outside the closed set.
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        match raw.trim() {
            "departure_asc" => Ok(Self::DepartureAsc),
            "departure_desc" => Ok(Self::DepartureDesc),
            "price_asc" => Ok(Self::PriceAsc),
            "price_desc" => Ok(Self::PriceDesc),
            "rating" => Ok(Self::Rating),
            other => Err(QueryError::UnknownSort(other.to_owned())),
        }
    }

    /// Backend `sort` parameter, Spring style.
    #[must_use]
    pub fn backend_param(self) -> &'static str {
        match self {
            Self::DepartureAsc => "departureTime,asc",
            Self::DepartureDesc => "departureTime,desc",
            Self::PriceAsc => "price,asc",
            Self::PriceDesc => "price,desc",
            Self::Rating => "rating,desc",
        }
    }
}

/// Raw search parameters as the browser sends them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub date: Option<String>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub operator: Option<String>,
    pub bus_type: Option<String>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

/// Validated search, serialized as the backend query string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripSearch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<&'static str>,
    /// 0-based.
    pub page: u32,
    pub size: u32,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

impl TripQuery {
    /// # Errors
    ///
    /// Returns the first rule the query breaks.
    pub fn normalize(self) -> Result<TripSearch, QueryError> {
        let page = self.page.unwrap_or(DEFAULT_PAGE);
        if page == 0 {
            return Err(QueryError::InvalidPage);
        }
        let size = self
            .size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(QueryError::PriceRange { min, max });
            }
        }

        let date = non_blank(self.date);
        if let Some(date) = &date {
            time::Date::parse(date, DATE_FORMAT).map_err(|_| QueryError::InvalidDate(date.clone()))?;
        }

        let sort = non_blank(self.sort)
            .map(|s| TripSort::parse(&s))
            .transpose()?;

        Ok(TripSearch {
            from: non_blank(self.from),
            to: non_blank(self.to),
            date,
            min_price: self.min_price,
            max_price: self.max_price,
            operator_id: non_blank(self.operator),
            bus_type: non_blank(self.bus_type),
            sort: sort.map(TripSort::backend_param),
            page: page - 1,
            size,
        })
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `GET /api/trips`
pub async fn search(
    State(state): State<AppState>,
    auth: MaybeAuthUser,
    Query(query): Query<TripQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let search = query.normalize()?;
    tracing::debug!(?search, "trips: search");
    let page = state.backend.get("/trips", auth.token(), &search).await?;
    Ok(Json(page))
}

/// `GET /api/trips/{id}`
pub async fn detail(
    State(state): State<AppState>,
    auth: MaybeAuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let trip = state.backend.fetch(&format!("/trips/{id}"), auth.token()).await?;
    Ok(Json(trip))
}

#[derive(Debug, Default, Deserialize)]
pub struct SeatQuery {
    /// Override the aisle position; `0` removes the aisle.
    pub aisle: Option<u32>,
}

impl From<SeatLayoutError> for ApiError {
    fn from(err: SeatLayoutError) -> Self {
        Self::from_error(StatusCode::BAD_GATEWAY, &err)
    }
}

/// Build the seat map for `seats`, applying an optional aisle override.
///
/// # Errors
///
/// Returns an error when the backend inventory cannot form a layout.
pub fn layout_for(seats: &TripSeats, aisle: Option<u32>) -> Result<SeatLayout, SeatLayoutError> {
    let mut plan = LayoutSpec::from_trip(seats);
    if let Some(aisle) = aisle {
        plan = plan.with_aisle_after(Some(aisle));
    }
    seats::generate(&plan, &seats.booked_seats)
}

/// `GET /api/trips/{id}/seats`
pub async fn seat_map(
    State(state): State<AppState>,
    auth: MaybeAuthUser,
    Path(id): Path<String>,
    Query(query): Query<SeatQuery>,
) -> Result<Json<SeatLayout>, ApiError> {
    let inventory: TripSeats = state
        .backend
        .fetch(&format!("/trips/{id}/seats"), auth.token())
        .await?;
    let layout = layout_for(&inventory, query.aisle)?;
    Ok(Json(layout))
}

// =============================================================================
// REVIEWS
// =============================================================================

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReviewRequest {
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ReviewRequest {
    /// # Errors
    ///
    /// Rejects ratings outside 1..=5.
    pub fn validate(&self) -> Result<(), ApiError> {
        if (MIN_RATING..=MAX_RATING).contains(&self.rating) {
            Ok(())
        } else {
            Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "E_REVIEW_RATING",
                format!("rating must be between {MIN_RATING} and {MAX_RATING}"),
            ))
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PageQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

impl PageQuery {
    /// 1-based browser paging to the backend's 0-based paging, size clamped.
    #[must_use]
    pub fn to_backend(&self) -> PageQuery {
        PageQuery {
            page: Some(self.page.unwrap_or(DEFAULT_PAGE).max(1) - 1),
            size: Some(self.size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)),
        }
    }
}

/// `GET /api/trips/{id}/reviews`
pub async fn list_reviews(
    State(state): State<AppState>,
    auth: MaybeAuthUser,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let reviews = state
        .backend
        .get(&format!("/trips/{id}/reviews"), auth.token(), &query.to_backend())
        .await?;
    Ok(Json(reviews))
}

/// `POST /api/trips/{id}/reviews`
pub async fn create_review(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<ReviewRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    body.validate()?;
    let created = state
        .backend
        .send(Method::POST, &format!("/trips/{id}/reviews"), Some(&auth.token), &body)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[cfg(test)]
#[path = "trips_test.rs"]
mod tests;
