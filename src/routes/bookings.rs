//! Bookings and the payment gateway return.
//!
//! LIFECYCLE
//! =========
//! 1. `POST /api/bookings` creates a pending booking; the response carries the
//!    hold countdown
//! 2. The browser polls `GET /api/bookings/{id}` while paying
//! 3. The gateway redirects to `/api/payments/callback?...`; the query is
//!    forwarded verbatim to the backend for signature checks, then the
//!    browser lands on `/booking/result`

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Redirect;
use reqwest::Method;
use serde_json::Value;

use super::auth::{AuthUser, MaybeAuthUser};
use crate::backend::types::{Booking, PaymentVerification};
use crate::booking::BookingWithCountdown;
use crate::chat::message::now_ms;
use crate::error::ApiError;
use crate::state::AppState;

pub const RESULT_PATH: &str = "/booking/result";

/// `POST /api/bookings`
pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<BookingWithCountdown>), ApiError> {
    let booking: Booking = state
        .backend
        .send(Method::POST, "/bookings", Some(&auth.token), &body)
        .await?;
    tracing::info!(booking_id = %booking.id, "bookings: created");
    let view = BookingWithCountdown::new(booking, state.config.booking_hold, now_ms());
    Ok((StatusCode::CREATED, Json(view)))
}

/// `GET /api/bookings/{id}`
pub async fn detail(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<BookingWithCountdown>, ApiError> {
    let booking: Booking = state
        .backend
        .fetch(&format!("/bookings/{id}"), Some(&auth.token))
        .await?;
    Ok(Json(BookingWithCountdown::new(booking, state.config.booking_hold, now_ms())))
}

// =============================================================================
// PAYMENT CALLBACK
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Success,
    Failed,
    Error,
}

impl PaymentOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }
}

/// Result page URL for `outcome`, with the booking id when known.
#[must_use]
pub fn result_location(outcome: PaymentOutcome, booking_id: Option<&str>) -> String {
    let mut query = format!("status={}", outcome.as_str());
    if let Some(id) = booking_id.filter(|id| !id.is_empty()) {
        let encoded: String = reqwest::Url::parse_with_params("http://result.invalid/", &[("bookingId", id)])
            .ok()
            .and_then(|url| url.query().map(str::to_owned))
            .unwrap_or_default();
        if !encoded.is_empty() {
            query.push('&');
            query.push_str(&encoded);
        }
    }
    format!("{RESULT_PATH}?{query}")
}

/// `GET /api/payments/callback`: verify with the backend, then redirect.
///
/// Never answers with an error page; every failure lands on the result page
/// with `status=error`.
pub async fn payment_callback(
    State(state): State<AppState>,
    auth: MaybeAuthUser,
    Query(params): Query<BTreeMap<String, String>>,
) -> Redirect {
    let verification: Result<PaymentVerification, _> = state
        .backend
        .get("/payments/verify", auth.token(), &params)
        .await;
    let location = match verification {
        Ok(v) => {
            let outcome = if v.success { PaymentOutcome::Success } else { PaymentOutcome::Failed };
            tracing::info!(
                booking_id = v.booking_id.as_deref().unwrap_or("-"),
                outcome = outcome.as_str(),
                message = v.message.as_deref().unwrap_or(""),
                "payments: callback verified"
            );
            result_location(outcome, v.booking_id.as_deref())
        }
        Err(e) => {
            tracing::warn!(error = %e, "payments: verification failed");
            result_location(PaymentOutcome::Error, None)
        }
    };
    Redirect::to(&location)
}

#[cfg(test)]
#[path = "bookings_test.rs"]
mod tests;
