//! Booking countdown.
//!
//! A new booking is held for a fixed window while the customer pays. The
//! portal only does the arithmetic for the checkout timer; nothing here locks
//! seats on the backend. When the window runs out the browser is sent back to
//! the trip page to pick seats again.

use std::time::Duration;

use serde::Serialize;

use crate::backend::types::Booking;

/// Hold window arithmetic for one booking. Times are milliseconds since epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingCountdown {
    created_at_ms: i64,
    hold: Duration,
}

impl BookingCountdown {
    #[must_use]
    pub fn new(created_at_ms: i64, hold: Duration) -> Self {
        Self { created_at_ms, hold }
    }

    #[must_use]
    pub fn expires_at_ms(&self) -> i64 {
        let hold_ms = i64::try_from(self.hold.as_millis()).unwrap_or(i64::MAX);
        self.created_at_ms.saturating_add(hold_ms)
    }

    /// Time left at `now_ms`, zero once expired.
    #[must_use]
    pub fn remaining(&self, now_ms: i64) -> Duration {
        let left = self.expires_at_ms().saturating_sub(now_ms);
        u64::try_from(left).map_or(Duration::ZERO, Duration::from_millis)
    }

    #[must_use]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms()
    }

    /// Snapshot for the checkout page. `trip_id` is where an expired hold
    /// sends the customer.
    #[must_use]
    pub fn view(&self, now_ms: i64, trip_id: Option<&str>) -> CountdownView {
        let expired = self.is_expired(now_ms);
        CountdownView {
            expires_at: self.expires_at_ms(),
            remaining_secs: self.remaining(now_ms).as_secs(),
            expired,
            redirect_to: expired.then(|| expiry_redirect(trip_id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownView {
    pub expires_at: i64,
    pub remaining_secs: u64,
    pub expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

/// Trip page to return to after a hold expires, or home when unknown.
#[must_use]
pub fn expiry_redirect(trip_id: Option<&str>) -> String {
    match trip_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => format!("/trips/{id}"),
        None => "/".to_owned(),
    }
}

/// Trip id referenced by a booking payload, if any.
#[must_use]
pub fn booking_trip_id(booking: &Booking) -> Option<String> {
    let value = booking
        .extra
        .get("tripId")
        .or_else(|| booking.extra.get("trip").and_then(|trip| trip.get("id")))?;
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Booking payload with its countdown attached under `countdown`.
#[derive(Debug, Clone, Serialize)]
pub struct BookingWithCountdown {
    #[serde(flatten)]
    pub booking: Booking,
    pub countdown: CountdownView,
}

impl BookingWithCountdown {
    #[must_use]
    pub fn new(booking: Booking, hold: Duration, now_ms: i64) -> Self {
        let trip_id = booking_trip_id(&booking);
        let countdown = BookingCountdown::new(booking.created_at, hold).view(now_ms, trip_id.as_deref());
        Self { booking, countdown }
    }
}

#[cfg(test)]
#[path = "booking_test.rs"]
mod tests;
