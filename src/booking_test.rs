use super::*;

const HOLD: Duration = Duration::from_secs(600);
const CREATED: i64 = 1_700_000_000_000;

#[test]
fn expires_after_hold_window() {
    let countdown = BookingCountdown::new(CREATED, HOLD);
    assert_eq!(countdown.expires_at_ms(), CREATED + 600_000);
}

#[test]
fn remaining_counts_down() {
    let countdown = BookingCountdown::new(CREATED, HOLD);
    assert_eq!(countdown.remaining(CREATED), HOLD);
    assert_eq!(countdown.remaining(CREATED + 90_000), Duration::from_secs(510));
}

#[test]
fn remaining_saturates_at_zero() {
    let countdown = BookingCountdown::new(CREATED, HOLD);
    assert_eq!(countdown.remaining(CREATED + 600_000), Duration::ZERO);
    assert_eq!(countdown.remaining(CREATED + 3_600_000), Duration::ZERO);
}

#[test]
fn expired_exactly_at_deadline() {
    let countdown = BookingCountdown::new(CREATED, HOLD);
    assert!(!countdown.is_expired(CREATED + 599_999));
    assert!(countdown.is_expired(CREATED + 600_000));
}

#[test]
fn huge_hold_does_not_overflow() {
    let countdown = BookingCountdown::new(CREATED, Duration::from_secs(u64::MAX));
    assert_eq!(countdown.expires_at_ms(), i64::MAX);
    assert!(!countdown.is_expired(CREATED));
}

#[test]
fn view_redirects_only_when_expired() {
    let countdown = BookingCountdown::new(CREATED, HOLD);
    let live = countdown.view(CREATED + 1_000, Some("42"));
    assert!(!live.expired);
    assert_eq!(live.remaining_secs, 599);
    assert!(live.redirect_to.is_none());

    let gone = countdown.view(CREATED + 601_000, Some("42"));
    assert!(gone.expired);
    assert_eq!(gone.remaining_secs, 0);
    assert_eq!(gone.redirect_to.as_deref(), Some("/trips/42"));
}

#[test]
fn redirect_falls_back_to_home() {
    assert_eq!(expiry_redirect(None), "/");
    assert_eq!(expiry_redirect(Some("  ")), "/");
}

#[test]
fn trip_id_read_from_flat_or_nested_payload() {
    let flat: Booking = serde_json::from_str(r#"{"id":1,"createdAt":0,"tripId":7}"#).unwrap();
    assert_eq!(booking_trip_id(&flat).as_deref(), Some("7"));
    let nested: Booking = serde_json::from_str(r#"{"id":1,"createdAt":0,"trip":{"id":"t-9"}}"#).unwrap();
    assert_eq!(booking_trip_id(&nested).as_deref(), Some("t-9"));
    let none: Booking = serde_json::from_str(r#"{"id":1,"createdAt":0}"#).unwrap();
    assert!(booking_trip_id(&none).is_none());
}

#[test]
fn booking_serializes_with_countdown() {
    let booking: Booking = serde_json::from_str(r#"{"id":"b1","createdAt":1000,"tripId":"t1","status":"PENDING"}"#).unwrap();
    let out = BookingWithCountdown::new(booking, HOLD, 1000);
    let json = serde_json::to_value(&out).unwrap();
    assert_eq!(json["id"], "b1");
    assert_eq!(json["status"], "PENDING");
    assert_eq!(json["countdown"]["expiresAt"], 601_000);
    assert_eq!(json["countdown"]["remainingSecs"], 600);
    assert!(json["countdown"].get("redirectTo").is_none());
}
