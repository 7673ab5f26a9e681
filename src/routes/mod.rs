//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The portal is a backend-for-frontend: JSON API routes under `/api` proxy
//! the booking backend, `/auth/google*` drive the browser OAuth redirects, and
//! `/api/chat/ws` bridges browsers to their chat session.

pub mod account;
pub mod auth;
pub mod bookings;
pub mod catalog;
pub mod chat;
pub mod trips;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/auth/google", get(auth::google_redirect))
        .route("/auth/google/callback", get(auth::google_callback))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/locale", post(auth::set_locale))
        .route("/api/trips", get(trips::search))
        .route("/api/trips/{id}", get(trips::detail))
        .route("/api/trips/{id}/seats", get(trips::seat_map))
        .route("/api/trips/{id}/reviews", get(trips::list_reviews).post(trips::create_review))
        .route("/api/locations", get(catalog::locations))
        .route("/api/operators", get(catalog::operators))
        .route("/api/buses/{id}", get(catalog::bus))
        .route("/api/promotions", get(catalog::promotions))
        .route("/api/promotions/{code}", get(catalog::promotion))
        .route("/api/bookings", post(bookings::create))
        .route("/api/bookings/{id}", get(bookings::detail))
        .route("/api/payments/callback", get(bookings::payment_callback))
        .route("/api/profile", get(account::profile).put(account::update_profile))
        .route("/api/profile/password", put(account::change_password))
        .route("/api/contracts", post(account::register_contract))
        .route("/api/chat/ws", get(chat::handle_ws))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
