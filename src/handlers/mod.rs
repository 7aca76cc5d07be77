pub mod auth;
pub mod bookings;
pub mod calendar;
pub mod extract;
pub mod health;
pub mod payments;
pub mod spaces;
pub mod webhook;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/api/bookings",
            post(bookings::create_booking).get(bookings::list_bookings),
        )
        .route(
            "/api/bookings/:id",
            get(bookings::get_booking).patch(bookings::update_booking),
        )
        .route("/api/bookings/:id/cancel", post(bookings::cancel_booking))
        .route("/api/bookings/:id/cancelable", get(bookings::check_cancelable))
        .route("/api/bookings/:id/confirm", post(bookings::confirm_booking))
        .route("/api/bookings/:id/complete", post(bookings::complete_booking))
        .route(
            "/api/bookings/:id/payments",
            post(payments::register_payment).get(payments::list_payments),
        )
        .route("/api/bookings/:id/paid", get(payments::is_paid))
        .route("/api/spaces/:id/conflicts", get(spaces::check_conflicts))
        .route("/api/spaces/:id/quote", get(spaces::quote))
        .route("/webhook/payments", post(webhook::payment_webhook))
        .route("/calendar/:booking_id", get(calendar::download_ics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
