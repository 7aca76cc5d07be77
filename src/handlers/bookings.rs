use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::errors::{AppError, BookingError};
use crate::handlers::auth::Caller;
use crate::handlers::extract::{ValidJson, ValidQuery};
use crate::models::{Booking, BookingPatch, BookingStatus, NewBooking};
use crate::services::booking::{self, Cancelability};
use crate::services::rate_limit::{self, RateDecision};
use crate::state::AppState;

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Caller(principal): Caller,
    ValidJson(req): ValidJson<NewBooking>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let now = state.local_now();
    let mut db = state.db()?;

    let subject = format!("create_booking:{}", principal.user_id);
    let decision = rate_limit::hit(&db, &subject, state.config.booking_rate_limit_per_hour, now)
        .map_err(|e| AppError::Database(e.to_string()))?;
    if let RateDecision::Limited { limit, .. } = decision {
        return Err(AppError::RateLimited(format!("at most {limit} bookings per hour")));
    }

    let booking = booking::create_booking(&mut db, now, &principal, req)?;
    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /api/bookings
#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    Caller(principal): Caller,
    ValidQuery(query): ValidQuery<ListQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            BookingStatus::parse(raw)
                .ok_or_else(|| BookingError::Validation(format!("unknown status {raw}")))?,
        ),
    };

    let db = state.db()?;
    let bookings = booking::list_bookings(&db, &principal, status, query.limit.unwrap_or(50))?;
    Ok(Json(bookings))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Caller(principal): Caller,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let db = state.db()?;
    Ok(Json(booking::get_booking(&db, &principal, &id)?))
}

// PATCH /api/bookings/:id
pub async fn update_booking(
    State(state): State<Arc<AppState>>,
    Caller(principal): Caller,
    Path(id): Path<String>,
    ValidJson(patch): ValidJson<BookingPatch>,
) -> Result<Json<Booking>, AppError> {
    let now = state.local_now();
    let mut db = state.db()?;
    Ok(Json(booking::update_booking(&mut db, now, &principal, &id, patch)?))
}

// POST /api/bookings/:id/cancel
#[derive(Deserialize, Default)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Caller(principal): Caller,
    Path(id): Path<String>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<Booking>, AppError> {
    let reason = body.and_then(|Json(b)| b.reason).filter(|r| !r.trim().is_empty());
    let now = state.local_now();
    let rules = state.config.booking_rules();

    let db = state.db()?;
    Ok(Json(booking::cancel_booking(&db, now, &rules, &principal, &id, reason)?))
}

// GET /api/bookings/:id/cancelable
pub async fn check_cancelable(
    State(state): State<Arc<AppState>>,
    Caller(principal): Caller,
    Path(id): Path<String>,
) -> Result<Json<Cancelability>, AppError> {
    let now = state.local_now();
    let rules = state.config.booking_rules();

    let db = state.db()?;
    Ok(Json(booking::check_cancelable(&db, now, &rules, &principal, &id)?))
}

// POST /api/bookings/:id/confirm
pub async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    Caller(principal): Caller,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let now = state.local_now();
    let db = state.db()?;
    Ok(Json(booking::confirm_booking_as(&db, now, &principal, &id)?))
}

// POST /api/bookings/:id/complete
pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    Caller(principal): Caller,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let now = state.local_now();
    let db = state.db()?;
    Ok(Json(booking::complete_booking_as(&db, now, &principal, &id)?))
}
