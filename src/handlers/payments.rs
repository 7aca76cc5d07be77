use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::errors::AppError;
use crate::handlers::auth::Caller;
use crate::handlers::extract::ValidJson;
use crate::models::Payment;
use crate::services::booking;
use crate::services::payments::{self, NewPayment};
use crate::state::AppState;

// POST /api/bookings/:id/payments
pub async fn register_payment(
    State(state): State<Arc<AppState>>,
    Caller(principal): Caller,
    Path(booking_id): Path<String>,
    ValidJson(req): ValidJson<NewPayment>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    let now = state.local_now();
    let db = state.db()?;
    let payment = payments::register_payment(&db, now, &principal, &booking_id, req)?;
    Ok((StatusCode::CREATED, Json(payment)))
}

// GET /api/bookings/:id/payments
pub async fn list_payments(
    State(state): State<Arc<AppState>>,
    Caller(principal): Caller,
    Path(booking_id): Path<String>,
) -> Result<Json<Vec<Payment>>, AppError> {
    let db = state.db()?;
    Ok(Json(payments::list_payments(&db, &principal, &booking_id)?))
}

// GET /api/bookings/:id/paid
#[derive(Serialize)]
pub struct PaidResponse {
    booking_id: String,
    paid: bool,
}

pub async fn is_paid(
    State(state): State<Arc<AppState>>,
    Caller(principal): Caller,
    Path(booking_id): Path<String>,
) -> Result<Json<PaidResponse>, AppError> {
    let db = state.db()?;
    booking::get_booking(&db, &principal, &booking_id)?;
    let paid = payments::is_paid(&db, &booking_id)?;
    Ok(Json(PaidResponse { booking_id, paid }))
}
