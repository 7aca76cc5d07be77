use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::NaiveDateTime;

use crate::models::ConflictingBooking;

/// Outcome kinds of the booking core. Every lifecycle operation either succeeds
/// or returns exactly one of these.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("capacity exceeded: {requested} people requested, space holds {capacity}")]
    CapacityExceeded { requested: i64, capacity: i64 },

    #[error("conflicts with {} existing booking(s)", .0.len())]
    Conflict(Vec<ConflictingBooking>),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("too late to cancel: booking starts at {starts_at}")]
    TooLate { starts_at: NaiveDateTime },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for BookingError {
    fn from(err: rusqlite::Error) -> Self {
        BookingError::Storage(err.into())
    }
}

impl BookingError {
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::NotFound(_) => "not_found",
            BookingError::Forbidden(_) => "forbidden",
            BookingError::InvalidRange(_) => "invalid_range",
            BookingError::CapacityExceeded { .. } => "capacity_exceeded",
            BookingError::Conflict(_) => "conflict",
            BookingError::InvalidState(_) => "invalid_state",
            BookingError::TooLate { .. } => "too_late",
            BookingError::Validation(_) => "validation_error",
            BookingError::Storage(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::Forbidden(_) => StatusCode::FORBIDDEN,
            BookingError::InvalidRange(_) => StatusCode::BAD_REQUEST,
            BookingError::Validation(_) => StatusCode::BAD_REQUEST,
            BookingError::CapacityExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            BookingError::TooLate { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            BookingError::Conflict(_) => StatusCode::CONFLICT,
            BookingError::InvalidState(_) => StatusCode::CONFLICT,
            BookingError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            BookingError::Conflict(conflicts) => Some(serde_json::json!({ "conflicts": conflicts })),
            BookingError::CapacityExceeded { requested, capacity } => Some(serde_json::json!({
                "requested": requested,
                "capacity": capacity,
            })),
            BookingError::TooLate { starts_at } => Some(serde_json::json!({
                "starts_at": starts_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            })),
            _ => None,
        }
    }

    /// Structured `{kind, message, details?}` body.
    pub fn to_json(&self) -> serde_json::Value {
        let message = match self {
            BookingError::Storage(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        let mut body = serde_json::json!({ "kind": self.kind(), "message": message });
        if let Some(details) = self.details() {
            body["details"] = details;
        }
        body
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("database error: {0}")]
    Database(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("invalid signature")]
    InvalidSignature,
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Booking(BookingError::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Booking(BookingError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::Booking(e) => {
                if let BookingError::Storage(inner) = e {
                    tracing::error!(error = %inner, "storage failure");
                }
                (e.status_code(), e.to_json())
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "database failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "kind": "internal", "message": "internal error" }),
                )
            }
            AppError::Unauthorized(_) => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "kind": "unauthorized", "message": self.to_string() }),
            ),
            AppError::RateLimited(_) => (
                StatusCode::TOO_MANY_REQUESTS,
                serde_json::json!({ "kind": "rate_limited", "message": self.to_string() }),
            ),
            AppError::InvalidSignature => (
                StatusCode::FORBIDDEN,
                serde_json::json!({ "kind": "invalid_signature", "message": self.to_string() }),
            ),
        };

        (status, axum::Json(body)).into_response()
    }
}
