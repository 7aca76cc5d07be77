//! Payment registration and provider event reconciliation.
//!
//! Providers deliver events at least once, so every handler here must be safe
//! to replay. A completed payment confirms its booking only while the booking
//! is still pending; replays find the payment already completed and stop.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{allows, Action, BookingStatus, Payment, PaymentStatus, Principal};
use crate::services::booking;
use crate::services::spaces::SpaceRegistry;

/// Provider webhook payload.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderEvent {
    PaymentSucceeded { intent_id: String },
    PaymentFailed { intent_id: String, reason: Option<String> },
    PaymentCanceled { intent_id: String },
}

impl ProviderEvent {
    pub fn intent_id(&self) -> &str {
        match self {
            ProviderEvent::PaymentSucceeded { intent_id }
            | ProviderEvent::PaymentFailed { intent_id, .. }
            | ProviderEvent::PaymentCanceled { intent_id } => intent_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No payment carries this intent id.
    UnknownIntent,
    /// The payment was already in the target state, or already completed.
    AlreadyApplied,
    /// Payment updated; `booking_confirmed` tells whether the booking moved
    /// from pending to confirmed as a result.
    Applied { booking_confirmed: bool },
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPayment {
    pub intent_id: String,
    pub currency: Option<String>,
    pub payment_method: Option<String>,
}

/// Records a pending payment for the booking's current total.
pub fn register_payment(
    conn: &Connection,
    now: NaiveDateTime,
    principal: &Principal,
    booking_id: &str,
    req: NewPayment,
) -> Result<Payment, BookingError> {
    let intent_id = req.intent_id.trim();
    if intent_id.is_empty() {
        return Err(BookingError::Validation("intent_id is required".to_string()));
    }

    let booking = booking::get_booking(conn, principal, booking_id)?;
    if !principal.is_active() || !allows(principal.role, Action::RegisterPayment) {
        return Err(BookingError::Forbidden(format!(
            "{} may not register payments",
            principal.user_id
        )));
    }
    if booking.status != BookingStatus::Pending {
        return Err(BookingError::InvalidState(format!(
            "booking {} is {} and cannot take a payment",
            booking.id, booking.status
        )));
    }
    if queries::get_payment_by_intent(conn, intent_id)?.is_some() {
        return Err(BookingError::Validation(format!(
            "payment intent {intent_id} is already registered"
        )));
    }

    let currency = match req.currency {
        Some(c) => c.to_uppercase(),
        None => conn
            .get_space(&booking.space_id)?
            .map(|s| s.currency)
            .unwrap_or_else(|| "EUR".to_string()),
    };

    let payment = Payment {
        id: uuid::Uuid::new_v4().to_string(),
        booking_id: booking.id.clone(),
        external_intent_id: intent_id.to_string(),
        amount: booking.total_price,
        currency,
        status: PaymentStatus::Pending,
        payment_method: req.payment_method,
        failure_reason: None,
        completed_at: None,
        created_at: now,
        updated_at: now,
    };
    queries::insert_payment(conn, &payment)?;

    tracing::info!(
        booking_id = %payment.booking_id,
        intent_id = %payment.external_intent_id,
        amount = %payment.amount,
        "payment registered"
    );

    Ok(payment)
}

pub fn list_payments(conn: &Connection, principal: &Principal, booking_id: &str) -> Result<Vec<Payment>, BookingError> {
    let booking = booking::get_booking(conn, principal, booking_id)?;
    Ok(queries::list_payments_for_booking(conn, &booking.id)?)
}

/// A booking is paid once any of its payments has completed.
pub fn is_paid(conn: &Connection, booking_id: &str) -> Result<bool, BookingError> {
    if queries::get_booking_by_id(conn, booking_id)?.is_none() {
        return Err(BookingError::NotFound(format!("booking {booking_id}")));
    }
    Ok(queries::has_completed_payment(conn, booking_id)?)
}

/// Applies one provider event. The payment update and the booking
/// confirmation commit together.
pub fn apply_event(conn: &Connection, now: NaiveDateTime, event: &ProviderEvent) -> Result<ReconcileOutcome, BookingError> {
    let tx = conn.unchecked_transaction()?;
    let outcome = apply_in(&tx, now, event)?;
    tx.commit()?;
    Ok(outcome)
}

fn apply_in(conn: &Connection, now: NaiveDateTime, event: &ProviderEvent) -> Result<ReconcileOutcome, BookingError> {
    let Some(payment) = queries::get_payment_by_intent(conn, event.intent_id())? else {
        return Ok(ReconcileOutcome::UnknownIntent);
    };

    match event {
        ProviderEvent::PaymentSucceeded { .. } => {
            if !queries::update_payment_status(conn, &payment.id, PaymentStatus::Completed, None, &now)? {
                return Ok(ReconcileOutcome::AlreadyApplied);
            }

            let booking_confirmed = match queries::get_booking_by_id(conn, &payment.booking_id)? {
                Some(b) if b.status == BookingStatus::Pending => {
                    match booking::confirm_booking(conn, now, &b.id) {
                        Ok(_) => true,
                        // Lost a race with another transition; the payment stays completed.
                        Err(BookingError::InvalidState(msg)) => {
                            tracing::warn!(booking_id = %b.id, reason = %msg, "booking not confirmed after payment");
                            false
                        }
                        Err(e) => return Err(e),
                    }
                }
                Some(b) => {
                    tracing::info!(booking_id = %b.id, status = %b.status, "payment completed for non-pending booking");
                    false
                }
                None => {
                    tracing::warn!(booking_id = %payment.booking_id, "payment references a missing booking");
                    false
                }
            };

            Ok(ReconcileOutcome::Applied { booking_confirmed })
        }
        ProviderEvent::PaymentFailed { reason, .. } => {
            let reason = reason.as_deref().unwrap_or("payment failed");
            let moved = queries::update_payment_status(conn, &payment.id, PaymentStatus::Failed, Some(reason), &now)?;
            Ok(if moved {
                ReconcileOutcome::Applied { booking_confirmed: false }
            } else {
                ReconcileOutcome::AlreadyApplied
            })
        }
        ProviderEvent::PaymentCanceled { .. } => {
            let moved = queries::update_payment_status(conn, &payment.id, PaymentStatus::Canceled, None, &now)?;
            Ok(if moved {
                ReconcileOutcome::Applied { booking_confirmed: false }
            } else {
                ReconcileOutcome::AlreadyApplied
            })
        }
    }
}

/// Webhook entry point. Never fails: the provider only needs an
/// acknowledgement, and errors returned to it would trigger redelivery.
pub fn handle_provider_event(conn: &Connection, now: NaiveDateTime, event: &ProviderEvent) {
    match apply_event(conn, now, event) {
        Ok(ReconcileOutcome::UnknownIntent) => {
            tracing::warn!(intent_id = %event.intent_id(), "provider event for unknown payment intent");
        }
        Ok(ReconcileOutcome::AlreadyApplied) => {
            tracing::info!(intent_id = %event.intent_id(), "provider event already applied");
        }
        Ok(ReconcileOutcome::Applied { booking_confirmed }) => {
            tracing::info!(intent_id = %event.intent_id(), booking_confirmed, "provider event applied");
        }
        Err(e) => {
            tracing::error!(intent_id = %event.intent_id(), error = %e, "failed to reconcile provider event");
        }
    }
}
