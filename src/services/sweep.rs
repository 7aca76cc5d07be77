use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::BookingError;
use crate::services::booking;

/// Completes every confirmed booking whose end instant has passed. Returns
/// the ids that were moved.
pub fn complete_elapsed(conn: &Connection, now: NaiveDateTime) -> anyhow::Result<Vec<String>> {
    let candidates = queries::get_confirmed_ending_by(conn, &now.date())?;

    let mut completed = vec![];
    for b in candidates.into_iter().filter(|b| b.ends_at() <= now) {
        match booking::complete_booking(conn, now, &b.id) {
            Ok(_) => completed.push(b.id),
            Err(BookingError::InvalidState(msg)) => {
                tracing::debug!(booking_id = %b.id, reason = %msg, "skipped completion");
            }
            Err(e) => {
                tracing::error!(booking_id = %b.id, error = %e, "failed to complete booking");
            }
        }
    }

    if !completed.is_empty() {
        tracing::info!(count = completed.len(), "completed elapsed bookings");
    }
    Ok(completed)
}
