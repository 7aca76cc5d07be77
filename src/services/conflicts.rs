use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{Booking, BookingWindow, ConflictingBooking, Principal, Role, Space};

#[derive(Debug, Serialize)]
pub struct ConflictReport {
    pub has_conflicts: bool,
    pub conflicts: Vec<ConflictingBooking>,
}

/// Shapes conflicting bookings for `viewer`. Admins, the manager of the space
/// and the owner of a booking see it in full; everyone else gets the window
/// and status only. `None` viewers always get the redacted form.
pub fn describe_conflicts(
    conflicts: &[Booking],
    viewer: Option<&Principal>,
    manager_id: Option<&str>,
) -> Vec<ConflictingBooking> {
    let privileged = viewer.is_some_and(|v| match v.role {
        Role::Admin => true,
        Role::Manager => manager_id == Some(v.user_id.as_str()),
        Role::Client => false,
    });

    conflicts
        .iter()
        .map(|b| {
            if privileged || viewer.is_some_and(|v| v.user_id == b.user_id) {
                ConflictingBooking::full(b)
            } else {
                ConflictingBooking::redacted(b)
            }
        })
        .collect()
}

/// Two windows overlap when their inclusive date ranges intersect and, if
/// both carry a time-of-day, their time ranges intersect by the same rule.
/// A window without time-of-day blocks the whole day.
pub fn windows_overlap(a: &BookingWindow, b: &BookingWindow) -> bool {
    let dates_intersect = a.start_date <= b.end_date && a.end_date >= b.start_date;
    if !dates_intersect {
        return false;
    }

    match (a.time_range(), b.time_range()) {
        (Some((a_start, a_end)), Some((b_start, b_end))) => a_start <= b_end && a_end >= b_start,
        _ => true,
    }
}

/// Ordering checks on a requested window. `today` is enforced only when given,
/// so updates that leave the dates alone skip the past-date rule.
pub fn validate_window(window: &BookingWindow, today: Option<NaiveDate>) -> Result<(), BookingError> {
    if window.start_time.is_some() != window.end_time.is_some() {
        return Err(BookingError::Validation(
            "start_time and end_time must be given together".to_string(),
        ));
    }
    if window.end_date < window.start_date {
        return Err(BookingError::InvalidRange(format!(
            "end date {} is before start date {}",
            window.end_date, window.start_date
        )));
    }
    if let Some((start, end)) = window.time_range() {
        if end <= start {
            return Err(BookingError::InvalidRange(format!(
                "end time {end} must be after start time {start}"
            )));
        }
    }
    if let Some(today) = today {
        if window.start_date < today {
            return Err(BookingError::InvalidRange(format!(
                "start date {} is in the past",
                window.start_date
            )));
        }
    }
    Ok(())
}

/// Active bookings on `space_id` that overlap `window`, excluding
/// `exclude_id` when given.
pub fn find_conflicts(
    conn: &Connection,
    space_id: &str,
    window: &BookingWindow,
    exclude_id: Option<&str>,
) -> anyhow::Result<Vec<Booking>> {
    let candidates = queries::get_active_bookings_in_range(
        conn,
        space_id,
        &window.start_date,
        &window.end_date,
        exclude_id,
    )?;

    Ok(candidates
        .into_iter()
        .filter(|b| windows_overlap(window, &b.window()))
        .collect())
}

pub fn check_conflicts(
    conn: &Connection,
    viewer: &Principal,
    space: &Space,
    window: &BookingWindow,
    exclude_id: Option<&str>,
) -> Result<ConflictReport, BookingError> {
    validate_window(window, None)?;
    let conflicts = find_conflicts(conn, &space.id, window, exclude_id)?;
    Ok(ConflictReport {
        has_conflicts: !conflicts.is_empty(),
        conflicts: describe_conflicts(&conflicts, Some(viewer), Some(&space.manager_id)),
    })
}
