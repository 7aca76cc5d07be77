//! Booking lifecycle: creation, updates and status transitions.
//!
//! Checks run in a fixed order and the first failure wins: existence,
//! authorization, state, business rules, conflicts. Writes that can introduce
//! an overlap run inside an immediate transaction, which takes the database
//! write lock before the conflict query; the overlap triggers in the schema
//! back this up for writers that bypass this module.

use chrono::{Duration, NaiveDateTime};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;

use crate::db::queries::{self, BookingScope};
use crate::errors::BookingError;
use crate::models::{
    allows, Action, Booking, BookingPatch, BookingStatus, NewBooking, Principal, Role, Space,
};
use crate::services::conflicts::{describe_conflicts, find_conflicts, validate_window};
use crate::services::pricing::compute_total;
use crate::services::spaces::{require_space, SpaceRegistry};

const MAX_NOTES_LEN: usize = 2000;
const MAX_LIST_LIMIT: i64 = 500;

#[derive(Debug, Clone)]
pub struct BookingRules {
    /// Clients cannot cancel once the booking starts within this span.
    pub cancellation_notice: Duration,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            cancellation_notice: Duration::hours(24),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Cancelability {
    pub cancelable: bool,
    pub reason: Option<String>,
    pub deadline: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    Admin,
    SpaceManager,
    Owner,
    Unrelated,
}

fn relation(conn: &Connection, principal: &Principal, booking: &Booking) -> Result<Relation, BookingError> {
    match principal.role {
        Role::Admin => return Ok(Relation::Admin),
        Role::Manager => {
            let manages = conn
                .get_space(&booking.space_id)?
                .is_some_and(|s| s.manager_id == principal.user_id);
            if manages {
                return Ok(Relation::SpaceManager);
            }
        }
        Role::Client => {}
    }

    if booking.user_id == principal.user_id {
        Ok(Relation::Owner)
    } else {
        Ok(Relation::Unrelated)
    }
}

/// Suspended and banned accounts keep read access only.
fn ensure_capability(principal: &Principal, action: Action) -> Result<(), BookingError> {
    if !principal.is_active() && action != Action::ViewBooking {
        return Err(BookingError::Forbidden(format!(
            "account {} is not active",
            principal.user_id
        )));
    }
    if !allows(principal.role, action) {
        return Err(BookingError::Forbidden(format!(
            "role {} may not perform {action:?}",
            principal.role.as_str()
        )));
    }
    Ok(())
}

fn authorize(
    conn: &Connection,
    principal: &Principal,
    booking: &Booking,
    action: Action,
) -> Result<Relation, BookingError> {
    ensure_capability(principal, action)?;

    let rel = relation(conn, principal, booking)?;
    let permitted = match action {
        Action::ConfirmBooking | Action::CompleteBooking => {
            matches!(rel, Relation::Admin | Relation::SpaceManager)
        }
        _ => rel != Relation::Unrelated,
    };

    if permitted {
        Ok(rel)
    } else {
        Err(BookingError::Forbidden(format!(
            "{} may not access booking {}",
            principal.user_id, booking.id
        )))
    }
}

fn load(conn: &Connection, id: &str) -> Result<Booking, BookingError> {
    queries::get_booking_by_id(conn, id)?
        .ok_or_else(|| BookingError::NotFound(format!("booking {id}")))
}

fn check_notes(notes: Option<&str>) -> Result<(), BookingError> {
    match notes {
        Some(n) if n.chars().count() > MAX_NOTES_LEN => Err(BookingError::Validation(format!(
            "notes exceed {MAX_NOTES_LEN} characters"
        ))),
        _ => Ok(()),
    }
}

fn check_capacity(space: &Space, people_count: i64) -> Result<(), BookingError> {
    if people_count > space.capacity {
        return Err(BookingError::CapacityExceeded {
            requested: people_count,
            capacity: space.capacity,
        });
    }
    Ok(())
}

/// Rebuilds the conflict set after the storage guard rejected a write.
fn conflict_error(conn: &Connection, viewer: Option<&Principal>, booking: &Booking) -> BookingError {
    let conflicts = match find_conflicts(conn, &booking.space_id, &booking.window(), Some(&booking.id)) {
        Ok(conflicts) => conflicts,
        Err(e) => return BookingError::Storage(e),
    };
    let manager_id = match conn.get_space(&booking.space_id) {
        Ok(space) => space.map(|s| s.manager_id),
        Err(e) => return BookingError::Storage(e),
    };
    BookingError::Conflict(describe_conflicts(&conflicts, viewer, manager_id.as_deref()))
}

pub fn create_booking(
    conn: &mut Connection,
    now: NaiveDateTime,
    principal: &Principal,
    req: NewBooking,
) -> Result<Booking, BookingError> {
    if req.people_count < 1 {
        return Err(BookingError::Validation("people_count must be at least 1".to_string()));
    }
    if req.start_time.is_some() != req.end_time.is_some() {
        return Err(BookingError::Validation(
            "start_time and end_time must be given together".to_string(),
        ));
    }
    check_notes(req.notes.as_deref())?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let space = require_space(&*tx, &req.space_id)?;
    ensure_capability(principal, Action::CreateBooking)?;
    if !space.is_bookable() {
        return Err(BookingError::InvalidState(format!(
            "space {} is not accepting bookings",
            space.id
        )));
    }
    check_capacity(&space, req.people_count)?;

    let window = req.window();
    validate_window(&window, Some(now.date()))?;

    let conflicts = find_conflicts(&tx, &space.id, &window, None)?;
    if !conflicts.is_empty() {
        tracing::info!(
            space_id = %space.id,
            conflicts = conflicts.len(),
            "booking request conflicts with existing bookings"
        );
        return Err(BookingError::Conflict(describe_conflicts(
            &conflicts,
            Some(principal),
            Some(&space.manager_id),
        )));
    }

    let total_price = compute_total(&space, window.start_date, window.end_date)?;

    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        space_id: space.id.clone(),
        user_id: principal.user_id.clone(),
        start_date: window.start_date,
        end_date: window.end_date,
        start_time: window.start_time,
        end_time: window.end_time,
        people_count: req.people_count,
        status: BookingStatus::Pending,
        total_price,
        notes: req.notes,
        cancellation_reason: None,
        created_at: now,
        updated_at: now,
    };

    if let Err(err) = queries::insert_booking(&tx, &booking) {
        if queries::is_booking_conflict(&err) {
            return Err(conflict_error(&tx, Some(principal), &booking));
        }
        return Err(err.into());
    }
    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        space_id = %booking.space_id,
        user_id = %booking.user_id,
        total_price = %booking.total_price,
        "booking created"
    );

    Ok(booking)
}

pub fn get_booking(conn: &Connection, principal: &Principal, id: &str) -> Result<Booking, BookingError> {
    let booking = load(conn, id)?;
    authorize(conn, principal, &booking, Action::ViewBooking)?;
    Ok(booking)
}

/// Bookings visible to the principal: everything for admins, bookings on
/// managed spaces for managers, own bookings for clients.
pub fn list_bookings(
    conn: &Connection,
    principal: &Principal,
    status: Option<BookingStatus>,
    limit: i64,
) -> Result<Vec<Booking>, BookingError> {
    ensure_capability(principal, Action::ViewBooking)?;

    let scope = match principal.role {
        _ if allows(principal.role, Action::ViewAllBookings) => BookingScope::All,
        Role::Manager => BookingScope::ManagedBy(principal.user_id.clone()),
        _ => BookingScope::User(principal.user_id.clone()),
    };
    Ok(queries::list_bookings(conn, &scope, status, limit.clamp(1, MAX_LIST_LIMIT))?)
}

/// Applies a patch. Clients may only touch dates, times, people count and
/// notes, and only while the booking is pending; other fields they send are
/// dropped. The price is recomputed whenever the dates change; managers and
/// admins may override it explicitly.
pub fn update_booking(
    conn: &mut Connection,
    now: NaiveDateTime,
    principal: &Principal,
    id: &str,
    patch: BookingPatch,
) -> Result<Booking, BookingError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut booking = load(&tx, id)?;
    let rel = authorize(&tx, principal, &booking, Action::UpdateBooking)?;

    let patch = if rel == Relation::Owner && principal.role == Role::Client {
        patch.client_subset()
    } else {
        patch
    };

    if booking.status.is_terminal() {
        return Err(BookingError::InvalidState(format!(
            "booking {} is {}",
            booking.id, booking.status
        )));
    }
    if principal.role == Role::Client && booking.status != BookingStatus::Pending {
        return Err(BookingError::InvalidState(format!(
            "booking {} can no longer be changed by the client ({})",
            booking.id, booking.status
        )));
    }

    if let Some(count) = patch.people_count {
        if count < 1 {
            return Err(BookingError::Validation("people_count must be at least 1".to_string()));
        }
    }
    if patch.total_price.is_some_and(|p| p.is_negative()) {
        return Err(BookingError::Validation("total_price must not be negative".to_string()));
    }
    check_notes(patch.notes.as_deref())?;

    // Notes-only and price-only patches never need the space.
    let space = if patch.touches_window() || patch.people_count.is_some() {
        Some(require_space(&*tx, &booking.space_id)?)
    } else {
        None
    };

    let old_window = booking.window();
    let new_window = patch.apply_window(old_window);
    if patch.touches_window() {
        validate_window(&new_window, Some(now.date()))?;
    }

    if let Some(space) = &space {
        if let Some(count) = patch.people_count {
            check_capacity(space, count)?;
        }

        if patch.touches_window() {
            let conflicts = find_conflicts(&tx, &space.id, &new_window, Some(&booking.id))?;
            if !conflicts.is_empty() {
                return Err(BookingError::Conflict(describe_conflicts(
                    &conflicts,
                    Some(principal),
                    Some(&space.manager_id),
                )));
            }
        }

        if new_window != old_window {
            booking.total_price = compute_total(space, new_window.start_date, new_window.end_date)?;
        }
    }
    if let Some(price) = patch.total_price {
        booking.total_price = price;
    }

    booking.start_date = new_window.start_date;
    booking.end_date = new_window.end_date;
    booking.start_time = new_window.start_time;
    booking.end_time = new_window.end_time;
    if let Some(count) = patch.people_count {
        booking.people_count = count;
    }
    if let Some(notes) = patch.notes {
        booking.notes = Some(notes);
    }
    booking.updated_at = now;

    if let Err(err) = queries::update_booking(&tx, &booking) {
        if queries::is_booking_conflict(&err) {
            return Err(conflict_error(&tx, Some(principal), &booking));
        }
        return Err(err.into());
    }
    tx.commit()?;

    tracing::info!(booking_id = %booking.id, user_id = %principal.user_id, "booking updated");

    Ok(booking)
}

/// Last instant at which a client may still cancel.
pub fn cancellation_deadline(booking: &Booking, rules: &BookingRules) -> NaiveDateTime {
    booking.starts_at() - rules.cancellation_notice
}

fn cancellation_block(
    now: NaiveDateTime,
    rules: &BookingRules,
    principal: &Principal,
    booking: &Booking,
) -> Option<BookingError> {
    if !booking.status.is_active() {
        return Some(BookingError::InvalidState(format!(
            "booking {} is {}",
            booking.id, booking.status
        )));
    }
    if principal.role == Role::Client && now >= cancellation_deadline(booking, rules) {
        return Some(BookingError::TooLate {
            starts_at: booking.starts_at(),
        });
    }
    None
}

pub fn cancel_booking(
    conn: &Connection,
    now: NaiveDateTime,
    rules: &BookingRules,
    principal: &Principal,
    id: &str,
    reason: Option<String>,
) -> Result<Booking, BookingError> {
    let booking = load(conn, id)?;
    authorize(conn, principal, &booking, Action::CancelBooking)?;

    if let Some(err) = cancellation_block(now, rules, principal, &booking) {
        return Err(err);
    }
    check_notes(reason.as_deref())?;

    let reason = reason.unwrap_or_else(|| format!("cancelled by {}", principal.role.as_str()));
    transition(conn, now, &booking, BookingStatus::Cancelled, Some(&reason))
}

/// Side-effect free pre-flight for [`cancel_booking`]. Lookup and access
/// failures are still errors; state and timing come back as `cancelable: false`.
pub fn check_cancelable(
    conn: &Connection,
    now: NaiveDateTime,
    rules: &BookingRules,
    principal: &Principal,
    id: &str,
) -> Result<Cancelability, BookingError> {
    let booking = load(conn, id)?;
    authorize(conn, principal, &booking, Action::CancelBooking)?;

    let deadline = (principal.role == Role::Client).then(|| cancellation_deadline(&booking, rules));
    Ok(match cancellation_block(now, rules, principal, &booking) {
        None => Cancelability {
            cancelable: true,
            reason: None,
            deadline,
        },
        Some(err) => Cancelability {
            cancelable: false,
            reason: Some(err.to_string()),
            deadline,
        },
    })
}

/// Pending → confirmed. Used by the payment reconciler and by
/// [`confirm_booking_as`].
pub fn confirm_booking(conn: &Connection, now: NaiveDateTime, id: &str) -> Result<Booking, BookingError> {
    let booking = load(conn, id)?;
    transition(conn, now, &booking, BookingStatus::Confirmed, None)
}

pub fn confirm_booking_as(
    conn: &Connection,
    now: NaiveDateTime,
    principal: &Principal,
    id: &str,
) -> Result<Booking, BookingError> {
    let booking = load(conn, id)?;
    authorize(conn, principal, &booking, Action::ConfirmBooking)?;
    transition(conn, now, &booking, BookingStatus::Confirmed, None)
}

/// Confirmed → completed.
pub fn complete_booking(conn: &Connection, now: NaiveDateTime, id: &str) -> Result<Booking, BookingError> {
    let booking = load(conn, id)?;
    transition(conn, now, &booking, BookingStatus::Completed, None)
}

pub fn complete_booking_as(
    conn: &Connection,
    now: NaiveDateTime,
    principal: &Principal,
    id: &str,
) -> Result<Booking, BookingError> {
    let booking = load(conn, id)?;
    authorize(conn, principal, &booking, Action::CompleteBooking)?;
    transition(conn, now, &booking, BookingStatus::Completed, None)
}

fn transition(
    conn: &Connection,
    now: NaiveDateTime,
    booking: &Booking,
    to: BookingStatus,
    reason: Option<&str>,
) -> Result<Booking, BookingError> {
    let from = booking.status;
    if !from.can_transition_to(to) {
        return Err(BookingError::InvalidState(format!(
            "cannot move booking {} from {from} to {to}",
            booking.id
        )));
    }

    let moved = match queries::update_booking_status(conn, &booking.id, from, to, reason, &now) {
        Ok(moved) => moved,
        Err(err) if queries::is_terminal_status_violation(&err) => false,
        Err(err) if queries::is_booking_conflict(&err) => {
            return Err(conflict_error(conn, None, booking));
        }
        Err(err) => return Err(err.into()),
    };

    let current = load(conn, &booking.id)?;
    if !moved {
        return Err(BookingError::InvalidState(format!(
            "booking {} changed concurrently and is now {}",
            booking.id, current.status
        )));
    }

    tracing::info!(booking_id = %booking.id, from = %from, to = %to, "booking status changed");
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{BookingWindow, Money};
    use chrono::{NaiveDate, NaiveTime};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn time(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn now() -> NaiveDateTime {
        dt("2025-03-01 12:00")
    }

    fn client(id: &str) -> Principal {
        Principal::new(id, Role::Client)
    }

    fn manager() -> Principal {
        Principal::new("mgr-1", Role::Manager)
    }

    fn admin() -> Principal {
        Principal::new("root", Role::Admin)
    }

    fn setup_db() -> Connection {
        let conn = db::init_db(":memory:").unwrap();
        queries::upsert_space(
            &conn,
            &Space {
                id: "room-1".to_string(),
                manager_id: "mgr-1".to_string(),
                name: "Meeting room".to_string(),
                capacity: 4,
                price_per_day: Money::from_units(30),
                currency: "EUR".to_string(),
                is_active: true,
                deleted_at: None,
            },
        )
        .unwrap();
        conn
    }

    fn request(start: &str, end: &str, people: i64) -> NewBooking {
        NewBooking {
            space_id: "room-1".to_string(),
            start_date: date(start),
            end_date: date(end),
            start_time: None,
            end_time: None,
            people_count: people,
            notes: None,
        }
    }

    fn timed(start: &str, from: &str, to: &str, people: i64) -> NewBooking {
        NewBooking {
            start_time: Some(time(from)),
            end_time: Some(time(to)),
            ..request(start, start, people)
        }
    }

    #[test]
    fn test_walkthrough_conflict_then_release_on_cancel() {
        let mut conn = setup_db();
        let rules = BookingRules::default();

        let a = create_booking(&mut conn, now(), &client("user1"), request("2025-03-10", "2025-03-10", 2)).unwrap();
        assert_eq!(a.status, BookingStatus::Pending);
        assert_eq!(a.total_price, Money::from_units(30));

        let err = create_booking(&mut conn, now(), &client("user2"), request("2025-03-10", "2025-03-10", 3)).unwrap_err();
        match err {
            BookingError::Conflict(conflicts) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].id, a.id);
            }
            other => panic!("expected conflict, got {other:?}"),
        }

        let cancelled = cancel_booking(&conn, now(), &rules, &client("user1"), &a.id, None).unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert!(cancelled.cancellation_reason.is_some());

        let c = create_booking(&mut conn, now(), &client("user2"), request("2025-03-10", "2025-03-10", 3)).unwrap();
        assert_eq!(c.status, BookingStatus::Pending);
    }

    #[test]
    fn test_create_missing_space() {
        let mut conn = setup_db();
        let mut req = request("2025-03-10", "2025-03-10", 1);
        req.space_id = "ghost".to_string();
        assert!(matches!(
            create_booking(&mut conn, now(), &client("u"), req),
            Err(BookingError::NotFound(_))
        ));
    }

    #[test]
    fn test_create_over_capacity() {
        let mut conn = setup_db();
        let err = create_booking(&mut conn, now(), &client("u"), request("2025-03-10", "2025-03-10", 5)).unwrap_err();
        assert!(matches!(err, BookingError::CapacityExceeded { requested: 5, capacity: 4 }));
    }

    #[test]
    fn test_capacity_checked_before_range() {
        let mut conn = setup_db();
        let err = create_booking(&mut conn, now(), &client("u"), request("2025-02-01", "2025-02-01", 9)).unwrap_err();
        assert!(matches!(err, BookingError::CapacityExceeded { .. }));
    }

    #[test]
    fn test_create_in_past_rejected() {
        let mut conn = setup_db();
        let err = create_booking(&mut conn, now(), &client("u"), request("2025-02-28", "2025-03-02", 1)).unwrap_err();
        assert!(matches!(err, BookingError::InvalidRange(_)));
    }

    #[test]
    fn test_create_today_allowed() {
        let mut conn = setup_db();
        assert!(create_booking(&mut conn, now(), &client("u"), request("2025-03-01", "2025-03-01", 1)).is_ok());
    }

    #[test]
    fn test_create_reversed_times_rejected() {
        let mut conn = setup_db();
        let err = create_booking(&mut conn, now(), &client("u"), timed("2025-03-10", "12:00", "09:00", 1)).unwrap_err();
        assert!(matches!(err, BookingError::InvalidRange(_)));
    }

    #[test]
    fn test_create_zero_people_is_validation_error() {
        let mut conn = setup_db();
        let err = create_booking(&mut conn, now(), &client("u"), request("2025-03-10", "2025-03-10", 0)).unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
    }

    #[test]
    fn test_create_on_inactive_space() {
        let mut conn = setup_db();
        let mut space = queries::get_space(&conn, "room-1").unwrap().unwrap();
        space.is_active = false;
        queries::upsert_space(&conn, &space).unwrap();

        let err = create_booking(&mut conn, now(), &client("u"), request("2025-03-10", "2025-03-10", 1)).unwrap_err();
        assert!(matches!(err, BookingError::InvalidState(_)));
    }

    #[test]
    fn test_suspended_account_cannot_book() {
        let mut conn = setup_db();
        let mut p = client("u");
        p.account_status = crate::models::AccountStatus::Suspended;
        let err = create_booking(&mut conn, now(), &p, request("2025-03-10", "2025-03-10", 1)).unwrap_err();
        assert!(matches!(err, BookingError::Forbidden(_)));
    }

    #[test]
    fn test_disjoint_time_slots_coexist() {
        let mut conn = setup_db();
        create_booking(&mut conn, now(), &client("a"), timed("2025-03-10", "09:00", "11:00", 1)).unwrap();
        create_booking(&mut conn, now(), &client("b"), timed("2025-03-10", "13:00", "15:00", 1)).unwrap();

        let err = create_booking(&mut conn, now(), &client("c"), request("2025-03-10", "2025-03-10", 1)).unwrap_err();
        match err {
            BookingError::Conflict(conflicts) => assert_eq!(conflicts.len(), 2),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_storage_guard_rejects_direct_overlap() {
        let mut conn = setup_db();
        let a = create_booking(&mut conn, now(), &client("a"), request("2025-03-10", "2025-03-12", 1)).unwrap();

        let mut clash = a.clone();
        clash.id = "sneaky".to_string();
        clash.start_date = date("2025-03-12");
        clash.end_date = date("2025-03-12");
        let err = queries::insert_booking(&conn, &clash).unwrap_err();
        assert!(queries::is_booking_conflict(&err));
    }

    #[test]
    fn test_client_update_over_capacity_leaves_booking_unchanged() {
        let mut conn = setup_db();
        let b = create_booking(&mut conn, now(), &client("u"), request("2025-03-10", "2025-03-10", 2)).unwrap();

        let patch = BookingPatch {
            people_count: Some(5),
            ..Default::default()
        };
        let err = update_booking(&mut conn, now(), &client("u"), &b.id, patch).unwrap_err();
        assert!(matches!(err, BookingError::CapacityExceeded { .. }));

        let stored = queries::get_booking_by_id(&conn, &b.id).unwrap().unwrap();
        assert_eq!(stored.people_count, 2);
    }

    #[test]
    fn test_client_update_drops_price_and_recomputes() {
        let mut conn = setup_db();
        let b = create_booking(&mut conn, now(), &client("u"), request("2025-03-10", "2025-03-10", 1)).unwrap();

        let patch = BookingPatch {
            end_date: Some(date("2025-03-12")),
            total_price: Some(Money::from_units(1)),
            notes: Some("window seat".to_string()),
            ..Default::default()
        };
        let updated = update_booking(&mut conn, now(), &client("u"), &b.id, patch).unwrap();
        assert_eq!(updated.total_price, Money::from_units(90));
        assert_eq!(updated.notes.as_deref(), Some("window seat"));
    }

    #[test]
    fn test_manager_price_override() {
        let mut conn = setup_db();
        let b = create_booking(&mut conn, now(), &client("u"), request("2025-03-10", "2025-03-10", 1)).unwrap();

        let patch = BookingPatch {
            total_price: Some(Money::from_units(10)),
            ..Default::default()
        };
        let updated = update_booking(&mut conn, now(), &manager(), &b.id, patch).unwrap();
        assert_eq!(updated.total_price, Money::from_units(10));
    }

    #[test]
    fn test_update_excludes_own_booking_from_conflicts() {
        let mut conn = setup_db();
        let b = create_booking(&mut conn, now(), &client("u"), request("2025-03-10", "2025-03-11", 1)).unwrap();

        let patch = BookingPatch {
            start_date: Some(date("2025-03-11")),
            end_date: Some(date("2025-03-12")),
            ..Default::default()
        };
        let updated = update_booking(&mut conn, now(), &client("u"), &b.id, patch).unwrap();
        assert_eq!(updated.start_date, date("2025-03-11"));
    }

    #[test]
    fn test_update_into_other_booking_conflicts() {
        let mut conn = setup_db();
        create_booking(&mut conn, now(), &client("a"), request("2025-03-10", "2025-03-10", 1)).unwrap();
        let b = create_booking(&mut conn, now(), &client("b"), request("2025-03-11", "2025-03-11", 1)).unwrap();

        let patch = BookingPatch {
            start_date: Some(date("2025-03-10")),
            ..Default::default()
        };
        let err = update_booking(&mut conn, now(), &client("b"), &b.id, patch).unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));
    }

    #[test]
    fn test_conflict_payload_hides_other_clients_details() {
        let mut conn = setup_db();
        let mut first = request("2025-03-10", "2025-03-10", 1);
        first.notes = Some("door code 4471".to_string());
        let a = create_booking(&mut conn, now(), &client("a"), first).unwrap();

        match create_booking(&mut conn, now(), &client("b"), request("2025-03-10", "2025-03-10", 1)) {
            Err(BookingError::Conflict(conflicts)) => {
                assert_eq!(conflicts[0].id, a.id);
                assert!(conflicts[0].notes.is_none());
                assert!(conflicts[0].user_id.is_none());
            }
            other => panic!("expected conflict, got {other:?}"),
        }

        match create_booking(&mut conn, now(), &manager(), request("2025-03-10", "2025-03-10", 1)) {
            Err(BookingError::Conflict(conflicts)) => {
                assert_eq!(conflicts[0].notes.as_deref(), Some("door code 4471"));
                assert_eq!(conflicts[0].user_id.as_deref(), Some("a"));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_update_can_clear_times() {
        let mut conn = setup_db();
        let b = create_booking(&mut conn, now(), &client("u"), timed("2025-03-10", "09:00", "11:00", 1)).unwrap();

        let patch: BookingPatch = serde_json::from_str(r#"{"start_time":null,"end_time":null}"#).unwrap();
        let updated = update_booking(&mut conn, now(), &client("u"), &b.id, patch).unwrap();
        assert!(updated.start_time.is_none());
        assert!(updated.end_time.is_none());

        // All-day now, so the whole day is taken.
        let err = create_booking(&mut conn, now(), &client("v"), timed("2025-03-10", "15:00", "16:00", 1)).unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));
    }

    #[test]
    fn test_notes_update_survives_deleted_space() {
        let mut conn = setup_db();
        let b = create_booking(&mut conn, now(), &client("u"), request("2025-03-10", "2025-03-10", 1)).unwrap();

        let mut space = queries::get_space(&conn, "room-1").unwrap().unwrap();
        space.deleted_at = Some(now());
        queries::upsert_space(&conn, &space).unwrap();

        let notes = BookingPatch {
            notes: Some("late arrival".to_string()),
            ..Default::default()
        };
        let updated = update_booking(&mut conn, now(), &client("u"), &b.id, notes).unwrap();
        assert_eq!(updated.notes.as_deref(), Some("late arrival"));
        assert_eq!(updated.total_price, b.total_price);

        let moved = BookingPatch {
            end_date: Some(date("2025-03-11")),
            ..Default::default()
        };
        assert!(matches!(
            update_booking(&mut conn, now(), &client("u"), &b.id, moved),
            Err(BookingError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_unrelated_fields_skips_past_date_rule() {
        let mut conn = setup_db();
        let b = create_booking(&mut conn, now(), &client("u"), request("2025-03-02", "2025-03-05", 1)).unwrap();

        let later = dt("2025-03-03 09:00");
        let patch = BookingPatch {
            notes: Some("bring projector".to_string()),
            ..Default::default()
        };
        assert!(update_booking(&mut conn, later, &manager(), &b.id, patch).is_ok());
    }

    #[test]
    fn test_client_cannot_update_confirmed() {
        let mut conn = setup_db();
        let b = create_booking(&mut conn, now(), &client("u"), request("2025-03-10", "2025-03-10", 1)).unwrap();
        confirm_booking(&conn, now(), &b.id).unwrap();

        let patch = BookingPatch {
            notes: Some("late change".to_string()),
            ..Default::default()
        };
        let err = update_booking(&mut conn, now(), &client("u"), &b.id, patch).unwrap_err();
        assert!(matches!(err, BookingError::InvalidState(_)));
    }

    #[test]
    fn test_other_client_forbidden() {
        let mut conn = setup_db();
        let b = create_booking(&mut conn, now(), &client("u"), request("2025-03-10", "2025-03-10", 1)).unwrap();

        let err = update_booking(&mut conn, now(), &client("intruder"), &b.id, BookingPatch::default()).unwrap_err();
        assert!(matches!(err, BookingError::Forbidden(_)));
        assert!(matches!(
            get_booking(&conn, &client("intruder"), &b.id),
            Err(BookingError::Forbidden(_))
        ));
    }

    #[test]
    fn test_foreign_manager_forbidden() {
        let mut conn = setup_db();
        let b = create_booking(&mut conn, now(), &client("u"), request("2025-03-10", "2025-03-10", 1)).unwrap();

        let other = Principal::new("mgr-2", Role::Manager);
        assert!(matches!(
            confirm_booking_as(&conn, now(), &other, &b.id),
            Err(BookingError::Forbidden(_))
        ));
        assert!(confirm_booking_as(&conn, now(), &manager(), &b.id).is_ok());
    }

    #[test]
    fn test_client_cannot_confirm_own_booking() {
        let mut conn = setup_db();
        let b = create_booking(&mut conn, now(), &client("u"), request("2025-03-10", "2025-03-10", 1)).unwrap();
        assert!(matches!(
            confirm_booking_as(&conn, now(), &client("u"), &b.id),
            Err(BookingError::Forbidden(_))
        ));
    }

    #[test]
    fn test_client_cancel_inside_notice_is_too_late() {
        let mut conn = setup_db();
        let rules = BookingRules::default();
        let b = create_booking(&mut conn, now(), &client("u"), timed("2025-03-10", "09:00", "10:00", 1)).unwrap();

        // exactly 24h before start
        let at_deadline = dt("2025-03-09 09:00");
        let err = cancel_booking(&conn, at_deadline, &rules, &client("u"), &b.id, None).unwrap_err();
        assert!(matches!(err, BookingError::TooLate { .. }));

        let just_before = dt("2025-03-09 08:59");
        assert!(cancel_booking(&conn, just_before, &rules, &client("u"), &b.id, None).is_ok());
    }

    #[test]
    fn test_all_day_booking_deadline_is_previous_midnight() {
        let mut conn = setup_db();
        let rules = BookingRules::default();
        let b = create_booking(&mut conn, now(), &client("u"), request("2025-03-10", "2025-03-10", 1)).unwrap();

        let err = cancel_booking(&conn, dt("2025-03-09 00:30"), &rules, &client("u"), &b.id, None).unwrap_err();
        assert!(matches!(err, BookingError::TooLate { .. }));
    }

    #[test]
    fn test_manager_and_admin_ignore_notice() {
        let mut conn = setup_db();
        let rules = BookingRules::default();
        let a = create_booking(&mut conn, now(), &client("u"), request("2025-03-10", "2025-03-10", 1)).unwrap();
        let b = create_booking(&mut conn, now(), &client("u"), request("2025-03-11", "2025-03-11", 1)).unwrap();

        let late = dt("2025-03-10 08:00");
        assert!(cancel_booking(&conn, late, &rules, &manager(), &a.id, Some("maintenance".into())).is_ok());
        assert!(cancel_booking(&conn, late, &rules, &admin(), &b.id, None).is_ok());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut conn = setup_db();
        let rules = BookingRules::default();
        let b = create_booking(&mut conn, now(), &client("u"), request("2025-03-10", "2025-03-10", 1)).unwrap();
        cancel_booking(&conn, now(), &rules, &admin(), &b.id, None).unwrap();

        assert!(matches!(confirm_booking(&conn, now(), &b.id), Err(BookingError::InvalidState(_))));
        assert!(matches!(complete_booking(&conn, now(), &b.id), Err(BookingError::InvalidState(_))));
        assert!(matches!(
            cancel_booking(&conn, now(), &rules, &admin(), &b.id, None),
            Err(BookingError::InvalidState(_))
        ));
        assert!(matches!(
            update_booking(&mut conn, now(), &admin(), &b.id, BookingPatch::default()),
            Err(BookingError::InvalidState(_))
        ));

        let stored = queries::get_booking_by_id(&conn, &b.id).unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Cancelled);
    }

    #[test]
    fn test_confirm_then_complete() {
        let mut conn = setup_db();
        let b = create_booking(&mut conn, now(), &client("u"), request("2025-03-10", "2025-03-10", 1)).unwrap();

        assert!(matches!(complete_booking(&conn, now(), &b.id), Err(BookingError::InvalidState(_))));
        assert_eq!(confirm_booking(&conn, now(), &b.id).unwrap().status, BookingStatus::Confirmed);
        assert!(matches!(confirm_booking(&conn, now(), &b.id), Err(BookingError::InvalidState(_))));
        assert_eq!(
            complete_booking_as(&conn, now(), &manager(), &b.id).unwrap().status,
            BookingStatus::Completed
        );
    }

    #[test]
    fn test_storage_guard_blocks_leaving_terminal_state() {
        let mut conn = setup_db();
        let b = create_booking(&mut conn, now(), &client("u"), request("2025-03-10", "2025-03-10", 1)).unwrap();
        confirm_booking(&conn, now(), &b.id).unwrap();
        complete_booking(&conn, now(), &b.id).unwrap();

        let err = conn
            .execute("UPDATE bookings SET status = 'pending' WHERE id = ?1", [&b.id])
            .map_err(anyhow::Error::from)
            .unwrap_err();
        assert!(queries::is_terminal_status_violation(&err));
    }

    #[test]
    fn test_check_cancelable_is_read_only() {
        let mut conn = setup_db();
        let rules = BookingRules::default();
        let b = create_booking(&mut conn, now(), &client("u"), request("2025-03-10", "2025-03-10", 1)).unwrap();

        let early = check_cancelable(&conn, now(), &rules, &client("u"), &b.id).unwrap();
        assert!(early.cancelable);
        assert_eq!(early.deadline, Some(dt("2025-03-09 00:00")));

        let late = check_cancelable(&conn, dt("2025-03-09 12:00"), &rules, &client("u"), &b.id).unwrap();
        assert!(!late.cancelable);

        let stored = queries::get_booking_by_id(&conn, &b.id).unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Pending);
    }

    #[test]
    fn test_list_is_scoped_by_role() {
        let mut conn = setup_db();
        queries::upsert_space(
            &conn,
            &Space {
                id: "room-2".to_string(),
                manager_id: "mgr-2".to_string(),
                name: "Other".to_string(),
                capacity: 2,
                price_per_day: Money::from_units(10),
                currency: "EUR".to_string(),
                is_active: true,
                deleted_at: None,
            },
        )
        .unwrap();

        create_booking(&mut conn, now(), &client("a"), request("2025-03-10", "2025-03-10", 1)).unwrap();
        let mut other = request("2025-03-10", "2025-03-10", 1);
        other.space_id = "room-2".to_string();
        create_booking(&mut conn, now(), &client("b"), other).unwrap();

        assert_eq!(list_bookings(&conn, &client("a"), None, 50).unwrap().len(), 1);
        assert_eq!(list_bookings(&conn, &manager(), None, 50).unwrap().len(), 1);
        assert_eq!(list_bookings(&conn, &admin(), None, 50).unwrap().len(), 2);
        assert!(list_bookings(&conn, &admin(), Some(BookingStatus::Confirmed), 50)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_window_helper_matches_request() {
        let req = timed("2025-03-10", "09:00", "10:00", 1);
        let w: BookingWindow = req.window();
        assert_eq!(w.time_range(), Some((time("09:00"), time("10:00"))));
    }
}
