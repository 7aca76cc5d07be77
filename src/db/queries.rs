use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{Booking, BookingStatus, Money, Payment, PaymentStatus, Space};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const CONFLICT_MARKER: &str = "booking_conflict";
const TERMINAL_MARKER: &str = "booking_status_terminal";

fn fmt_date(d: &NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

fn fmt_time(t: &NaiveTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

fn fmt_ts(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(s, DATE_FORMAT)?)
}

fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    Ok(NaiveTime::parse_from_str(s, TIME_FORMAT)?)
}

fn parse_ts(s: &str) -> anyhow::Result<NaiveDateTime> {
    Ok(NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)?)
}

fn sqlite_message(err: &anyhow::Error) -> Option<&str> {
    match err.downcast_ref::<rusqlite::Error>() {
        Some(rusqlite::Error::SqliteFailure(_, Some(msg))) => Some(msg.as_str()),
        _ => None,
    }
}

/// True when the storage-level overlap guard rejected a write.
pub fn is_booking_conflict(err: &anyhow::Error) -> bool {
    sqlite_message(err).is_some_and(|m| m.contains(CONFLICT_MARKER))
}

/// True when the storage-level guard rejected a status change out of a
/// terminal state.
pub fn is_terminal_status_violation(err: &anyhow::Error) -> bool {
    sqlite_message(err).is_some_and(|m| m.contains(TERMINAL_MARKER))
}

// ── Spaces ──

const SPACE_COLUMNS: &str =
    "id, manager_id, name, capacity, price_per_day_cents, currency, is_active, deleted_at";

pub fn get_space(conn: &Connection, id: &str) -> anyhow::Result<Option<Space>> {
    let sql = format!("SELECT {SPACE_COLUMNS} FROM spaces WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id], |row| Ok(parse_space_row(row)))
        .optional()?;
    row.transpose()
}

/// Writes a space row. The booking engine never calls this; it is the
/// space-management side's write path and the seeding path for tests.
pub fn upsert_space(conn: &Connection, space: &Space) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO spaces (id, manager_id, name, capacity, price_per_day_cents, currency, is_active, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
           manager_id = excluded.manager_id,
           name = excluded.name,
           capacity = excluded.capacity,
           price_per_day_cents = excluded.price_per_day_cents,
           currency = excluded.currency,
           is_active = excluded.is_active,
           deleted_at = excluded.deleted_at,
           updated_at = datetime('now')",
        params![
            space.id,
            space.manager_id,
            space.name,
            space.capacity,
            space.price_per_day.cents(),
            space.currency,
            space.is_active as i32,
            space.deleted_at.as_ref().map(fmt_ts),
        ],
    )?;
    Ok(())
}

fn parse_space_row(row: &rusqlite::Row) -> anyhow::Result<Space> {
    let deleted_at: Option<String> = row.get(7)?;
    Ok(Space {
        id: row.get(0)?,
        manager_id: row.get(1)?,
        name: row.get(2)?,
        capacity: row.get(3)?,
        price_per_day: Money::from_cents(row.get(4)?),
        currency: row.get(5)?,
        is_active: row.get::<_, i32>(6)? != 0,
        deleted_at: deleted_at.as_deref().map(parse_ts).transpose()?,
    })
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "b.id, b.space_id, b.user_id, b.start_date, b.end_date, b.start_time, b.end_time, \
     b.people_count, b.status, b.total_price_cents, b.notes, b.cancellation_reason, b.created_at, b.updated_at";

/// Which bookings a listing may return.
#[derive(Debug, Clone)]
pub enum BookingScope {
    All,
    User(String),
    ManagedBy(String),
}

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, space_id, user_id, start_date, end_date, start_time, end_time,
                               people_count, status, total_price_cents, notes, cancellation_reason,
                               created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            booking.id,
            booking.space_id,
            booking.user_id,
            fmt_date(&booking.start_date),
            fmt_date(&booking.end_date),
            booking.start_time.as_ref().map(fmt_time),
            booking.end_time.as_ref().map(fmt_time),
            booking.people_count,
            booking.status.as_str(),
            booking.total_price.cents(),
            booking.notes,
            booking.cancellation_reason,
            fmt_ts(&booking.created_at),
            fmt_ts(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings b WHERE b.id = ?1");
    let row = conn
        .query_row(&sql, params![id], |row| Ok(parse_booking_row(row)))
        .optional()?;
    row.transpose()
}

/// Active bookings of a space whose date range intersects `[start, end]`.
/// Time-of-day is not filtered here.
pub fn get_active_bookings_in_range(
    conn: &Connection,
    space_id: &str,
    start: &NaiveDate,
    end: &NaiveDate,
    exclude_id: Option<&str>,
) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings b
         WHERE b.space_id = ?1
           AND b.status IN ('pending', 'confirmed')
           AND b.start_date <= ?3
           AND b.end_date >= ?2
           AND (?4 IS NULL OR b.id != ?4)
         ORDER BY b.start_date ASC, b.start_time ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![space_id, fmt_date(start), fmt_date(end), exclude_id],
        |row| Ok(parse_booking_row(row)),
    )?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Persists the mutable fields of a booking.
pub fn update_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET
           start_date = ?2, end_date = ?3, start_time = ?4, end_time = ?5,
           people_count = ?6, total_price_cents = ?7, notes = ?8, updated_at = ?9
         WHERE id = ?1",
        params![
            booking.id,
            fmt_date(&booking.start_date),
            fmt_date(&booking.end_date),
            booking.start_time.as_ref().map(fmt_time),
            booking.end_time.as_ref().map(fmt_time),
            booking.people_count,
            booking.total_price.cents(),
            booking.notes,
            fmt_ts(&booking.updated_at),
        ],
    )?;
    Ok(count > 0)
}

/// Compare-and-set on status: only rows still in `from` are moved to `to`.
pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    from: BookingStatus,
    to: BookingStatus,
    cancellation_reason: Option<&str>,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings
         SET status = ?1,
             cancellation_reason = COALESCE(?2, cancellation_reason),
             updated_at = ?3
         WHERE id = ?4 AND status = ?5",
        params![to.as_str(), cancellation_reason, fmt_ts(now), id, from.as_str()],
    )?;
    Ok(count > 0)
}

pub fn list_bookings(
    conn: &Connection,
    scope: &BookingScope,
    status_filter: Option<BookingStatus>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let (scope_clause, scope_param): (&str, Option<&str>) = match scope {
        BookingScope::All => ("1 = 1", None),
        BookingScope::User(user_id) => ("b.user_id = ?1", Some(user_id.as_str())),
        BookingScope::ManagedBy(manager_id) => (
            "b.space_id IN (SELECT s.id FROM spaces s WHERE s.manager_id = ?1)",
            Some(manager_id.as_str()),
        ),
    };

    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings b
         WHERE (?1 IS NULL OR {scope_clause})
           AND (?2 IS NULL OR b.status = ?2)
         ORDER BY b.start_date DESC, b.start_time DESC
         LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![scope_param, status_filter.map(|s| s.as_str()), limit],
        |row| Ok(parse_booking_row(row)),
    )?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Confirmed bookings whose last day is on or before `date`.
pub fn get_confirmed_ending_by(conn: &Connection, date: &NaiveDate) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings b
         WHERE b.status = 'confirmed' AND b.end_date <= ?1
         ORDER BY b.end_date ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![fmt_date(date)], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let start_date: String = row.get(3)?;
    let end_date: String = row.get(4)?;
    let start_time: Option<String> = row.get(5)?;
    let end_time: Option<String> = row.get(6)?;
    let status_str: String = row.get(8)?;
    let created_at: String = row.get(12)?;
    let updated_at: String = row.get(13)?;

    let status = BookingStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("unknown booking status: {status_str}"))?;

    Ok(Booking {
        id: row.get(0)?,
        space_id: row.get(1)?,
        user_id: row.get(2)?,
        start_date: parse_date(&start_date)?,
        end_date: parse_date(&end_date)?,
        start_time: start_time.as_deref().map(parse_time).transpose()?,
        end_time: end_time.as_deref().map(parse_time).transpose()?,
        people_count: row.get(7)?,
        status,
        total_price: Money::from_cents(row.get(9)?),
        notes: row.get(10)?,
        cancellation_reason: row.get(11)?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

// ── Payments ──

const PAYMENT_COLUMNS: &str = "id, booking_id, external_intent_id, amount_cents, currency, status, \
     payment_method, failure_reason, completed_at, created_at, updated_at";

pub fn insert_payment(conn: &Connection, payment: &Payment) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO payments (id, booking_id, external_intent_id, amount_cents, currency, status,
                               payment_method, failure_reason, completed_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            payment.id,
            payment.booking_id,
            payment.external_intent_id,
            payment.amount.cents(),
            payment.currency,
            payment.status.as_str(),
            payment.payment_method,
            payment.failure_reason,
            payment.completed_at.as_ref().map(fmt_ts),
            fmt_ts(&payment.created_at),
            fmt_ts(&payment.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_payment_by_intent(conn: &Connection, intent_id: &str) -> anyhow::Result<Option<Payment>> {
    let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE external_intent_id = ?1");
    let row = conn
        .query_row(&sql, params![intent_id], |row| Ok(parse_payment_row(row)))
        .optional()?;
    row.transpose()
}

pub fn list_payments_for_booking(conn: &Connection, booking_id: &str) -> anyhow::Result<Vec<Payment>> {
    let sql = format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments
         WHERE booking_id = ?1
         ORDER BY created_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![booking_id], |row| Ok(parse_payment_row(row)))?;

    let mut payments = vec![];
    for row in rows {
        payments.push(row??);
    }
    Ok(payments)
}

/// Moves a payment out of `pending`/`failed` into `to`. Returns false when the
/// row was already in a state the update does not apply to.
pub fn update_payment_status(
    conn: &Connection,
    id: &str,
    to: PaymentStatus,
    failure_reason: Option<&str>,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let completed_at = (to == PaymentStatus::Completed).then(|| fmt_ts(now));
    let count = conn.execute(
        "UPDATE payments
         SET status = ?1,
             failure_reason = ?2,
             completed_at = COALESCE(?3, completed_at),
             updated_at = ?4
         WHERE id = ?5 AND status NOT IN ('completed', ?1)",
        params![to.as_str(), failure_reason, completed_at, fmt_ts(now), id],
    )?;
    Ok(count > 0)
}

pub fn has_completed_payment(conn: &Connection, booking_id: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM payments
         WHERE booking_id = ?1 AND status = 'completed'",
        params![booking_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn parse_payment_row(row: &rusqlite::Row) -> anyhow::Result<Payment> {
    let status_str: String = row.get(5)?;
    let completed_at: Option<String> = row.get(8)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    let status = PaymentStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("unknown payment status: {status_str}"))?;

    Ok(Payment {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        external_intent_id: row.get(2)?,
        amount: Money::from_cents(row.get(3)?),
        currency: row.get(4)?,
        status,
        payment_method: row.get(6)?,
        failure_reason: row.get(7)?,
        completed_at: completed_at.as_deref().map(parse_ts).transpose()?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

// ── Rate Limits ──

pub fn increment_request_count(conn: &Connection, subject: &str, window_start: &str) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO rate_limits (subject, request_count, window_start)
         VALUES (?1, 1, ?2)
         ON CONFLICT(subject, window_start) DO UPDATE SET request_count = request_count + 1",
        params![subject, window_start],
    )?;

    let count: i64 = conn.query_row(
        "SELECT request_count FROM rate_limits WHERE subject = ?1 AND window_start = ?2",
        params![subject, window_start],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn cleanup_windows_before(conn: &Connection, cutoff: &str) -> anyhow::Result<usize> {
    let count = conn.execute(
        "DELETE FROM rate_limits WHERE window_start < ?1",
        params![cutoff],
    )?;
    Ok(count)
}
