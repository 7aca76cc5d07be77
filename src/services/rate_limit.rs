use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;

use crate::db::queries;

const WINDOW_FORMAT: &str = "%Y-%m-%d %H:00:00";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { count: i64 },
    Limited { count: i64, limit: i64 },
}

fn hour_window(now: NaiveDateTime) -> String {
    now.format(WINDOW_FORMAT).to_string()
}

/// Counts one request for `subject` in the current hourly window and decides
/// whether it may proceed. The request is counted either way.
pub fn hit(conn: &Connection, subject: &str, limit: i64, now: NaiveDateTime) -> anyhow::Result<RateDecision> {
    let count = queries::increment_request_count(conn, subject, &hour_window(now))?;
    if count > limit {
        tracing::warn!(subject = %subject, count, limit, "rate limit exceeded");
        return Ok(RateDecision::Limited { count, limit });
    }
    Ok(RateDecision::Allowed { count })
}

/// Drops counters for windows that started more than two hours ago.
pub fn cleanup(conn: &Connection, now: NaiveDateTime) -> anyhow::Result<usize> {
    let cutoff = hour_window(now - Duration::hours(2));
    let removed = queries::cleanup_windows_before(conn, &cutoff)?;
    if removed > 0 {
        tracing::debug!(removed, "purged stale rate limit windows");
    }
    Ok(removed)
}
