use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};

use super::Money;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub space_id: String,
    pub user_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub people_count: i64,
    pub status: BookingStatus,
    pub total_price: Money,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    pub fn window(&self) -> BookingWindow {
        BookingWindow {
            start_date: self.start_date,
            end_date: self.end_date,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }

    /// The instant the booking begins: start date at start time, or midnight.
    pub fn starts_at(&self) -> NaiveDateTime {
        self.window().starts_at()
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.window().ends_at()
    }
}

/// Dates are inclusive on both ends. Time-of-day applies to every day in the
/// range; a window without both times occupies whole days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

impl BookingWindow {
    pub fn time_range(&self) -> Option<(NaiveTime, NaiveTime)> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        self.start_date.and_time(self.start_time.unwrap_or(NaiveTime::MIN))
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        match self.end_time {
            Some(t) => self.end_date.and_time(t),
            None => self
                .end_date
                .succ_opt()
                .map(|d| d.and_time(NaiveTime::MIN))
                .unwrap_or_else(|| self.end_date.and_time(NaiveTime::MIN)),
        }
    }

    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" => Some(BookingStatus::Cancelled),
            "completed" => Some(BookingStatus::Completed),
            _ => None,
        }
    }

    /// Active bookings hold their slot and take part in conflict checks.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Completed)
        )
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Another booking as reported in a conflict. Owner, head count and notes
/// are only present when the viewer may see that booking in full.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConflictingBooking {
    pub id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub status: BookingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub people_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ConflictingBooking {
    pub fn redacted(booking: &Booking) -> Self {
        Self {
            id: booking.id.clone(),
            start_date: booking.start_date,
            end_date: booking.end_date,
            start_time: booking.start_time,
            end_time: booking.end_time,
            status: booking.status,
            user_id: None,
            people_count: None,
            notes: None,
        }
    }

    pub fn full(booking: &Booking) -> Self {
        Self {
            user_id: Some(booking.user_id.clone()),
            people_count: Some(booking.people_count),
            notes: booking.notes.clone(),
            ..Self::redacted(booking)
        }
    }
}

/// Input for a new booking, before pricing and persistence.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub space_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub people_count: i64,
    pub notes: Option<String>,
}

impl NewBooking {
    pub fn window(&self) -> BookingWindow {
        BookingWindow {
            start_date: self.start_date,
            end_date: self.end_date,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`).
fn nullable<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// Partial update. Absent fields are left as they are; `null` times clear
/// the time-of-day and turn the booking into an all-day one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingPatch {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "nullable")]
    pub start_time: Option<Option<NaiveTime>>,
    #[serde(default, deserialize_with = "nullable")]
    pub end_time: Option<Option<NaiveTime>>,
    pub people_count: Option<i64>,
    pub notes: Option<String>,
    pub total_price: Option<Money>,
}

impl BookingPatch {
    /// Keeps only the fields a client may change.
    pub fn client_subset(self) -> Self {
        Self {
            total_price: None,
            ..self
        }
    }

    pub fn touches_window(&self) -> bool {
        self.start_date.is_some()
            || self.end_date.is_some()
            || self.start_time.is_some()
            || self.end_time.is_some()
    }

    pub fn apply_window(&self, current: BookingWindow) -> BookingWindow {
        BookingWindow {
            start_date: self.start_date.unwrap_or(current.start_date),
            end_date: self.end_date.unwrap_or(current.end_date),
            start_time: self.start_time.unwrap_or(current.start_time),
            end_time: self.end_time.unwrap_or(current.end_time),
        }
    }
}
