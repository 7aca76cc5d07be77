use chrono::NaiveDate;

use crate::errors::BookingError;
use crate::models::{Money, Space};
use crate::services::spaces::{require_space, SpaceRegistry};

/// Daily rate times the number of calendar days, both ends inclusive.
///
/// Time-of-day does not change the price: a two-hour booking costs a full
/// day's rate.
pub fn compute_total(space: &Space, start: NaiveDate, end: NaiveDate) -> Result<Money, BookingError> {
    if end < start {
        return Err(BookingError::InvalidRange(format!(
            "end date {end} is before start date {start}"
        )));
    }
    if space.price_per_day.is_negative() {
        return Err(BookingError::Validation(format!(
            "space {} has a negative daily rate",
            space.id
        )));
    }

    let days = (end - start).num_days() + 1;
    space
        .price_per_day
        .checked_mul(days)
        .ok_or_else(|| BookingError::Validation("total price overflows".to_string()))
}

/// Looks the space up and prices the range.
pub fn quote(
    registry: &dyn SpaceRegistry,
    space_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Money, BookingError> {
    let space = require_space(registry, space_id)?;
    compute_total(&space, start, end)
}
