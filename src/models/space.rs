use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::Money;

/// A bookable desk or room. Owned by the space-management side; the booking
/// engine only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Space {
    pub id: String,
    pub manager_id: String,
    pub name: String,
    pub capacity: i64,
    pub price_per_day: Money,
    pub currency: String,
    pub is_active: bool,
    pub deleted_at: Option<NaiveDateTime>,
}

impl Space {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_bookable(&self) -> bool {
        self.is_active && !self.is_deleted()
    }
}
