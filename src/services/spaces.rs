use rusqlite::Connection;

use crate::db::queries;
use crate::errors::BookingError;
use crate::models::Space;

/// Read-only lookup of space capacity, ownership and availability.
pub trait SpaceRegistry {
    fn get_space(&self, id: &str) -> anyhow::Result<Option<Space>>;
}

impl SpaceRegistry for Connection {
    fn get_space(&self, id: &str) -> anyhow::Result<Option<Space>> {
        queries::get_space(self, id)
    }
}

/// Resolves a space, treating soft-deleted rows as absent.
pub fn require_space(registry: &dyn SpaceRegistry, id: &str) -> Result<Space, BookingError> {
    match registry.get_space(id)? {
        Some(space) if !space.is_deleted() => Ok(space),
        _ => Err(BookingError::NotFound(format!("space {id}"))),
    }
}
