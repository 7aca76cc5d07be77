use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{FixedOffset, NaiveDateTime};
use rusqlite::Connection;

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::errors::AppError;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub clock: Box<dyn Clock>,
}

impl AppState {
    /// Wall-clock time in the deployment's booking offset.
    pub fn local_now(&self) -> NaiveDateTime {
        let now = self.clock.now();
        match FixedOffset::east_opt(self.config.utc_offset_minutes * 60) {
            Some(offset) => now.with_timezone(&offset).naive_local(),
            None => now.naive_utc(),
        }
    }

    pub fn db(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.db
            .lock()
            .map_err(|_| AppError::Database("database mutex poisoned".to_string()))
    }
}
