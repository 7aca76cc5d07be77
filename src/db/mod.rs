pub mod migrations;
pub mod queries;

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use rusqlite::Connection;

const MIGRATIONS_DIR: &str = "migrations";

pub fn init_db(path: &str) -> anyhow::Result<Connection> {
    let conn = open(path)?;
    migrations::run_migrations(&conn, Path::new(MIGRATIONS_DIR))?;
    Ok(conn)
}

/// Opens a connection without touching the schema. Used for additional
/// connections to a database another connection already migrated.
pub fn open(path: &str) -> anyhow::Result<Connection> {
    let conn = Connection::open(path).context("failed to open database")?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .context("failed to set database pragmas")?;
    conn.busy_timeout(Duration::from_secs(5))
        .context("failed to set busy timeout")?;

    Ok(conn)
}
