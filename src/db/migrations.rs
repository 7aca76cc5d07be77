use anyhow::Context;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};

/// `.sql` files in `dir`, ordered by file name.
fn migration_files(dir: &Path) -> anyhow::Result<Vec<(String, PathBuf)>> {
    anyhow::ensure!(dir.is_dir(), "migrations directory not found: {}", dir.display());

    let mut files = vec![];
    for entry in fs::read_dir(dir).context("failed to read migrations directory")? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("sql") {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            files.push((name.to_string(), path.clone()));
        }
    }
    files.sort();
    Ok(files)
}

fn is_applied(conn: &Connection, name: &str) -> anyhow::Result<bool> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM _migrations WHERE name = ?1", [name], |row| row.get(0))
        .context("failed to check migration status")?;
    Ok(count > 0)
}

/// Applies every pending migration, each in its own transaction.
pub fn run_migrations(conn: &Connection, migrations_dir: &Path) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .context("failed to create migrations table")?;

    for (name, path) in migration_files(migrations_dir)? {
        if is_applied(conn, &name)? {
            continue;
        }

        let sql = fs::read_to_string(&path).with_context(|| format!("failed to read {name}"))?;

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(&sql)
            .with_context(|| format!("failed to apply migration: {name}"))?;
        tx.execute("INSERT INTO _migrations (name) VALUES (?1)", [&name])?;
        tx.commit()?;

        tracing::info!(migration = %name, "applied migration");
    }

    Ok(())
}
