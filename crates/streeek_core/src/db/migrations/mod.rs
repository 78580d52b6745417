//! SQLite migration registry and executor.
//!
//! # Invariants
//! - `version` values are strictly increasing.
//! - Pending migrations are applied in one transaction and mirrored to
//!   `PRAGMA user_version`.

use crate::db::{DbError, DbResult, SchemaMismatch};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("0001_reminders.sql"),
}];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let latest = latest_version();

    if current_version > latest {
        return Err(DbError::Schema(SchemaMismatch {
            found: current_version,
            expected: latest,
        }));
    }
    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS
        .iter()
        .filter(|migration| migration.version > current_version)
    {
        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;
    Ok(())
}

/// Fails unless `conn` is migrated to exactly the latest schema.
pub fn ensure_current(conn: &Connection) -> DbResult<()> {
    let found = current_user_version(conn)?;
    let expected = latest_version();
    if found != expected {
        return Err(DbError::Schema(SchemaMismatch { found, expected }));
    }
    Ok(())
}

pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
