//! Reminder database bootstrap.
//!
//! Connections handed to `SqliteReminderStore` come from here: configured,
//! migrated, and stamped with the schema version in `PRAGMA user_version`.
//! A file stamped by a newer build is refused rather than downgraded.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Reminder schema version found on disk versus the one this build runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaMismatch {
    pub found: u32,
    pub expected: u32,
}

impl SchemaMismatch {
    /// The file was stamped by a newer build.
    pub fn is_newer(self) -> bool {
        self.found > self.expected
    }
}

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    Schema(SchemaMismatch),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "reminder database error: {err}"),
            Self::Schema(mismatch) if mismatch.is_newer() => write!(
                f,
                "reminder schema v{} comes from a newer build; this build reads up to v{}",
                mismatch.found, mismatch.expected
            ),
            Self::Schema(mismatch) => write!(
                f,
                "reminder schema v{} is not migrated; v{} required",
                mismatch.found, mismatch.expected
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Schema(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
