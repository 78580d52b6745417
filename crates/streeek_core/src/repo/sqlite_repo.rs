//! SQLite-backed reminder store.
//!
//! # Responsibility
//! - Persist reminders in the `reminders` table.
//! - Keep SQL and column encodings inside the persistence boundary.
//!
//! # Invariants
//! - The connection must be migrated before the store is built.
//! - Read paths reject invalid persisted state instead of masking it.
//! - `repeat_days` is stored as comma-separated ISO weekday numbers.

use crate::db::migrations::ensure_current;
use crate::db::open_db;
use crate::model::reminder::{Reminder, ReminderId, ReminderSpec, WeekdaySet};
use crate::repo::reminder_repo::{ChangeFeed, ReminderStore, StoreError, StoreResult};
use log::warn;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::mpsc::Receiver;

const REMINDER_SELECT_SQL: &str = "SELECT
    id,
    label,
    repeat_days,
    hour,
    minute,
    enabled
FROM reminders";

/// Durable reminder store over one SQLite connection.
pub struct SqliteReminderStore {
    conn: Mutex<Connection>,
    feed: ChangeFeed,
}

impl SqliteReminderStore {
    /// Wraps an already migrated connection.
    ///
    /// # Errors
    /// - `StoreError::Db` when the schema version does not match this build.
    pub fn try_new(conn: Connection) -> StoreResult<Self> {
        ensure_current(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            feed: ChangeFeed::new(),
        })
    }

    /// Opens (and migrates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::try_new(open_db(path)?)
    }

    fn publish_after_commit(&self, conn: &Connection) {
        if !self.feed.has_subscribers() {
            return;
        }
        match list_with(conn) {
            Ok(snapshot) => self.feed.publish(&snapshot),
            Err(err) => warn!(
                "event=store_observe module=repo status=error error_code=snapshot_failed error={}",
                err
            ),
        }
    }
}

impl ReminderStore for SqliteReminderStore {
    fn get(&self, id: ReminderId) -> StoreResult<Option<Reminder>> {
        get_with(&self.conn.lock(), id)
    }

    fn list(&self) -> StoreResult<Vec<Reminder>> {
        list_with(&self.conn.lock())
    }

    fn upsert(&self, id: Option<ReminderId>, spec: &ReminderSpec) -> StoreResult<Reminder> {
        let conn = self.conn.lock();
        let repeat_days = repeat_days_to_db(spec.repeat_days);

        let id = match id {
            None => {
                conn.execute(
                    "INSERT INTO reminders (label, repeat_days, hour, minute, enabled)
                     VALUES (?1, ?2, ?3, ?4, ?5);",
                    params![
                        spec.label.as_str(),
                        repeat_days,
                        spec.hour,
                        spec.minute,
                        bool_to_int(spec.enabled),
                    ],
                )?;
                ReminderId(conn.last_insert_rowid())
            }
            Some(id) => {
                conn.execute(
                    "INSERT INTO reminders (id, label, repeat_days, hour, minute, enabled)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(id) DO UPDATE SET
                        label = excluded.label,
                        repeat_days = excluded.repeat_days,
                        hour = excluded.hour,
                        minute = excluded.minute,
                        enabled = excluded.enabled,
                        updated_at = (CAST(strftime('%s', 'now') AS INTEGER) * 1000);",
                    params![
                        id.0,
                        spec.label.as_str(),
                        repeat_days,
                        spec.hour,
                        spec.minute,
                        bool_to_int(spec.enabled),
                    ],
                )?;
                id
            }
        };

        let stored = get_with(&conn, id)?.ok_or_else(|| {
            StoreError::InvalidData(format!("reminder {id} missing after upsert"))
        })?;
        self.publish_after_commit(&conn);
        Ok(stored)
    }

    fn delete(&self, id: ReminderId) -> StoreResult<()> {
        let conn = self.conn.lock();
        let changed = conn.execute("DELETE FROM reminders WHERE id = ?1;", [id.0])?;
        if changed > 0 {
            self.publish_after_commit(&conn);
        }
        Ok(())
    }

    fn observe(&self) -> StoreResult<Receiver<Vec<Reminder>>> {
        let conn = self.conn.lock();
        let current = list_with(&conn)?;
        Ok(self.feed.subscribe(current))
    }
}

fn get_with(conn: &Connection, id: ReminderId) -> StoreResult<Option<Reminder>> {
    let mut stmt = conn.prepare(&format!("{REMINDER_SELECT_SQL} WHERE id = ?1;"))?;
    let row = stmt
        .query_row([id.0], |row| Ok(parse_reminder_row(row)))
        .optional()?;
    row.transpose()
}

fn list_with(conn: &Connection) -> StoreResult<Vec<Reminder>> {
    let mut stmt = conn.prepare(&format!(
        "{REMINDER_SELECT_SQL} ORDER BY created_at ASC, id ASC;"
    ))?;
    let mut rows = stmt.query([])?;
    let mut reminders = Vec::new();
    while let Some(row) = rows.next()? {
        reminders.push(parse_reminder_row(row)?);
    }
    Ok(reminders)
}

fn parse_reminder_row(row: &Row<'_>) -> StoreResult<Reminder> {
    let id = ReminderId(row.get("id")?);

    let days_text: String = row.get("repeat_days")?;
    let repeat_days = parse_repeat_days(&days_text).ok_or_else(|| {
        StoreError::InvalidData(format!(
            "invalid repeat_days `{days_text}` in reminders.repeat_days"
        ))
    })?;

    let hour = parse_time_part(row.get("hour")?, 23, "hour")?;
    let minute = parse_time_part(row.get("minute")?, 59, "minute")?;

    let enabled = match row.get::<_, i64>("enabled")? {
        0 => false,
        1 => true,
        other => {
            return Err(StoreError::InvalidData(format!(
                "invalid enabled value `{other}` in reminders.enabled"
            )));
        }
    };

    Ok(Reminder {
        id,
        label: row.get("label")?,
        repeat_days,
        enabled,
        hour,
        minute,
    })
}

fn parse_time_part(value: i64, max: u8, column: &str) -> StoreResult<u8> {
    u8::try_from(value)
        .ok()
        .filter(|part| *part <= max)
        .ok_or_else(|| {
            StoreError::InvalidData(format!("invalid {column} value `{value}` in reminders.{column}"))
        })
}

fn repeat_days_to_db(days: WeekdaySet) -> String {
    days.to_iso_numbers()
        .iter()
        .map(|number| number.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_repeat_days(value: &str) -> Option<WeekdaySet> {
    if value.trim().is_empty() {
        return Some(WeekdaySet::EMPTY);
    }
    let numbers = value
        .split(',')
        .map(|part| part.trim().parse::<u8>().ok())
        .collect::<Option<Vec<_>>>()?;
    WeekdaySet::from_iso_numbers(&numbers).ok()
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
