//! Reminder store contract.
//!
//! # Responsibility
//! - Define the durable reminder access contract used by the engine.
//! - Provide the change feed shared by store implementations.
//!
//! # Invariants
//! - Every operation returns only after the change is committed.
//! - `list()` is ordered by creation.
//! - Observers receive the current snapshot first, then one snapshot per
//!   committed change.

use crate::db::DbError;
use crate::model::reminder::{Reminder, ReminderId, ReminderSpec};
use parking_lot::Mutex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::mpsc::{self, Receiver, Sender};

pub type StoreResult<T> = Result<T, StoreError>;

/// Store failure propagated to the caller of a mutation.
#[derive(Debug)]
pub enum StoreError {
    /// The backing store cannot be reached right now.
    Unavailable(String),
    Db(DbError),
    InvalidData(String),
}

impl StoreError {
    /// Whether retrying the same call later may succeed.
    ///
    /// Schema mismatches and rows that fail to parse stay broken until the
    /// data or the build changes.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Db(DbError::Sqlite(_)))
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "reminder store unavailable: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted reminder data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Unavailable(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Durable reminder collection consumed by the scheduling engine.
pub trait ReminderStore: Send + Sync {
    fn get(&self, id: ReminderId) -> StoreResult<Option<Reminder>>;

    /// All reminders ordered by creation.
    fn list(&self) -> StoreResult<Vec<Reminder>>;

    /// Inserts or replaces a reminder; assigns an id when `id` is `None`.
    fn upsert(&self, id: Option<ReminderId>, spec: &ReminderSpec) -> StoreResult<Reminder>;

    /// Removes a reminder; no-op when absent.
    fn delete(&self, id: ReminderId) -> StoreResult<()>;

    /// Snapshot stream, starting with the current contents.
    fn observe(&self) -> StoreResult<Receiver<Vec<Reminder>>>;
}

/// Fan-out of committed snapshots to observers.
#[derive(Debug, Default)]
pub struct ChangeFeed {
    subscribers: Mutex<Vec<Sender<Vec<Reminder>>>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, current: Vec<Reminder>) -> Receiver<Vec<Reminder>> {
        let (sender, receiver) = mpsc::channel();
        // The receiver is still alive here, so this send cannot fail.
        let _ = sender.send(current);
        self.subscribers.lock().push(sender);
        receiver
    }

    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.lock().is_empty()
    }

    /// Sends `snapshot` to every observer, dropping disconnected ones.
    pub fn publish(&self, snapshot: &[Reminder]) {
        self.subscribers
            .lock()
            .retain(|sender| sender.send(snapshot.to_vec()).is_ok());
    }
}
