//! In-memory reminder store.
//!
//! Reference implementation of `ReminderStore`; commits are immediate and
//! observers are notified while the state lock is held, so snapshots arrive
//! in commit order.

use crate::model::reminder::{Reminder, ReminderId, ReminderSpec};
use crate::repo::reminder_repo::{ChangeFeed, ReminderStore, StoreResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::mpsc::Receiver;

#[derive(Debug)]
struct MemoryState {
    next_id: i64,
    next_seq: u64,
    rows: BTreeMap<ReminderId, (u64, Reminder)>,
}

impl MemoryState {
    fn ordered(&self) -> Vec<Reminder> {
        let mut rows = self.rows.values().cloned().collect::<Vec<_>>();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, reminder)| reminder).collect()
    }
}

#[derive(Debug)]
pub struct InMemoryReminderStore {
    state: Mutex<MemoryState>,
    feed: ChangeFeed,
}

impl InMemoryReminderStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next_id: 1,
                next_seq: 0,
                rows: BTreeMap::new(),
            }),
            feed: ChangeFeed::new(),
        }
    }
}

impl Default for InMemoryReminderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReminderStore for InMemoryReminderStore {
    fn get(&self, id: ReminderId) -> StoreResult<Option<Reminder>> {
        Ok(self
            .state
            .lock()
            .rows
            .get(&id)
            .map(|(_, reminder)| reminder.clone()))
    }

    fn list(&self) -> StoreResult<Vec<Reminder>> {
        Ok(self.state.lock().ordered())
    }

    fn upsert(&self, id: Option<ReminderId>, spec: &ReminderSpec) -> StoreResult<Reminder> {
        let mut state = self.state.lock();
        let id = match id {
            Some(id) => id,
            None => ReminderId(state.next_id),
        };
        state.next_id = state.next_id.max(id.0.saturating_add(1));

        let seq = match state.rows.get(&id) {
            Some((seq, _)) => *seq,
            None => {
                state.next_seq += 1;
                state.next_seq
            }
        };
        let reminder = Reminder::from_spec(id, spec);
        state.rows.insert(id, (seq, reminder.clone()));
        self.feed.publish(&state.ordered());
        Ok(reminder)
    }

    fn delete(&self, id: ReminderId) -> StoreResult<()> {
        let mut state = self.state.lock();
        if state.rows.remove(&id).is_some() {
            self.feed.publish(&state.ordered());
        }
        Ok(())
    }

    fn observe(&self) -> StoreResult<Receiver<Vec<Reminder>>> {
        let state = self.state.lock();
        Ok(self.feed.subscribe(state.ordered()))
    }
}
