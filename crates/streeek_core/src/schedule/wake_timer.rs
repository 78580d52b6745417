//! Wake-timer and alarm-permission collaborator contracts.
//!
//! # Responsibility
//! - Describe the OS primitive that sleeps until an instant and calls back.
//! - Provide an in-process implementation whose command log a host shell
//!   drains and applies to the platform alarm service.
//!
//! # Invariants
//! - A scheduled wake is delivered at most once.
//! - Delivery happens at or after `fire_at`, never early.

use crate::model::reminder::ReminderId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};

/// Opaque handle of one scheduled wake request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WakeHandle(pub u64);

impl Display for WakeHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Requested delivery precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakePrecision {
    Exact,
    /// OS may batch or delay delivery.
    Inexact,
}

impl WakePrecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Inexact => "inexact",
        }
    }
}

/// Wake request still held by the wake-timer service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutstandingWake {
    pub handle: WakeHandle,
    pub reminder_id: ReminderId,
    pub fire_at: DateTime<Utc>,
    pub precision: WakePrecision,
}

/// Failure to register a wake request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeTimerError {
    Rejected(String),
}

impl Display for WakeTimerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected(message) => write!(f, "wake timer rejected request: {message}"),
        }
    }
}

impl Error for WakeTimerError {}

/// External service that wakes the process at an instant.
///
/// Implementations must not call back into the registry from inside
/// `schedule` or `cancel`; elapsed signals are delivered later through
/// `SchedulingEngine::on_elapsed`.
pub trait WakeTimer: Send + Sync {
    fn schedule(
        &self,
        reminder_id: ReminderId,
        fire_at: DateTime<Utc>,
        precision: WakePrecision,
    ) -> Result<WakeHandle, WakeTimerError>;

    /// Cancels a wake request. Unknown handles are ignored.
    fn cancel(&self, handle: WakeHandle);

    /// Forgets a wake request whose callback has been handled.
    ///
    /// Unlike `cancel`, nothing is sent to the platform: the alarm already
    /// went off. Unknown handles are ignored.
    fn delivered(&self, _handle: WakeHandle) {}

    /// Wake requests that survived a process restart.
    fn outstanding(&self) -> Vec<OutstandingWake> {
        Vec::new()
    }
}

/// Read-only view of the precise-alarm permission.
pub trait AlarmPermission: Send + Sync {
    fn exact_alarm_granted(&self) -> bool;
}

/// Permission flag updated by the host when the user grants or revokes it.
#[derive(Debug)]
pub struct SharedAlarmPermission {
    granted: AtomicBool,
}

impl SharedAlarmPermission {
    pub fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
        }
    }

    pub fn set_granted(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }
}

impl Default for SharedAlarmPermission {
    fn default() -> Self {
        Self::new(true)
    }
}

impl AlarmPermission for SharedAlarmPermission {
    fn exact_alarm_granted(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }
}

/// Instruction for the host platform alarm service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeCommand {
    Schedule(OutstandingWake),
    Cancel(WakeHandle),
}

#[derive(Debug, Default)]
struct TimerState {
    next_handle: u64,
    pending: BTreeMap<WakeHandle, OutstandingWake>,
    commands: Vec<WakeCommand>,
}

/// In-process wake timer.
///
/// Keeps pending wakes so `take_due` can deliver them, and a command log for
/// hosts that mirror requests into the OS alarm service.
#[derive(Debug, Default)]
pub struct InMemoryWakeTimer {
    state: Mutex<TimerState>,
}

impl InMemoryWakeTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending wakes ordered by handle.
    pub fn pending(&self) -> Vec<OutstandingWake> {
        self.state.lock().pending.values().copied().collect()
    }

    pub fn pending_for(&self, reminder_id: ReminderId) -> Vec<OutstandingWake> {
        self.state
            .lock()
            .pending
            .values()
            .filter(|wake| wake.reminder_id == reminder_id)
            .copied()
            .collect()
    }

    /// Removes and returns every wake due at `now`, earliest first.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<OutstandingWake> {
        let mut state = self.state.lock();
        let due_handles = state
            .pending
            .values()
            .filter(|wake| wake.fire_at <= now)
            .map(|wake| wake.handle)
            .collect::<Vec<_>>();
        let mut due = due_handles
            .into_iter()
            .filter_map(|handle| state.pending.remove(&handle))
            .collect::<Vec<_>>();
        due.sort_by_key(|wake| (wake.fire_at, wake.handle));
        due
    }

    /// Returns and clears the command log.
    pub fn drain_commands(&self) -> Vec<WakeCommand> {
        std::mem::take(&mut self.state.lock().commands)
    }

    /// Restores a wake request known to the host, e.g. after restart.
    pub fn restore(&self, wake: OutstandingWake) {
        let mut state = self.state.lock();
        state.next_handle = state.next_handle.max(wake.handle.0);
        state.pending.insert(wake.handle, wake);
    }
}

impl WakeTimer for InMemoryWakeTimer {
    fn schedule(
        &self,
        reminder_id: ReminderId,
        fire_at: DateTime<Utc>,
        precision: WakePrecision,
    ) -> Result<WakeHandle, WakeTimerError> {
        let mut state = self.state.lock();
        state.next_handle += 1;
        let wake = OutstandingWake {
            handle: WakeHandle(state.next_handle),
            reminder_id,
            fire_at,
            precision,
        };
        state.pending.insert(wake.handle, wake);
        state.commands.push(WakeCommand::Schedule(wake));
        Ok(wake.handle)
    }

    fn cancel(&self, handle: WakeHandle) {
        let mut state = self.state.lock();
        if state.pending.remove(&handle).is_some() {
            state.commands.push(WakeCommand::Cancel(handle));
        }
    }

    fn delivered(&self, handle: WakeHandle) {
        self.state.lock().pending.remove(&handle);
    }

    fn outstanding(&self) -> Vec<OutstandingWake> {
        self.pending()
    }
}
