//! Trigger registry: at most one live wake request per reminder.
//!
//! # Responsibility
//! - Own every `ScheduledTrigger` and its wake-timer registration.
//! - Apply "cancel old, arm new" as one step under a single lock.
//! - Degrade to recorded-only triggers while precise alarms are not allowed.
//!
//! # Invariants
//! - At most one trigger per `ReminderId`.
//! - `fire_at > armed_at` for every trigger.
//! - A failed wake registration leaves the previous trigger untouched.

use crate::config::DeniedPermissionPolicy;
use crate::model::reminder::ReminderId;
use crate::schedule::wake_timer::{
    AlarmPermission, WakeHandle, WakePrecision, WakeTimer, WakeTimerError,
};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// How a trigger is backed by the wake-timer service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Exact(WakeHandle),
    Inexact(WakeHandle),
    /// Intent recorded only; no wake request exists yet.
    Deferred,
}

impl Registration {
    pub fn handle(self) -> Option<WakeHandle> {
        match self {
            Self::Exact(handle) | Self::Inexact(handle) => Some(handle),
            Self::Deferred => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact(_) => "exact",
            Self::Inexact(_) => "inexact",
            Self::Deferred => "deferred",
        }
    }
}

/// Outstanding trigger derived from a reminder's rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTrigger {
    pub reminder_id: ReminderId,
    pub fire_at: DateTime<Utc>,
    pub armed_at: DateTime<Utc>,
    pub registration: Registration,
}

/// Result of consuming an elapsed signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElapsedOutcome {
    /// The due trigger was removed.
    Consumed(ScheduledTrigger),
    /// No trigger was tracked for the reminder (e.g. after a restart).
    Untracked,
    /// The tracked trigger is still in the future; the signal belongs to a
    /// superseded wake request.
    Superseded(ScheduledTrigger),
}

/// Counts from importing wake requests held by the wake-timer service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdoptReport {
    pub adopted: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    NotInFuture {
        reminder_id: ReminderId,
        fire_at: DateTime<Utc>,
        armed_at: DateTime<Utc>,
    },
    WakeTimer(WakeTimerError),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotInFuture {
                reminder_id,
                fire_at,
                armed_at,
            } => write!(
                f,
                "trigger for reminder {reminder_id} at {fire_at} is not after {armed_at}"
            ),
            Self::WakeTimer(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::WakeTimer(err) => Some(err),
            Self::NotInFuture { .. } => None,
        }
    }
}

impl From<WakeTimerError> for RegistryError {
    fn from(value: WakeTimerError) -> Self {
        Self::WakeTimer(value)
    }
}

/// Per-reminder trigger table backed by a wake-timer service.
pub struct TriggerRegistry {
    triggers: Mutex<BTreeMap<ReminderId, ScheduledTrigger>>,
    timer: Arc<dyn WakeTimer>,
    permission: Arc<dyn AlarmPermission>,
    policy: DeniedPermissionPolicy,
}

impl TriggerRegistry {
    pub fn new(
        timer: Arc<dyn WakeTimer>,
        permission: Arc<dyn AlarmPermission>,
        policy: DeniedPermissionPolicy,
    ) -> Self {
        Self {
            triggers: Mutex::new(BTreeMap::new()),
            timer,
            permission,
            policy,
        }
    }

    /// Installs the trigger for `reminder_id`, superseding any existing one.
    ///
    /// # Errors
    /// - `NotInFuture` when `fire_at <= armed_at`.
    /// - `WakeTimer` when the new wake request is rejected; the previous
    ///   trigger is kept in that case.
    pub fn arm(
        &self,
        reminder_id: ReminderId,
        fire_at: DateTime<Utc>,
        armed_at: DateTime<Utc>,
    ) -> Result<ScheduledTrigger, RegistryError> {
        if fire_at <= armed_at {
            return Err(RegistryError::NotInFuture {
                reminder_id,
                fire_at,
                armed_at,
            });
        }

        let mut triggers = self.triggers.lock();
        let registration = self.register(reminder_id, fire_at)?;
        let trigger = ScheduledTrigger {
            reminder_id,
            fire_at,
            armed_at,
            registration,
        };
        if let Some(previous) = triggers.insert(reminder_id, trigger) {
            self.release(&previous);
        }

        debug!(
            "event=trigger_arm module=registry status=ok reminder_id={} fire_at={} registration={}",
            reminder_id,
            fire_at.to_rfc3339(),
            registration.as_str()
        );
        Ok(trigger)
    }

    /// Removes the live trigger for `reminder_id`; no-op when absent.
    pub fn cancel(&self, reminder_id: ReminderId) -> Option<ScheduledTrigger> {
        let removed = self.triggers.lock().remove(&reminder_id);
        if let Some(previous) = &removed {
            self.release(previous);
            debug!(
                "event=trigger_cancel module=registry status=ok reminder_id={}",
                reminder_id
            );
        }
        removed
    }

    /// Removes the consumed trigger before the engine handles the wake.
    ///
    /// The consumed wake request is acknowledged to the timer so it no longer
    /// counts as outstanding.
    pub fn consume_elapsed(&self, reminder_id: ReminderId, now: DateTime<Utc>) -> ElapsedOutcome {
        let mut triggers = self.triggers.lock();
        match triggers.get(&reminder_id).copied() {
            None => ElapsedOutcome::Untracked,
            Some(trigger) if trigger.fire_at > now => ElapsedOutcome::Superseded(trigger),
            Some(trigger) => {
                triggers.remove(&reminder_id);
                if let Some(handle) = trigger.registration.handle() {
                    self.timer.delivered(handle);
                }
                ElapsedOutcome::Consumed(trigger)
            }
        }
    }

    pub fn get(&self, reminder_id: ReminderId) -> Option<ScheduledTrigger> {
        self.triggers.lock().get(&reminder_id).copied()
    }

    pub fn contains(&self, reminder_id: ReminderId) -> bool {
        self.triggers.lock().contains_key(&reminder_id)
    }

    /// All triggers ordered by reminder id.
    pub fn snapshot(&self) -> Vec<ScheduledTrigger> {
        self.triggers.lock().values().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.triggers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.lock().is_empty()
    }

    /// Whether `trigger` no longer counts as live at `now`.
    ///
    /// Elapsed triggers always need re-arming. Deferred and inexact triggers
    /// need it once a better registration is available.
    pub fn needs_rearm(&self, trigger: &ScheduledTrigger, now: DateTime<Utc>) -> bool {
        if trigger.fire_at <= now {
            return true;
        }
        let granted = self.permission.exact_alarm_granted();
        match trigger.registration {
            Registration::Exact(_) => false,
            Registration::Inexact(_) => granted,
            Registration::Deferred => {
                granted || self.policy == DeniedPermissionPolicy::ArmInexact
            }
        }
    }

    /// Imports wake requests left by a previous process.
    ///
    /// Requests already tracked are skipped. Duplicates of a tracked reminder
    /// and requests that are already overdue are cancelled.
    pub fn adopt_outstanding(&self, now: DateTime<Utc>) -> AdoptReport {
        let outstanding = self.timer.outstanding();
        let mut report = AdoptReport::default();
        let mut triggers = self.triggers.lock();

        for wake in outstanding {
            match triggers.get(&wake.reminder_id) {
                Some(tracked) if tracked.registration.handle() == Some(wake.handle) => {}
                Some(_) => {
                    self.timer.cancel(wake.handle);
                    report.dropped += 1;
                }
                None if wake.fire_at <= now => {
                    self.timer.cancel(wake.handle);
                    report.dropped += 1;
                }
                None => {
                    let registration = match wake.precision {
                        WakePrecision::Exact => Registration::Exact(wake.handle),
                        WakePrecision::Inexact => Registration::Inexact(wake.handle),
                    };
                    triggers.insert(
                        wake.reminder_id,
                        ScheduledTrigger {
                            reminder_id: wake.reminder_id,
                            fire_at: wake.fire_at,
                            armed_at: now,
                            registration,
                        },
                    );
                    report.adopted += 1;
                }
            }
        }

        if report.adopted > 0 || report.dropped > 0 {
            info!(
                "event=trigger_adopt module=registry status=ok adopted={} dropped={}",
                report.adopted, report.dropped
            );
        }
        report
    }

    fn register(
        &self,
        reminder_id: ReminderId,
        fire_at: DateTime<Utc>,
    ) -> Result<Registration, WakeTimerError> {
        if self.permission.exact_alarm_granted() {
            let handle = self
                .timer
                .schedule(reminder_id, fire_at, WakePrecision::Exact)?;
            return Ok(Registration::Exact(handle));
        }

        match self.policy {
            DeniedPermissionPolicy::RecordOnly => {
                warn!(
                    "event=trigger_arm module=registry status=degraded reminder_id={} reason=exact_alarm_denied policy={}",
                    reminder_id,
                    self.policy.as_str()
                );
                Ok(Registration::Deferred)
            }
            DeniedPermissionPolicy::ArmInexact => {
                let handle = self
                    .timer
                    .schedule(reminder_id, fire_at, WakePrecision::Inexact)?;
                Ok(Registration::Inexact(handle))
            }
        }
    }

    fn release(&self, trigger: &ScheduledTrigger) {
        if let Some(handle) = trigger.registration.handle() {
            self.timer.cancel(handle);
        }
    }
}
