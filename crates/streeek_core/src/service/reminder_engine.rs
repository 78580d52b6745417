//! Reminder scheduling engine.
//!
//! # Responsibility
//! - Apply reminder mutations as one store commit plus one registry update.
//! - React to elapsed wake signals: dispatch `FIRE`, then re-arm.
//! - Emit `ENABLE`/`DISABLE`/`DELETE`/`FIRE` dispatch events.
//!
//! # Invariants
//! - An enabled reminder has exactly one trigger; a disabled or deleted one
//!   has none.
//! - Rule validation happens before any store write.
//! - A failed store write leaves the registry unchanged.
//! - Triggers are always computed from "now", never from a previous trigger.
//! - Dispatch runs outside the mutation lock.
//!
//! # See also
//! - `service::reconcile` for the restart recovery pass.

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::dispatch::{DispatchAction, DispatchEvent, DispatchGateway, DispatchHub};
use crate::model::reminder::{InvalidRuleError, Reminder, ReminderId, ReminderSpec};
use crate::repo::reminder_repo::{ReminderStore, StoreError};
use crate::schedule::recurrence::next_for_rule;
use crate::schedule::registry::{
    ElapsedOutcome, Registration, RegistryError, ScheduledTrigger, TriggerRegistry,
};
use crate::schedule::wake_timer::{AlarmPermission, WakeTimer};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type EngineResult<T> = Result<T, EngineError>;

/// Failure of an engine operation.
#[derive(Debug)]
pub enum EngineError {
    /// Rejected at the mutation boundary; nothing was written.
    InvalidRule(InvalidRuleError),
    /// Store failure; the registry was left unchanged.
    Store(StoreError),
    NotFound(ReminderId),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRule(err) => write!(f, "invalid {}: {err}", err.field().as_str()),
            Self::Store(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "reminder not found: {id}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidRule(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::NotFound(_) => None,
        }
    }
}

impl From<InvalidRuleError> for EngineError {
    fn from(value: InvalidRuleError) -> Self {
        Self::InvalidRule(value)
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Why a trigger could not be installed.
#[derive(Debug)]
pub(crate) enum ArmError {
    Rule(InvalidRuleError),
    Registry(RegistryError),
}

impl Display for ArmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rule(err) => write!(f, "{err}"),
            Self::Registry(err) => write!(f, "{err}"),
        }
    }
}

impl From<InvalidRuleError> for ArmError {
    fn from(value: InvalidRuleError) -> Self {
        Self::Rule(value)
    }
}

impl From<RegistryError> for ArmError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

/// Scheduling result attached to a committed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleStatus {
    /// A wake request is registered for `fire_at`.
    Armed { fire_at: DateTime<Utc> },
    /// Recorded without a wake request; precise alarms are not allowed yet.
    Deferred { fire_at: DateTime<Utc> },
    Unscheduled,
    /// The mutation was committed but no trigger could be installed;
    /// reconciliation retries.
    Failed { reason: String },
}

impl ScheduleStatus {
    pub fn fire_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Armed { fire_at } | Self::Deferred { fire_at } => Some(*fire_at),
            Self::Unscheduled | Self::Failed { .. } => None,
        }
    }

    pub fn from_trigger(trigger: &ScheduledTrigger) -> Self {
        match trigger.registration {
            Registration::Deferred => Self::Deferred {
                fire_at: trigger.fire_at,
            },
            Registration::Exact(_) | Registration::Inexact(_) => Self::Armed {
                fire_at: trigger.fire_at,
            },
        }
    }
}

/// Committed reminder with its scheduling result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledReminder {
    pub reminder: Reminder,
    pub status: ScheduleStatus,
}

/// Per-reminder scheduling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderState {
    /// Disabled, deleted, or waiting for reconciliation.
    Unscheduled,
    Armed,
    /// `FIRE` dispatch in progress.
    Firing,
}

/// Result of handling a wake signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeOutcome {
    /// `FIRE` was dispatched; `next` describes the re-arm.
    Fired { next: ScheduleStatus },
    /// Reminder missing or disabled; nothing dispatched.
    Stale,
    /// Signal from a wake request that was already replaced.
    Superseded,
}

/// Orchestrates store, registry, calculator and dispatch.
pub struct SchedulingEngine<C: Clock> {
    pub(crate) store: Arc<dyn ReminderStore>,
    pub(crate) registry: TriggerRegistry,
    pub(crate) clock: C,
    pub(crate) mutation_lock: Mutex<()>,
    dispatch: DispatchHub,
    firing: Mutex<BTreeSet<ReminderId>>,
}

impl<C: Clock> SchedulingEngine<C> {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        timer: Arc<dyn WakeTimer>,
        permission: Arc<dyn AlarmPermission>,
        clock: C,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            registry: TriggerRegistry::new(timer, permission, config.denied_permission_policy),
            clock,
            mutation_lock: Mutex::new(()),
            dispatch: DispatchHub::new(),
            firing: Mutex::new(BTreeSet::new()),
        }
    }

    /// Registers a dispatch observer.
    pub fn subscribe(&self, gateway: Arc<dyn DispatchGateway>) {
        self.dispatch.register(gateway);
    }

    pub fn registry(&self) -> &TriggerRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ReminderStore> {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn get(&self, id: ReminderId) -> EngineResult<Option<Reminder>> {
        Ok(self.store.get(id)?)
    }

    pub fn list(&self) -> EngineResult<Vec<Reminder>> {
        Ok(self.store.list()?)
    }

    pub fn trigger_for(&self, id: ReminderId) -> Option<ScheduledTrigger> {
        self.registry.get(id)
    }

    pub fn state_of(&self, id: ReminderId) -> ReminderState {
        if self.firing.lock().contains(&id) {
            ReminderState::Firing
        } else if self.registry.contains(id) {
            ReminderState::Armed
        } else {
            ReminderState::Unscheduled
        }
    }

    /// Persists a new reminder and arms it when enabled.
    ///
    /// # Errors
    /// - `InvalidRule` for an empty day set or out-of-range time.
    /// - `Store` when the commit fails.
    pub fn create(&self, spec: &ReminderSpec) -> EngineResult<ScheduledReminder> {
        spec.rule()?;

        let scheduled = {
            let _guard = self.mutation_lock.lock();
            let reminder = self.store.upsert(None, spec)?;
            let status = self.sync_trigger(&reminder);
            ScheduledReminder { reminder, status }
        };

        info!(
            "event=reminder_create module=engine status=ok reminder_id={} enabled={} fire_at={}",
            scheduled.reminder.id,
            scheduled.reminder.enabled,
            fire_at_field(&scheduled.status)
        );
        if scheduled.reminder.enabled {
            self.emit(scheduled.reminder.id, DispatchAction::Enable);
        }
        Ok(scheduled)
    }

    /// Replaces label, days, time and enabled flag of an existing reminder.
    ///
    /// The trigger is recomputed from "now" whenever the result is enabled.
    pub fn update(&self, id: ReminderId, spec: &ReminderSpec) -> EngineResult<ScheduledReminder> {
        spec.rule()?;

        let (scheduled, was_enabled) = {
            let _guard = self.mutation_lock.lock();
            let existing = self.store.get(id)?.ok_or(EngineError::NotFound(id))?;
            let reminder = self.store.upsert(Some(id), spec)?;
            let status = self.sync_trigger(&reminder);
            (ScheduledReminder { reminder, status }, existing.enabled)
        };

        info!(
            "event=reminder_update module=engine status=ok reminder_id={} enabled={} fire_at={}",
            id,
            scheduled.reminder.enabled,
            fire_at_field(&scheduled.status)
        );
        self.emit_toggle(id, was_enabled, scheduled.reminder.enabled);
        Ok(scheduled)
    }

    /// Switches a reminder on or off without touching its other fields.
    pub fn set_enabled(&self, id: ReminderId, enabled: bool) -> EngineResult<ScheduledReminder> {
        let (scheduled, was_enabled) = {
            let _guard = self.mutation_lock.lock();
            let existing = self.store.get(id)?.ok_or(EngineError::NotFound(id))?;
            if enabled {
                existing.rule()?;
            }
            let mut spec = existing.spec();
            spec.enabled = enabled;
            let reminder = self.store.upsert(Some(id), &spec)?;
            let status = self.sync_trigger(&reminder);
            (ScheduledReminder { reminder, status }, existing.enabled)
        };

        info!(
            "event=reminder_toggle module=engine status=ok reminder_id={} enabled={} fire_at={}",
            id,
            enabled,
            fire_at_field(&scheduled.status)
        );
        self.emit_toggle(id, was_enabled, enabled);
        Ok(scheduled)
    }

    /// Cancels the trigger, then removes the record.
    ///
    /// If the store delete fails the trigger is restored before returning.
    ///
    /// # Errors
    /// - `NotFound` when no such reminder exists (any stray trigger is still
    ///   cancelled).
    pub fn delete(&self, id: ReminderId) -> EngineResult<()> {
        {
            let _guard = self.mutation_lock.lock();
            let Some(existing) = self.store.get(id)? else {
                self.registry.cancel(id);
                return Err(EngineError::NotFound(id));
            };

            self.registry.cancel(id);
            if let Err(err) = self.store.delete(id) {
                if existing.enabled {
                    self.sync_trigger(&existing);
                }
                error!(
                    "event=reminder_delete module=engine status=error reminder_id={} error={}",
                    id, err
                );
                return Err(err.into());
            }
        }

        info!(
            "event=reminder_delete module=engine status=ok reminder_id={}",
            id
        );
        self.emit(id, DispatchAction::Delete);
        Ok(())
    }

    /// Entry point for the wake-timer callback.
    ///
    /// Consumes the registry entry first, so re-arming from the handler is
    /// never mistaken for a duplicate.
    pub fn on_elapsed(&self, id: ReminderId) -> EngineResult<WakeOutcome> {
        let now = self.clock.now_utc();
        match self.registry.consume_elapsed(id, now) {
            ElapsedOutcome::Superseded(pending) => {
                debug!(
                    "event=reminder_wake module=engine status=skipped reminder_id={} reason=superseded pending_fire_at={}",
                    id,
                    pending.fire_at.to_rfc3339()
                );
                Ok(WakeOutcome::Superseded)
            }
            ElapsedOutcome::Consumed(_) | ElapsedOutcome::Untracked => self.on_wake(id),
        }
    }

    /// Fires a reminder and arms its next occurrence from "now".
    ///
    /// Missing or disabled reminders are dropped silently. State is checked
    /// again right before re-arming, so a disable or delete that raced the
    /// dispatch prevents the re-arm.
    pub fn on_wake(&self, id: ReminderId) -> EngineResult<WakeOutcome> {
        match self.store.get(id)? {
            Some(reminder) if reminder.enabled => {}
            _ => {
                debug!(
                    "event=reminder_wake module=engine status=skipped reminder_id={} reason=stale",
                    id
                );
                return Ok(WakeOutcome::Stale);
            }
        }

        self.firing.lock().insert(id);
        self.emit(id, DispatchAction::Fire);

        let next = {
            let _guard = self.mutation_lock.lock();
            self.firing.lock().remove(&id);
            match self.store.get(id)? {
                Some(current) if current.enabled => {
                    let now = self.clock.now_utc();
                    match self.registry.get(id) {
                        Some(trigger) if !self.registry.needs_rearm(&trigger, now) => {
                            ScheduleStatus::from_trigger(&trigger)
                        }
                        _ => self.sync_trigger(&current),
                    }
                }
                _ => ScheduleStatus::Unscheduled,
            }
        };

        info!(
            "event=reminder_wake module=engine status=ok reminder_id={} next_fire_at={}",
            id,
            fire_at_field(&next)
        );
        Ok(WakeOutcome::Fired { next })
    }

    /// Arms the next occurrence from "now".
    pub(crate) fn arm_next(&self, reminder: &Reminder) -> Result<ScheduledTrigger, ArmError> {
        let rule = reminder.rule()?;
        let now = self.clock.now();
        let fire_at = next_for_rule(&rule, &now)?.with_timezone(&Utc);
        Ok(self
            .registry
            .arm(reminder.id, fire_at, now.with_timezone(&Utc))?)
    }

    /// Brings the registry in line with one committed reminder.
    fn sync_trigger(&self, reminder: &Reminder) -> ScheduleStatus {
        if !reminder.enabled {
            self.registry.cancel(reminder.id);
            return ScheduleStatus::Unscheduled;
        }

        match self.arm_next(reminder) {
            Ok(trigger) => ScheduleStatus::from_trigger(&trigger),
            Err(err) => {
                // The previous trigger would fire for the old schedule.
                self.registry.cancel(reminder.id);
                error!(
                    "event=trigger_arm module=engine status=error reminder_id={} error={}",
                    reminder.id, err
                );
                ScheduleStatus::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    fn emit_toggle(&self, id: ReminderId, was_enabled: bool, enabled: bool) {
        match (was_enabled, enabled) {
            (false, true) => self.emit(id, DispatchAction::Enable),
            (true, false) => self.emit(id, DispatchAction::Disable),
            _ => {}
        }
    }

    fn emit(&self, id: ReminderId, action: DispatchAction) {
        let event = DispatchEvent::new(id, action, self.clock.now_utc());
        if self.dispatch.emit(event) == 0 && !self.dispatch.is_empty() {
            warn!(
                "event=dispatch module=engine status=error reminder_id={} action={} reason=no_gateway_accepted",
                id, action
            );
        }
    }
}

fn fire_at_field(status: &ScheduleStatus) -> String {
    status
        .fire_at()
        .map_or_else(|| "none".to_string(), |fire_at| fire_at.to_rfc3339())
}
