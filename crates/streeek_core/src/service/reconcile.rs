//! Restart and missed-signal recovery.
//!
//! # Responsibility
//! - Restore "one live trigger per enabled reminder" after a reboot, a
//!   process kill, a crash between cancel and delete, or a permission change.
//!
//! # Invariants
//! - Running the pass twice with no mutation in between changes nothing.
//! - A failure to re-arm one reminder never stops the others.

use crate::clock::Clock;
use crate::model::reminder::{Reminder, ReminderId};
use crate::schedule::recurrence::next_for_rule;
use crate::schedule::registry::ScheduledTrigger;
use crate::service::reminder_engine::{EngineResult, SchedulingEngine};
use chrono::Utc;
use log::{info, warn};
use std::collections::BTreeSet;
use std::time::Instant;

/// One reminder that could not be re-armed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileFailure {
    pub reminder_id: ReminderId,
    pub reason: String,
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Wake requests imported from the wake-timer service.
    pub adopted: usize,
    /// Wake requests dropped during import (duplicates, overdue).
    pub dropped: usize,
    pub kept: Vec<ReminderId>,
    pub rearmed: Vec<ReminderId>,
    pub cancelled: Vec<ReminderId>,
    pub failures: Vec<ReconcileFailure>,
}

impl ReconcileReport {
    /// Whether the pass changed the registry.
    pub fn is_noop(&self) -> bool {
        self.adopted == 0
            && self.dropped == 0
            && self.rearmed.is_empty()
            && self.cancelled.is_empty()
    }
}

impl<C: Clock> SchedulingEngine<C> {
    /// Reconciles the registry with the store.
    ///
    /// 1. Imports wake requests still held by the wake-timer service.
    /// 2. Cancels triggers whose reminder is missing or disabled.
    /// 3. Re-arms enabled reminders without a live trigger, or whose trigger
    ///    no longer matches the stored rule, computed from "now".
    ///
    /// # Errors
    /// - `Store` when the reminder list cannot be read; per-reminder arm
    ///   failures are reported in `ReconcileReport::failures` instead.
    pub fn reconcile(&self) -> EngineResult<ReconcileReport> {
        let started_at = Instant::now();
        let _guard = self.mutation_lock.lock();
        let now = self.clock.now_utc();
        let mut report = ReconcileReport::default();

        let adopt = self.registry.adopt_outstanding(now);
        report.adopted = adopt.adopted;
        report.dropped = adopt.dropped;

        let reminders = self.store.list()?;
        let enabled_ids = reminders
            .iter()
            .filter(|reminder| reminder.enabled)
            .map(|reminder| reminder.id)
            .collect::<BTreeSet<_>>();

        for trigger in self.registry.snapshot() {
            if !enabled_ids.contains(&trigger.reminder_id) {
                self.registry.cancel(trigger.reminder_id);
                report.cancelled.push(trigger.reminder_id);
            }
        }

        for reminder in reminders.iter().filter(|reminder| reminder.enabled) {
            if let Some(trigger) = self.registry.get(reminder.id) {
                if !self.registry.needs_rearm(&trigger, now)
                    && self.is_on_schedule(reminder, &trigger)
                {
                    report.kept.push(reminder.id);
                    continue;
                }
            }

            match self.arm_next(reminder) {
                Ok(_) => report.rearmed.push(reminder.id),
                Err(err) => {
                    warn!(
                        "event=reconcile module=engine status=error reminder_id={} error={}",
                        reminder.id, err
                    );
                    report.failures.push(ReconcileFailure {
                        reminder_id: reminder.id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            "event=reconcile module=engine status=ok duration_ms={} adopted={} dropped={} kept={} rearmed={} cancelled={} failed={}",
            started_at.elapsed().as_millis(),
            report.adopted,
            report.dropped,
            report.kept.len(),
            report.rearmed.len(),
            report.cancelled.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Whether `trigger` still targets the next occurrence of the stored rule.
    ///
    /// A wake request that survived a crash between a store commit and the
    /// registry update points at the previous schedule.
    fn is_on_schedule(&self, reminder: &Reminder, trigger: &ScheduledTrigger) -> bool {
        let Ok(rule) = reminder.rule() else {
            return false;
        };
        match next_for_rule(&rule, &self.clock.now()) {
            Ok(next) => next.with_timezone(&Utc) == trigger.fire_at,
            Err(_) => false,
        }
    }
}
