//! Reminder scheduling core for Streeek.
//! This crate is the single source of truth for reminder scheduling
//! invariants.

pub mod clock;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod logging;
pub mod model;
pub mod repo;
pub mod schedule;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DeniedPermissionPolicy, EngineConfig};
pub use dispatch::{
    DispatchAction, DispatchError, DispatchEvent, DispatchGateway, DispatchHub, QueuedGateway,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::draft::{DraftError, ReminderDraft};
pub use model::reminder::{
    InvalidRuleError, RecurrenceRule, Reminder, ReminderId, ReminderSpec, RuleField, WeekdaySet,
};
pub use repo::memory_repo::InMemoryReminderStore;
pub use repo::reminder_repo::{ReminderStore, StoreError, StoreResult};
pub use repo::sqlite_repo::SqliteReminderStore;
pub use schedule::recurrence::{next_for_rule, next_occurrence};
pub use schedule::registry::{ElapsedOutcome, Registration, ScheduledTrigger, TriggerRegistry};
pub use schedule::wake_timer::{
    AlarmPermission, InMemoryWakeTimer, OutstandingWake, SharedAlarmPermission, WakeCommand,
    WakeHandle, WakePrecision, WakeTimer, WakeTimerError,
};
pub use service::reconcile::{ReconcileFailure, ReconcileReport};
pub use service::reminder_engine::{
    EngineError, EngineResult, ReminderState, ScheduleStatus, ScheduledReminder,
    SchedulingEngine, WakeOutcome,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
