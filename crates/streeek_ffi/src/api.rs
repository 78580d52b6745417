//! FFI use-case API for Flutter-facing reminder calls.
//!
//! # Responsibility
//! - Expose reminder create/edit/toggle/delete and wake handling to Dart
//!   via FRB.
//! - Mirror wake requests and dispatch events into plain records the host
//!   can forward to the platform alarm and notification services.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - One scheduler per process; it is bound to the first database path.
//! - Instants cross the boundary as epoch milliseconds (UTC).

use chrono::{DateTime, TimeZone, Utc};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use streeek_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    DeniedPermissionPolicy, DispatchEvent, DraftError, EngineConfig, EngineError,
    InMemoryWakeTimer, OutstandingWake, QueuedGateway, ReconcileReport, ReminderDraft, ReminderId,
    ScheduleStatus, ScheduledReminder, SchedulingEngine, SharedAlarmPermission,
    SqliteReminderStore, SystemClock, WakeCommand, WakeHandle, WakeOutcome, WakePrecision,
    WeekdaySet,
};

static SCHEDULER: OnceLock<Scheduler> = OnceLock::new();
static SCHEDULER_INIT: Mutex<()> = Mutex::new(());

struct Scheduler {
    db_path: PathBuf,
    engine: SchedulingEngine<SystemClock>,
    timer: Arc<InMemoryWakeTimer>,
    permission: Arc<SharedAlarmPermission>,
    events: Arc<QueuedGateway>,
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir`.
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Reminder projection returned to Dart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderItem {
    pub id: i64,
    pub label: String,
    /// ISO weekday numbers, Monday = 1.
    pub repeat_days: Vec<u8>,
    pub hour: u8,
    pub minute: u8,
    pub enabled: bool,
    /// `armed|deferred|unscheduled|failed`.
    pub schedule_status: String,
    pub next_fire_at_ms: Option<i64>,
}

/// Result envelope for reminder mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderActionResponse {
    pub ok: bool,
    pub reminder: Option<ReminderItem>,
    /// Field at fault when validation failed (`label|repeat_days|time|hour|minute`).
    pub error_field: Option<String>,
    pub message: String,
}

impl ReminderActionResponse {
    fn success(message: impl Into<String>, reminder: Option<ReminderItem>) -> Self {
        Self {
            ok: true,
            reminder,
            error_field: None,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            reminder: None,
            error_field: None,
            message: message.into(),
        }
    }

    fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self {
            error_field: Some(field.to_string()),
            ..Self::failure(message)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderListResponse {
    pub ok: bool,
    pub items: Vec<ReminderItem>,
    pub message: String,
}

/// Result of handling one platform alarm callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeResponse {
    pub ok: bool,
    /// `fired|stale|superseded`, empty on failure.
    pub outcome: String,
    pub next_fire_at_ms: Option<i64>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileResponse {
    pub ok: bool,
    pub adopted: u32,
    pub dropped: u32,
    pub kept: u32,
    pub rearmed: u32,
    pub cancelled: u32,
    /// `reminder_id: reason` per reminder that could not be re-armed.
    pub failures: Vec<String>,
    pub message: String,
}

impl ReconcileResponse {
    fn from_report(report: &ReconcileReport) -> Self {
        Self {
            ok: true,
            adopted: count(report.adopted),
            dropped: count(report.dropped),
            kept: count(report.kept.len()),
            rearmed: count(report.rearmed.len()),
            cancelled: count(report.cancelled.len()),
            failures: report
                .failures
                .iter()
                .map(|failure| format!("{}: {}", failure.reminder_id, failure.reason))
                .collect(),
            message: if report.is_noop() {
                "Schedule already consistent.".to_string()
            } else {
                "Schedule reconciled.".to_string()
            },
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            adopted: 0,
            dropped: 0,
            kept: 0,
            rearmed: 0,
            cancelled: 0,
            failures: Vec::new(),
            message: message.into(),
        }
    }
}

/// Platform alarm instruction produced by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeCommandItem {
    /// `schedule|cancel`.
    pub kind: String,
    pub handle: u64,
    pub reminder_id: Option<i64>,
    pub fire_at_ms: Option<i64>,
    pub exact: bool,
}

/// Wake request the platform alarm service still holds from a previous run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredWakeItem {
    pub handle: u64,
    pub reminder_id: i64,
    pub fire_at_ms: i64,
    pub exact: bool,
}

/// Reminder lifecycle event for the notification layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchEventItem {
    pub reminder_id: i64,
    /// `ENABLE|DISABLE|DELETE|FIRE`.
    pub action: String,
    pub occurred_at_ms: i64,
}

/// Opens the reminder database and starts the scheduler.
///
/// Input semantics:
/// - `db_path`: SQLite file path; created and migrated when missing.
/// - `exact_alarm_granted`: current precise-alarm permission.
/// - `denied_policy`: `record_only|arm_inexact`, empty for the default.
/// - `restored_wakes`: alarms the platform still holds from the previous
///   process; they are adopted by the first reconciliation pass.
///
/// # FFI contract
/// - Idempotent for the same `db_path`; a different path is rejected.
/// - Restores `restored_wakes` before the start-up reconciliation pass.
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn scheduler_init(
    db_path: String,
    exact_alarm_granted: bool,
    denied_policy: String,
    restored_wakes: Vec<RestoredWakeItem>,
) -> String {
    match init_scheduler(
        db_path.trim(),
        exact_alarm_granted,
        denied_policy.trim(),
        &restored_wakes,
    ) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Creates an enabled reminder from sheet input.
///
/// # FFI contract
/// - Validation failures return `ok=false` with `error_field` set.
#[flutter_rust_bridge::frb(sync)]
pub fn reminder_create(
    label: String,
    repeat_days: Vec<u8>,
    hour: u8,
    minute: u8,
) -> ReminderActionResponse {
    let mut draft = ReminderDraft::new();
    if let Err(response) = fill_draft(&mut draft, label, &repeat_days, hour, minute) {
        return response;
    }
    let spec = match draft.submit() {
        Ok(spec) => spec,
        Err(err) => return draft_failure(&err),
    };

    match with_scheduler(|scheduler| scheduler.engine.create(&spec)) {
        Ok(Ok(scheduled)) => {
            ReminderActionResponse::success("Reminder created.", Some(to_item(&scheduled)))
        }
        Ok(Err(err)) => engine_failure("reminder_create", &err),
        Err(err) => ReminderActionResponse::failure(err),
    }
}

/// Replaces label, days and time of an existing reminder.
///
/// The enabled flag is kept; use `reminder_set_enabled` to toggle.
#[flutter_rust_bridge::frb(sync)]
pub fn reminder_update(
    id: i64,
    label: String,
    repeat_days: Vec<u8>,
    hour: u8,
    minute: u8,
) -> ReminderActionResponse {
    let id = ReminderId(id);
    let result = with_scheduler(|scheduler| {
        let existing = match scheduler.engine.get(id) {
            Ok(Some(existing)) => existing,
            Ok(None) => {
                return Err(ReminderActionResponse::failure(format!(
                    "reminder not found: {id}"
                )));
            }
            Err(err) => return Err(engine_failure("reminder_update", &err)),
        };
        let mut draft = ReminderDraft::from_reminder(&existing);
        fill_draft(&mut draft, label, &repeat_days, hour, minute)?;
        let spec = draft.submit().map_err(|err| draft_failure(&err))?;
        scheduler
            .engine
            .update(id, &spec)
            .map_err(|err| engine_failure("reminder_update", &err))
    });

    match result {
        Ok(Ok(scheduled)) => {
            ReminderActionResponse::success("Reminder updated.", Some(to_item(&scheduled)))
        }
        Ok(Err(response)) => response,
        Err(err) => ReminderActionResponse::failure(err),
    }
}

/// Switches a reminder on or off.
#[flutter_rust_bridge::frb(sync)]
pub fn reminder_set_enabled(id: i64, enabled: bool) -> ReminderActionResponse {
    match with_scheduler(|scheduler| scheduler.engine.set_enabled(ReminderId(id), enabled)) {
        Ok(Ok(scheduled)) => {
            let message = if enabled {
                "Reminder enabled."
            } else {
                "Reminder disabled."
            };
            ReminderActionResponse::success(message, Some(to_item(&scheduled)))
        }
        Ok(Err(err)) => engine_failure("reminder_set_enabled", &err),
        Err(err) => ReminderActionResponse::failure(err),
    }
}

/// Deletes a reminder and cancels its wake request.
#[flutter_rust_bridge::frb(sync)]
pub fn reminder_delete(id: i64) -> ReminderActionResponse {
    match with_scheduler(|scheduler| scheduler.engine.delete(ReminderId(id))) {
        Ok(Ok(())) => ReminderActionResponse::success("Reminder deleted.", None),
        Ok(Err(err)) => engine_failure("reminder_delete", &err),
        Err(err) => ReminderActionResponse::failure(err),
    }
}

/// Lists reminders in creation order with their current schedule.
#[flutter_rust_bridge::frb(sync)]
pub fn reminder_list() -> ReminderListResponse {
    let result = with_scheduler(|scheduler| {
        scheduler.engine.list().map(|reminders| {
            reminders
                .into_iter()
                .map(|reminder| {
                    let status = scheduler
                        .engine
                        .trigger_for(reminder.id)
                        .map_or(ScheduleStatus::Unscheduled, |trigger| {
                            ScheduleStatus::from_trigger(&trigger)
                        });
                    to_item(&ScheduledReminder { reminder, status })
                })
                .collect::<Vec<_>>()
        })
    });

    match result {
        Ok(Ok(items)) => ReminderListResponse {
            ok: true,
            message: format!("Loaded {} reminder(s).", items.len()),
            items,
        },
        Ok(Err(err)) => ReminderListResponse {
            ok: false,
            items: Vec::new(),
            message: format!("reminder_list failed: {err}"),
        },
        Err(err) => ReminderListResponse {
            ok: false,
            items: Vec::new(),
            message: err,
        },
    }
}

/// Handles a platform alarm callback for `id`.
#[flutter_rust_bridge::frb(sync)]
pub fn reminder_on_elapsed(id: i64) -> WakeResponse {
    match with_scheduler(|scheduler| scheduler.engine.on_elapsed(ReminderId(id))) {
        Ok(Ok(outcome)) => {
            let (label, next_fire_at_ms) = match &outcome {
                WakeOutcome::Fired { next } => ("fired", next.fire_at().map(to_epoch_ms)),
                WakeOutcome::Stale => ("stale", None),
                WakeOutcome::Superseded => ("superseded", None),
            };
            WakeResponse {
                ok: true,
                outcome: label.to_string(),
                next_fire_at_ms,
                message: format!("Wake handled: {label}."),
            }
        }
        Ok(Err(err)) => WakeResponse {
            ok: false,
            outcome: String::new(),
            next_fire_at_ms: None,
            message: format!("reminder_on_elapsed failed: {err}"),
        },
        Err(err) => WakeResponse {
            ok: false,
            outcome: String::new(),
            next_fire_at_ms: None,
            message: err,
        },
    }
}

/// Runs a reconciliation pass, e.g. after boot or when the app resumes.
#[flutter_rust_bridge::frb(sync)]
pub fn reminder_reconcile() -> ReconcileResponse {
    match with_scheduler(|scheduler| scheduler.engine.reconcile()) {
        Ok(Ok(report)) => ReconcileResponse::from_report(&report),
        Ok(Err(err)) => ReconcileResponse::failure(format!("reminder_reconcile failed: {err}")),
        Err(err) => ReconcileResponse::failure(err),
    }
}

/// Records a permission change and reconciles so deferred reminders are
/// registered (or downgraded) right away.
#[flutter_rust_bridge::frb(sync)]
pub fn set_exact_alarm_permission(granted: bool) -> ReconcileResponse {
    match with_scheduler(|scheduler| {
        scheduler.permission.set_granted(granted);
        scheduler.engine.reconcile()
    }) {
        Ok(Ok(report)) => ReconcileResponse::from_report(&report),
        Ok(Err(err)) => {
            ReconcileResponse::failure(format!("set_exact_alarm_permission failed: {err}"))
        }
        Err(err) => ReconcileResponse::failure(err),
    }
}

/// Registers a wake request the platform reported after start-up.
///
/// Wakes known at start-up belong in `scheduler_init`. Call
/// `reminder_reconcile` afterwards so the request is adopted.
#[flutter_rust_bridge::frb(sync)]
pub fn wake_timer_restore(handle: u64, reminder_id: i64, fire_at_ms: i64, exact: bool) -> String {
    let item = RestoredWakeItem {
        handle,
        reminder_id,
        fire_at_ms,
        exact,
    };
    let wake = match to_outstanding(&item) {
        Ok(wake) => wake,
        Err(err) => return err,
    };
    match with_scheduler(|scheduler| scheduler.timer.restore(wake)) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Returns and clears pending platform alarm instructions.
#[flutter_rust_bridge::frb(sync)]
pub fn wake_timer_drain() -> Vec<WakeCommandItem> {
    with_scheduler(|scheduler| scheduler.timer.drain_commands())
        .map(|commands| commands.into_iter().map(to_command_item).collect())
        .unwrap_or_default()
}

/// Returns and clears buffered dispatch events.
#[flutter_rust_bridge::frb(sync)]
pub fn dispatch_drain() -> Vec<DispatchEventItem> {
    with_scheduler(|scheduler| scheduler.events.drain())
        .map(|events| events.into_iter().map(to_event_item).collect())
        .unwrap_or_default()
}

fn init_scheduler(
    db_path: &str,
    exact_alarm_granted: bool,
    policy: &str,
    restored_wakes: &[RestoredWakeItem],
) -> Result<(), String> {
    if db_path.is_empty() {
        return Err("db_path cannot be empty".to_string());
    }
    let db_path = PathBuf::from(db_path);
    let denied_permission_policy = parse_policy(policy)?;
    let restored_wakes = restored_wakes
        .iter()
        .map(to_outstanding)
        .collect::<Result<Vec<_>, _>>()?;

    let _guard = SCHEDULER_INIT
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(existing) = SCHEDULER.get() {
        if existing.db_path == db_path {
            existing.permission.set_granted(exact_alarm_granted);
            for wake in restored_wakes {
                existing.timer.restore(wake);
            }
            return Ok(());
        }
        return Err(format!(
            "scheduler already initialized at `{}`; refusing to switch to `{}`",
            existing.db_path.display(),
            db_path.display()
        ));
    }

    let scheduler = start_scheduler(
        db_path,
        exact_alarm_granted,
        denied_permission_policy,
        restored_wakes,
    )?;
    SCHEDULER
        .set(scheduler)
        .map_err(|_| "scheduler already initialized".to_string())
}

fn start_scheduler(
    db_path: PathBuf,
    exact_alarm_granted: bool,
    denied_permission_policy: DeniedPermissionPolicy,
    restored_wakes: Vec<OutstandingWake>,
) -> Result<Scheduler, String> {
    let store = SqliteReminderStore::open(&db_path)
        .map_err(|err| format!("scheduler store open failed: {err}"))?;
    let config = EngineConfig {
        denied_permission_policy,
        ..EngineConfig::default()
    };
    let timer = Arc::new(InMemoryWakeTimer::new());
    let restored = restored_wakes.len();
    for wake in restored_wakes {
        timer.restore(wake);
    }
    let permission = Arc::new(SharedAlarmPermission::new(exact_alarm_granted));
    let events = Arc::new(QueuedGateway::new());
    let engine = SchedulingEngine::new(
        Arc::new(store),
        timer.clone(),
        permission.clone(),
        SystemClock,
        &config,
    );
    engine.subscribe(events.clone());

    if config.reconcile_on_start {
        if let Err(err) = engine.reconcile() {
            warn!(
                "event=scheduler_init module=ffi status=degraded error_code=reconcile_failed error={}",
                err
            );
        }
    }

    info!(
        "event=scheduler_init module=ffi status=ok exact_alarm_granted={} policy={} restored_wakes={}",
        exact_alarm_granted,
        denied_permission_policy.as_str(),
        restored
    );
    Ok(Scheduler {
        db_path,
        engine,
        timer,
        permission,
        events,
    })
}

fn parse_policy(value: &str) -> Result<DeniedPermissionPolicy, String> {
    if value.is_empty() {
        return Ok(DeniedPermissionPolicy::default());
    }
    [
        DeniedPermissionPolicy::RecordOnly,
        DeniedPermissionPolicy::ArmInexact,
    ]
    .into_iter()
    .find(|policy| policy.as_str() == value)
    .ok_or_else(|| {
        format!("unsupported denied_policy `{value}`; expected record_only|arm_inexact")
    })
}

fn with_scheduler<T>(f: impl FnOnce(&Scheduler) -> T) -> Result<T, String> {
    SCHEDULER
        .get()
        .map(f)
        .ok_or_else(|| "scheduler not initialized; call scheduler_init first".to_string())
}

fn fill_draft(
    draft: &mut ReminderDraft,
    label: String,
    repeat_days: &[u8],
    hour: u8,
    minute: u8,
) -> Result<(), ReminderActionResponse> {
    let days = WeekdaySet::from_iso_numbers(repeat_days)
        .map_err(|err| ReminderActionResponse::invalid(err.field().as_str(), err.to_string()))?;
    draft.set_label(label);
    draft.set_days(days);
    draft.set_time(hour, minute);
    Ok(())
}

fn draft_failure(err: &DraftError) -> ReminderActionResponse {
    ReminderActionResponse::invalid(err.field(), err.to_string())
}

fn engine_failure(operation: &str, err: &EngineError) -> ReminderActionResponse {
    match err {
        EngineError::InvalidRule(rule_err) => {
            ReminderActionResponse::invalid(rule_err.field().as_str(), err.to_string())
        }
        EngineError::Store(store_err) if store_err.is_unavailable() => {
            warn!(
                "event={operation} module=ffi status=error error_code=store_unavailable error={}",
                err
            );
            ReminderActionResponse::failure(format!(
                "{operation} failed: reminder storage is busy, try again: {err}"
            ))
        }
        EngineError::Store(_) | EngineError::NotFound(_) => {
            ReminderActionResponse::failure(format!("{operation} failed: {err}"))
        }
    }
}

fn to_item(scheduled: &ScheduledReminder) -> ReminderItem {
    let reminder = &scheduled.reminder;
    ReminderItem {
        id: reminder.id.get(),
        label: reminder.label.clone(),
        repeat_days: reminder.repeat_days.to_iso_numbers(),
        hour: reminder.hour,
        minute: reminder.minute,
        enabled: reminder.enabled,
        schedule_status: status_label(&scheduled.status).to_string(),
        next_fire_at_ms: scheduled.status.fire_at().map(to_epoch_ms),
    }
}

fn status_label(status: &ScheduleStatus) -> &'static str {
    match status {
        ScheduleStatus::Armed { .. } => "armed",
        ScheduleStatus::Deferred { .. } => "deferred",
        ScheduleStatus::Unscheduled => "unscheduled",
        ScheduleStatus::Failed { .. } => "failed",
    }
}

fn to_command_item(command: WakeCommand) -> WakeCommandItem {
    match command {
        WakeCommand::Schedule(wake) => WakeCommandItem {
            kind: "schedule".to_string(),
            handle: wake.handle.0,
            reminder_id: Some(wake.reminder_id.get()),
            fire_at_ms: Some(to_epoch_ms(wake.fire_at)),
            exact: wake.precision == WakePrecision::Exact,
        },
        WakeCommand::Cancel(handle) => WakeCommandItem {
            kind: "cancel".to_string(),
            handle: handle.0,
            reminder_id: None,
            fire_at_ms: None,
            exact: false,
        },
    }
}

fn to_event_item(event: DispatchEvent) -> DispatchEventItem {
    DispatchEventItem {
        reminder_id: event.reminder_id.get(),
        action: event.action.as_str().to_string(),
        occurred_at_ms: to_epoch_ms(event.occurred_at),
    }
}

fn to_outstanding(item: &RestoredWakeItem) -> Result<OutstandingWake, String> {
    let fire_at = from_epoch_ms(item.fire_at_ms)
        .ok_or_else(|| format!("fire_at_ms out of range: {}", item.fire_at_ms))?;
    Ok(OutstandingWake {
        handle: WakeHandle(item.handle),
        reminder_id: ReminderId(item.reminder_id),
        fire_at,
        precision: if item.exact {
            WakePrecision::Exact
        } else {
            WakePrecision::Inexact
        },
    })
}

fn to_epoch_ms(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

fn from_epoch_ms(value: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(value).single()
}

fn count(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::{
        core_version, dispatch_drain, init_logging, ping, reminder_create, reminder_delete,
        reminder_list, reminder_on_elapsed, reminder_reconcile, reminder_set_enabled,
        engine_failure, reminder_update, scheduler_init, start_scheduler, to_command_item,
        to_outstanding, wake_timer_drain, RestoredWakeItem,
    };
    use std::time::{SystemTime, UNIX_EPOCH};
    use streeek_core::{
        DeniedPermissionPolicy, EngineError, ReminderId, ReminderSpec, StoreError, WeekdaySet,
    };

    fn ensure_scheduler() {
        let path = std::env::temp_dir()
            .join(format!("streeek_ffi_test_{}.sqlite3", std::process::id()));
        let error = scheduler_init(
            path.to_string_lossy().into_owned(),
            true,
            String::new(),
            Vec::new(),
        );
        assert!(error.is_empty(), "{error}");
    }

    fn now_ms() -> i64 {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time went backwards")
            .as_millis();
        i64::try_from(millis).expect("epoch millis overflow")
    }

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn scheduler_init_rejects_empty_path_and_unknown_policy() {
        assert!(!scheduler_init("  ".to_string(), true, String::new(), Vec::new()).is_empty());
        assert!(scheduler_init(
            "/tmp/x.sqlite3".to_string(),
            true,
            "sometimes".to_string(),
            Vec::new()
        )
        .contains("denied_policy"));
    }

    #[test]
    fn create_validates_label_and_days() {
        ensure_scheduler();

        let short = reminder_create("Run".to_string(), vec![1], 7, 0);
        assert!(!short.ok);
        assert_eq!(short.error_field.as_deref(), Some("label"));

        let no_days = reminder_create("Go running".to_string(), Vec::new(), 7, 0);
        assert_eq!(no_days.error_field.as_deref(), Some("repeat_days"));

        let bad_day = reminder_create("Go running".to_string(), vec![9], 7, 0);
        assert_eq!(bad_day.error_field.as_deref(), Some("repeat_days"));

        let bad_hour = reminder_create("Go running".to_string(), vec![1], 24, 0);
        assert_eq!(bad_hour.error_field.as_deref(), Some("hour"));
    }

    #[test]
    fn reminder_lifecycle_through_ffi() {
        ensure_scheduler();

        let created = reminder_create("Push code".to_string(), vec![1, 2, 3, 4, 5, 6, 7], 9, 30);
        assert!(created.ok, "{}", created.message);
        let item = created.reminder.expect("created reminder");
        assert_eq!(item.schedule_status, "armed");
        let fire_at = item.next_fire_at_ms.expect("armed reminder has fire time");
        assert!(fire_at > now_ms());

        let scheduled = wake_timer_drain();
        assert!(scheduled
            .iter()
            .any(|command| command.kind == "schedule" && command.reminder_id == Some(item.id)));

        // The alarm is not due yet.
        let early = reminder_on_elapsed(item.id);
        assert!(early.ok, "{}", early.message);
        assert_eq!(early.outcome, "superseded");

        let updated = reminder_update(item.id, "Push more code".to_string(), vec![6], 10, 0);
        assert!(updated.ok, "{}", updated.message);
        let updated_item = updated.reminder.expect("updated reminder");
        assert_eq!(updated_item.repeat_days, vec![6]);
        assert!(updated_item.enabled);

        let disabled = reminder_set_enabled(item.id, false);
        assert!(disabled.ok, "{}", disabled.message);
        assert_eq!(
            disabled.reminder.expect("disabled reminder").schedule_status,
            "unscheduled"
        );

        let listed = reminder_list();
        assert!(listed.ok, "{}", listed.message);
        assert!(listed
            .items
            .iter()
            .any(|listed_item| listed_item.id == item.id && !listed_item.enabled));

        let deleted = reminder_delete(item.id);
        assert!(deleted.ok, "{}", deleted.message);
        assert!(!reminder_delete(item.id).ok);

        let actions = dispatch_drain()
            .into_iter()
            .filter(|event| event.reminder_id == item.id)
            .map(|event| event.action)
            .collect::<Vec<_>>();
        assert_eq!(actions, vec!["ENABLE", "DISABLE", "DELETE"]);

        let stale = reminder_on_elapsed(item.id);
        assert_eq!(stale.outcome, "stale");
        assert!(reminder_reconcile().ok);
    }

    #[test]
    fn restart_adopts_wakes_restored_at_init() {
        let path = std::env::temp_dir()
            .join(format!("streeek_ffi_restart_{}.sqlite3", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let first = start_scheduler(
            path.clone(),
            true,
            DeniedPermissionPolicy::RecordOnly,
            Vec::new(),
        )
        .expect("first start");
        let created = first
            .engine
            .create(&ReminderSpec {
                label: "Push code".to_string(),
                repeat_days: WeekdaySet::from_iso_numbers(&[1, 2, 3, 4, 5, 6, 7])
                    .expect("every day"),
                hour: 9,
                minute: 30,
                enabled: true,
            })
            .expect("create reminder");
        let held = first
            .timer
            .drain_commands()
            .into_iter()
            .map(to_command_item)
            .filter(|command| command.kind == "schedule")
            .map(|command| RestoredWakeItem {
                handle: command.handle,
                reminder_id: command.reminder_id.expect("scheduled reminder id"),
                fire_at_ms: command.fire_at_ms.expect("scheduled fire time"),
                exact: command.exact,
            })
            .collect::<Vec<_>>();
        assert_eq!(held.len(), 1);
        drop(first);

        let restored = held
            .iter()
            .map(to_outstanding)
            .collect::<Result<Vec<_>, _>>()
            .expect("valid restored wakes");
        let second = start_scheduler(
            path.clone(),
            true,
            DeniedPermissionPolicy::RecordOnly,
            restored,
        )
        .expect("second start");

        // The platform alarm is adopted; nothing new is scheduled.
        assert!(second.timer.drain_commands().is_empty());
        assert_eq!(second.timer.pending().len(), 1);
        let trigger = second
            .engine
            .trigger_for(created.reminder.id)
            .expect("adopted trigger");
        assert_eq!(
            trigger.registration.handle().map(|handle| handle.0),
            Some(held[0].handle)
        );

        drop(second);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn restored_wake_with_bad_instant_is_rejected() {
        let item = RestoredWakeItem {
            handle: 1,
            reminder_id: 1,
            fire_at_ms: i64::MAX,
            exact: true,
        };
        assert!(to_outstanding(&item).unwrap_err().contains("fire_at_ms"));
    }

    #[test]
    fn busy_storage_is_reported_as_retryable() {
        let busy = engine_failure(
            "reminder_create",
            &EngineError::Store(StoreError::Unavailable("database is locked".to_string())),
        );
        assert!(!busy.ok);
        assert!(busy.message.contains("try again"));
        assert!(busy.error_field.is_none());

        let broken = engine_failure(
            "reminder_create",
            &EngineError::Store(StoreError::InvalidData("repeat_days".to_string())),
        );
        assert!(!broken.message.contains("try again"));

        let missing = engine_failure("reminder_delete", &EngineError::NotFound(ReminderId(9)));
        assert!(missing.message.contains("not found"));
    }
}
