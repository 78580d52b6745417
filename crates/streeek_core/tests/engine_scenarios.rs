use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc, Weekday};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use streeek_core::{
    Clock, DeniedPermissionPolicy, DispatchAction, DispatchError, DispatchEvent, DispatchGateway,
    EngineConfig, EngineError, InMemoryReminderStore, InMemoryWakeTimer, InvalidRuleError,
    ManualClock, QueuedGateway, Registration, Reminder, ReminderId, ReminderSpec, ReminderState,
    ReminderStore, ScheduleStatus, SchedulingEngine, SharedAlarmPermission, StoreError,
    StoreResult, WakeCommand, WakeOutcome, WakePrecision,
};

type Engine = SchedulingEngine<ManualClock<FixedOffset>>;

fn zone() -> FixedOffset {
    FixedOffset::east_opt(3 * 3600).unwrap()
}

fn local(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
    // October 2026: the 19th is a Monday.
    zone().with_ymd_and_hms(2026, 10, day, hour, minute, 0).unwrap()
}

fn utc(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    local(day, hour, minute).with_timezone(&Utc)
}

fn spec(label: &str, days: &[Weekday], hour: u8, minute: u8) -> ReminderSpec {
    ReminderSpec {
        label: label.to_string(),
        repeat_days: days.iter().copied().collect(),
        hour,
        minute,
        enabled: true,
    }
}

struct Fixture {
    engine: Engine,
    store: Arc<FlakyStore>,
    timer: Arc<InMemoryWakeTimer>,
    permission: Arc<SharedAlarmPermission>,
    events: Arc<QueuedGateway>,
}

fn fixture_at(start: DateTime<FixedOffset>) -> Fixture {
    fixture_with(start, true, EngineConfig::default())
}

fn fixture_with(start: DateTime<FixedOffset>, granted: bool, config: EngineConfig) -> Fixture {
    let store = Arc::new(FlakyStore::default());
    let timer = Arc::new(InMemoryWakeTimer::new());
    let permission = Arc::new(SharedAlarmPermission::new(granted));
    let engine = SchedulingEngine::new(
        store.clone(),
        timer.clone(),
        permission.clone(),
        ManualClock::new(start),
        &config,
    );
    let events = Arc::new(QueuedGateway::new());
    engine.subscribe(events.clone());
    Fixture {
        engine,
        store,
        timer,
        permission,
        events,
    }
}

/// Store whose writes can be switched off.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryReminderStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("storage offline".to_string()));
        }
        Ok(())
    }
}

impl ReminderStore for FlakyStore {
    fn get(&self, id: ReminderId) -> StoreResult<Option<Reminder>> {
        self.inner.get(id)
    }

    fn list(&self) -> StoreResult<Vec<Reminder>> {
        self.inner.list()
    }

    fn upsert(&self, id: Option<ReminderId>, spec: &ReminderSpec) -> StoreResult<Reminder> {
        self.check_writable()?;
        self.inner.upsert(id, spec)
    }

    fn delete(&self, id: ReminderId) -> StoreResult<()> {
        self.check_writable()?;
        self.inner.delete(id)
    }

    fn observe(&self) -> StoreResult<Receiver<Vec<Reminder>>> {
        self.inner.observe()
    }
}

fn actions(events: &QueuedGateway) -> Vec<(ReminderId, DispatchAction)> {
    events
        .drain()
        .into_iter()
        .map(|event| (event.reminder_id, event.action))
        .collect()
}

/// Every enabled reminder has exactly one trigger and one wake request;
/// nothing else is scheduled.
fn assert_one_trigger_per_enabled(fixture: &Fixture) {
    let reminders = fixture.engine.list().unwrap();
    let enabled = reminders.iter().filter(|r| r.enabled).count();
    assert_eq!(fixture.engine.registry().len(), enabled);
    assert_eq!(fixture.timer.pending().len(), enabled);

    for reminder in reminders {
        let trigger = fixture.engine.trigger_for(reminder.id);
        let wakes = fixture.timer.pending_for(reminder.id);
        if reminder.enabled {
            let trigger = trigger.expect("enabled reminder without trigger");
            assert_eq!(wakes.len(), 1);
            assert_eq!(trigger.registration.handle(), Some(wakes[0].handle));
            assert_eq!(trigger.fire_at, wakes[0].fire_at);
        } else {
            assert!(trigger.is_none());
            assert!(wakes.is_empty());
        }
    }
}

#[test]
fn create_arms_first_matching_day_after_now() {
    let f = fixture_at(local(19, 9, 0));
    let created = f
        .engine
        .create(&spec("Water", &[Weekday::Mon, Weekday::Wed, Weekday::Fri], 8, 0))
        .unwrap();

    assert_eq!(
        created.status,
        ScheduleStatus::Armed {
            fire_at: utc(21, 8, 0)
        }
    );
    let trigger = f.engine.trigger_for(created.reminder.id).unwrap();
    assert!(matches!(trigger.registration, Registration::Exact(_)));
    assert_eq!(trigger.armed_at, utc(19, 9, 0));
    assert_eq!(
        actions(&f.events),
        vec![(created.reminder.id, DispatchAction::Enable)]
    );
    assert_one_trigger_per_enabled(&f);
}

#[test]
fn create_before_todays_slot_arms_today() {
    let f = fixture_at(local(19, 7, 59));
    let created = f
        .engine
        .create(&spec("Stretch", &[Weekday::Mon], 8, 0))
        .unwrap();
    assert_eq!(created.status.fire_at(), Some(utc(19, 8, 0)));
}

#[test]
fn create_exactly_at_todays_slot_arms_next_week() {
    let f = fixture_at(local(19, 8, 0));
    let created = f
        .engine
        .create(&spec("Stretch", &[Weekday::Mon], 8, 0))
        .unwrap();
    assert_eq!(created.status.fire_at(), Some(utc(26, 8, 0)));
}

#[test]
fn reenable_computes_from_current_time() {
    let f = fixture_at(local(19, 9, 0));
    let id = f
        .engine
        .create(&spec("Water", &[Weekday::Mon, Weekday::Wed, Weekday::Fri], 8, 0))
        .unwrap()
        .reminder
        .id;

    let disabled = f.engine.set_enabled(id, false).unwrap();
    assert_eq!(disabled.status, ScheduleStatus::Unscheduled);
    assert!(!disabled.reminder.enabled);
    assert!(f.engine.trigger_for(id).is_none());
    assert_eq!(f.engine.state_of(id), ReminderState::Unscheduled);
    assert_one_trigger_per_enabled(&f);

    // Thursday: Wednesday's slot is gone, Friday is next.
    f.engine.clock().set(local(22, 10, 0));
    let enabled = f.engine.set_enabled(id, true).unwrap();
    assert_eq!(enabled.status.fire_at(), Some(utc(23, 8, 0)));
    assert_eq!(f.engine.state_of(id), ReminderState::Armed);
    assert_one_trigger_per_enabled(&f);

    assert_eq!(
        actions(&f.events),
        vec![
            (id, DispatchAction::Enable),
            (id, DispatchAction::Disable),
            (id, DispatchAction::Enable),
        ]
    );
}

#[test]
fn wake_for_deleted_reminder_is_dropped() {
    let f = fixture_at(local(19, 9, 0));
    let id = f
        .engine
        .create(&spec("Water", &[Weekday::Wed], 8, 0))
        .unwrap()
        .reminder
        .id;
    f.engine.delete(id).unwrap();

    f.engine.clock().set(local(21, 8, 0));
    assert_eq!(f.engine.on_elapsed(id).unwrap(), WakeOutcome::Stale);

    assert!(f.engine.registry().is_empty());
    assert!(f.timer.pending().is_empty());
    assert_eq!(
        actions(&f.events),
        vec![(id, DispatchAction::Enable), (id, DispatchAction::Delete)]
    );
}

#[test]
fn wake_for_disabled_reminder_is_dropped() {
    let f = fixture_at(local(19, 9, 0));
    let id = f
        .engine
        .create(&spec("Water", &[Weekday::Wed], 8, 0))
        .unwrap()
        .reminder
        .id;
    f.engine.set_enabled(id, false).unwrap();
    f.events.drain();

    f.engine.clock().set(local(21, 8, 0));
    assert_eq!(f.engine.on_wake(id).unwrap(), WakeOutcome::Stale);
    assert!(f.engine.trigger_for(id).is_none());
    assert!(f.events.drain().is_empty());
}

#[test]
fn elapsed_wake_fires_and_rearms_next_occurrence() {
    let f = fixture_at(local(19, 9, 0));
    let id = f
        .engine
        .create(&spec("Water", &[Weekday::Mon, Weekday::Wed, Weekday::Fri], 8, 0))
        .unwrap()
        .reminder
        .id;
    f.events.drain();

    // Delivered late by power saving.
    f.engine.clock().set(local(21, 11, 30));
    let due = f.timer.take_due(f.engine.clock().now_utc());
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].reminder_id, id);

    let outcome = f.engine.on_elapsed(id).unwrap();
    assert_eq!(
        outcome,
        WakeOutcome::Fired {
            next: ScheduleStatus::Armed {
                fire_at: utc(23, 8, 0)
            }
        }
    );
    let fired = f.events.drain();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].action, DispatchAction::Fire);
    assert_eq!(fired[0].occurred_at, utc(21, 11, 30));
    assert_one_trigger_per_enabled(&f);
}

#[test]
fn repeated_alarm_callbacks_leave_one_wake_request() {
    let f = fixture_at(local(19, 9, 0));
    let id = f
        .engine
        .create(&spec("Water", &[Weekday::Wed], 8, 0))
        .unwrap()
        .reminder
        .id;
    f.timer.drain_commands();

    // The host reports each alarm through `on_elapsed` only.
    let november_4 = zone()
        .with_ymd_and_hms(2026, 11, 4, 8, 0, 0)
        .unwrap()
        .with_timezone(&Utc);
    for (day, next) in [(21, utc(28, 8, 0)), (28, november_4)] {
        f.engine.clock().set(local(day, 8, 0));
        let outcome = f.engine.on_elapsed(id).unwrap();
        assert!(matches!(outcome, WakeOutcome::Fired { .. }));
        let wakes = f.timer.pending_for(id);
        assert_eq!(wakes.len(), 1);
        assert_eq!(wakes[0].fire_at, next);
    }

    assert_one_trigger_per_enabled(&f);
    assert!(f
        .timer
        .drain_commands()
        .iter()
        .all(|command| !matches!(command, WakeCommand::Cancel(_))));
}

#[test]
fn update_replaces_trigger_and_keeps_enable_state_events_quiet() {
    let f = fixture_at(local(19, 9, 0));
    let id = f
        .engine
        .create(&spec("Water", &[Weekday::Wed], 8, 0))
        .unwrap()
        .reminder
        .id;
    let old_handle = f.engine.trigger_for(id).unwrap().registration.handle();
    f.events.drain();

    let updated = f
        .engine
        .update(id, &spec("Water plants", &[Weekday::Tue], 18, 30))
        .unwrap();

    assert_eq!(updated.reminder.label, "Water plants");
    assert_eq!(updated.status.fire_at(), Some(utc(20, 18, 30)));
    assert_ne!(
        f.engine.trigger_for(id).unwrap().registration.handle(),
        old_handle
    );
    assert!(f.events.drain().is_empty());
    assert_one_trigger_per_enabled(&f);
}

#[test]
fn update_to_disabled_cancels_and_emits_disable() {
    let f = fixture_at(local(19, 9, 0));
    let id = f
        .engine
        .create(&spec("Water", &[Weekday::Wed], 8, 0))
        .unwrap()
        .reminder
        .id;
    f.events.drain();

    let mut disabled = spec("Water", &[Weekday::Wed], 8, 0);
    disabled.enabled = false;
    let updated = f.engine.update(id, &disabled).unwrap();

    assert_eq!(updated.status, ScheduleStatus::Unscheduled);
    assert_eq!(actions(&f.events), vec![(id, DispatchAction::Disable)]);
    assert_one_trigger_per_enabled(&f);
}

#[test]
fn invalid_time_is_rejected_with_field() {
    let f = fixture_at(local(19, 9, 0));
    let id = f
        .engine
        .create(&spec("Water", &[Weekday::Wed], 8, 0))
        .unwrap()
        .reminder
        .id;
    let before = f.engine.trigger_for(id);

    let err = f
        .engine
        .update(id, &spec("Water", &[Weekday::Wed], 25, 0))
        .unwrap_err();
    match err {
        EngineError::InvalidRule(rule_err) => {
            assert_eq!(rule_err, InvalidRuleError::HourOutOfRange(25));
            assert_eq!(rule_err.field().as_str(), "hour");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(f.engine.get(id).unwrap().unwrap().hour, 8);
    assert_eq!(f.engine.trigger_for(id), before);
}

#[test]
fn store_failure_leaves_registry_unchanged() {
    let f = fixture_at(local(19, 9, 0));
    let id = f
        .engine
        .create(&spec("Water", &[Weekday::Wed], 8, 0))
        .unwrap()
        .reminder
        .id;
    let before = f.engine.registry().snapshot();
    let pending_before = f.timer.pending();
    f.events.drain();

    f.store.fail_writes(true);
    let create_err = f
        .engine
        .create(&spec("Read", &[Weekday::Thu], 21, 0))
        .unwrap_err();
    assert!(matches!(create_err, EngineError::Store(ref err) if err.is_unavailable()));

    let update_err = f
        .engine
        .update(id, &spec("Water", &[Weekday::Fri], 9, 0))
        .unwrap_err();
    assert!(matches!(update_err, EngineError::Store(_)));
    assert!(f.engine.set_enabled(id, false).is_err());

    assert_eq!(f.engine.registry().snapshot(), before);
    assert_eq!(f.timer.pending(), pending_before);
    assert!(f.events.drain().is_empty());
}

#[test]
fn failed_delete_keeps_reminder_scheduled() {
    let f = fixture_at(local(19, 9, 0));
    let id = f
        .engine
        .create(&spec("Water", &[Weekday::Wed], 8, 0))
        .unwrap()
        .reminder
        .id;
    f.events.drain();

    f.store.fail_writes(true);
    assert!(matches!(f.engine.delete(id), Err(EngineError::Store(_))));

    assert!(f.engine.get(id).unwrap().is_some());
    assert_eq!(f.engine.trigger_for(id).unwrap().fire_at, utc(21, 8, 0));
    assert!(f.events.drain().is_empty());
    assert_one_trigger_per_enabled(&f);
}

#[test]
fn delete_of_unknown_reminder_is_not_found() {
    let f = fixture_at(local(19, 9, 0));
    assert!(matches!(
        f.engine.delete(ReminderId(77)),
        Err(EngineError::NotFound(ReminderId(77)))
    ));
    assert!(f.events.drain().is_empty());
}

#[test]
fn denied_permission_records_intent_without_wake_request() {
    let f = fixture_with(local(19, 9, 0), false, EngineConfig::default());
    let created = f
        .engine
        .create(&spec("Water", &[Weekday::Wed], 8, 0))
        .unwrap();

    assert_eq!(
        created.status,
        ScheduleStatus::Deferred {
            fire_at: utc(21, 8, 0)
        }
    );
    let trigger = f.engine.trigger_for(created.reminder.id).unwrap();
    assert_eq!(trigger.registration, Registration::Deferred);
    assert!(f.timer.pending().is_empty());

    f.permission.set_granted(true);
    let report = f.engine.reconcile().unwrap();
    assert_eq!(report.rearmed, vec![created.reminder.id]);
    assert_one_trigger_per_enabled(&f);
}

#[test]
fn denied_permission_can_arm_inexact_wake() {
    let config = EngineConfig {
        denied_permission_policy: DeniedPermissionPolicy::ArmInexact,
        ..EngineConfig::default()
    };
    let f = fixture_with(local(19, 9, 0), false, config);
    let id = f
        .engine
        .create(&spec("Water", &[Weekday::Wed], 8, 0))
        .unwrap()
        .reminder
        .id;

    let wakes = f.timer.pending_for(id);
    assert_eq!(wakes.len(), 1);
    assert_eq!(wakes[0].precision, WakePrecision::Inexact);

    // Unchanged permission: the inexact request stays.
    assert!(f.engine.reconcile().unwrap().is_noop());

    f.permission.set_granted(true);
    f.engine.reconcile().unwrap();
    let wakes = f.timer.pending_for(id);
    assert_eq!(wakes.len(), 1);
    assert_eq!(wakes[0].precision, WakePrecision::Exact);
    assert!(matches!(
        f.engine.trigger_for(id).unwrap().registration,
        Registration::Exact(_)
    ));
}

/// Disables the reminder through the store while `FIRE` is being delivered.
struct DisableOnFire {
    store: Arc<FlakyStore>,
}

impl DispatchGateway for DisableOnFire {
    fn notify(&self, event: &DispatchEvent) -> Result<(), DispatchError> {
        if event.action != DispatchAction::Fire {
            return Ok(());
        }
        let current = self
            .store
            .get(event.reminder_id)
            .map_err(|err| DispatchError::new(err.to_string()))?
            .ok_or_else(|| DispatchError::new("missing reminder"))?;
        let mut spec = current.spec();
        spec.enabled = false;
        self.store
            .upsert(Some(event.reminder_id), &spec)
            .map_err(|err| DispatchError::new(err.to_string()))?;
        Ok(())
    }
}

#[test]
fn disable_during_fire_completes_dispatch_without_rearm() {
    let f = fixture_at(local(19, 9, 0));
    f.engine.subscribe(Arc::new(DisableOnFire {
        store: f.store.clone(),
    }));
    let id = f
        .engine
        .create(&spec("Water", &[Weekday::Wed], 8, 0))
        .unwrap()
        .reminder
        .id;
    f.events.drain();

    f.engine.clock().set(local(21, 8, 0));
    assert_eq!(f.timer.take_due(f.engine.clock().now_utc()).len(), 1);
    let outcome = f.engine.on_elapsed(id).unwrap();

    assert_eq!(
        outcome,
        WakeOutcome::Fired {
            next: ScheduleStatus::Unscheduled
        }
    );
    assert_eq!(actions(&f.events), vec![(id, DispatchAction::Fire)]);
    assert!(f.engine.trigger_for(id).is_none());
    assert!(f.timer.pending_for(id).is_empty());
}

#[test]
fn concurrent_mutations_keep_one_trigger_per_enabled_reminder() {
    let f = fixture_at(local(19, 9, 0));
    let ids = (0..4)
        .map(|n| {
            f.engine
                .create(&spec(&format!("Habit {n}"), &[Weekday::Tue, Weekday::Sat], 7, n))
                .unwrap()
                .reminder
                .id
        })
        .collect::<Vec<_>>();

    std::thread::scope(|scope| {
        for (index, id) in ids.iter().copied().enumerate() {
            let engine = &f.engine;
            scope.spawn(move || {
                for round in 0..25 {
                    let enabled = (round + index) % 2 == 0;
                    engine.set_enabled(id, enabled).unwrap();
                    engine.on_wake(id).unwrap();
                }
            });
        }
        let engine = &f.engine;
        scope.spawn(move || {
            for _ in 0..25 {
                engine.reconcile().unwrap();
            }
        });
    });

    assert_one_trigger_per_enabled(&f);
    f.engine.clock().advance(Duration::minutes(1));
    assert!(f.engine.reconcile().unwrap().is_noop());
}
