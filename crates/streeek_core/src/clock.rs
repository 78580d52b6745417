//! Time sources for the scheduling engine.
//!
//! Recurrence is evaluated in the civil calendar of the clock's zone; the
//! engine stores absolute instants as UTC.

use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use parking_lot::Mutex;

/// Source of "now" in the user's civil calendar.
pub trait Clock: Send + Sync {
    type Zone: TimeZone;

    fn now(&self) -> DateTime<Self::Zone>;

    fn now_utc(&self) -> DateTime<Utc> {
        self.now().with_timezone(&Utc)
    }
}

/// Device clock in the local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Zone = Local;

    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Manually driven clock for deterministic scheduling.
#[derive(Debug)]
pub struct ManualClock<Tz: TimeZone> {
    zone: Tz,
    now: Mutex<DateTime<Utc>>,
}

impl<Tz: TimeZone> ManualClock<Tz> {
    pub fn new(start: DateTime<Tz>) -> Self {
        Self {
            zone: start.timezone(),
            now: Mutex::new(start.with_timezone(&Utc)),
        }
    }

    pub fn set(&self, instant: DateTime<Tz>) {
        *self.now.lock() = instant.with_timezone(&Utc);
    }

    pub fn set_utc(&self, instant: DateTime<Utc>) {
        *self.now.lock() = instant;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl<Tz> Clock for ManualClock<Tz>
where
    Tz: TimeZone + Send + Sync,
{
    type Zone = Tz;

    fn now(&self) -> DateTime<Tz> {
        self.now.lock().with_timezone(&self.zone)
    }
}
