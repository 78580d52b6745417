//! Next-occurrence calculation for weekday + time-of-day rules.
//!
//! # Invariants
//! - The returned instant is strictly after `from`.
//! - Day stepping uses calendar arithmetic on the civil date of `from`.
//! - A local time skipped by a forward DST transition moves to the next valid
//!   local minute; a repeated local time resolves to its earliest instant.

use crate::model::reminder::{InvalidRuleError, RecurrenceRule, WeekdaySet};
use chrono::{DateTime, Datelike, Days, Duration, NaiveDateTime, TimeZone};

/// Seven days cover every weekday once; the eighth re-visits the weekday of
/// `from` for the "today's slot already passed" case.
const MAX_DAY_OFFSET: u64 = 7;
/// Longest forward transition searched when a local time does not exist.
const MAX_GAP_MINUTES: u32 = 24 * 60;

/// Returns the first instant after `from` matching the rule.
///
/// # Errors
/// - `InvalidRuleError` when `repeat_days` is empty or the time is out of
///   range.
pub fn next_occurrence<Tz: TimeZone>(
    repeat_days: WeekdaySet,
    hour: u8,
    minute: u8,
    from: &DateTime<Tz>,
) -> Result<DateTime<Tz>, InvalidRuleError> {
    let rule = RecurrenceRule::new(repeat_days, hour, minute)?;
    next_for_rule(&rule, from)
}

/// Same as [`next_occurrence`] for an already validated rule.
pub fn next_for_rule<Tz: TimeZone>(
    rule: &RecurrenceRule,
    from: &DateTime<Tz>,
) -> Result<DateTime<Tz>, InvalidRuleError> {
    let zone = from.timezone();
    let start_date = from.naive_local().date();

    for offset in 0..=MAX_DAY_OFFSET {
        let Some(day) = start_date.checked_add_days(Days::new(offset)) else {
            break;
        };
        if !rule.repeat_days().contains(day.weekday()) {
            continue;
        }
        let Some(local) = day.and_hms_opt(u32::from(rule.hour()), u32::from(rule.minute()), 0)
        else {
            continue;
        };
        if let Some(candidate) = resolve_local(&zone, local) {
            if candidate > *from {
                return Ok(candidate);
            }
        }
    }

    Err(InvalidRuleError::Unschedulable)
}

/// Maps a civil date-time to an instant following the DST policy.
fn resolve_local<Tz: TimeZone>(zone: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    if let Some(instant) = zone.from_local_datetime(&local).earliest() {
        return Some(instant);
    }

    let mut shifted = local;
    for _ in 0..MAX_GAP_MINUTES {
        shifted = shifted.checked_add_signed(Duration::minutes(1))?;
        if let Some(instant) = zone.from_local_datetime(&shifted).earliest() {
            return Some(instant);
        }
    }
    None
}
