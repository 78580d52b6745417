//! Reminder domain model.
//!
//! # Responsibility
//! - Define the canonical reminder record persisted by stores.
//! - Define the recurrence rule (`repeat_days`, `hour`, `minute`) and its
//!   validation.
//!
//! # Invariants
//! - `id` is stable and never reused for another reminder.
//! - A valid rule has at least one weekday, `hour <= 23` and `minute <= 59`.
//! - Label length is a submit-boundary concern (see `model::draft`), never
//!   checked here.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

const ALL_WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Stable identifier of a reminder, unique across a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReminderId(pub i64);

impl ReminderId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl Display for ReminderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ReminderId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Rule field that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleField {
    RepeatDays,
    Hour,
    Minute,
}

impl RuleField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RepeatDays => "repeat_days",
            Self::Hour => "hour",
            Self::Minute => "minute",
        }
    }
}

/// Rejection of a recurrence rule at the mutation boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidRuleError {
    /// No weekday selected.
    EmptyRepeatDays,
    /// Hour outside `0..=23`.
    HourOutOfRange(u8),
    /// Minute outside `0..=59`.
    MinuteOutOfRange(u8),
    /// Weekday number outside ISO `1..=7`.
    UnknownWeekday(u8),
    /// No local instant matched the rule; only reachable at the edge of the
    /// representable calendar.
    Unschedulable,
}

impl InvalidRuleError {
    /// Returns the field at fault.
    pub fn field(&self) -> RuleField {
        match self {
            Self::EmptyRepeatDays | Self::UnknownWeekday(_) | Self::Unschedulable => {
                RuleField::RepeatDays
            }
            Self::HourOutOfRange(_) => RuleField::Hour,
            Self::MinuteOutOfRange(_) => RuleField::Minute,
        }
    }
}

impl Display for InvalidRuleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyRepeatDays => write!(f, "repeat_days must contain at least one weekday"),
            Self::HourOutOfRange(value) => write!(f, "hour must be within 0..=23, got {value}"),
            Self::MinuteOutOfRange(value) => {
                write!(f, "minute must be within 0..=59, got {value}")
            }
            Self::UnknownWeekday(value) => {
                write!(f, "weekday number must be within 1..=7, got {value}")
            }
            Self::Unschedulable => write!(f, "no future instant matches the recurrence rule"),
        }
    }
}

impl Error for InvalidRuleError {}

/// Set of weekdays stored as a 7-bit mask (Monday is bit 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const EMPTY: Self = Self(0);
    pub const EVERY_DAY: Self = Self(0b111_1111);

    pub fn new() -> Self {
        Self::EMPTY
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & bit(day) != 0
    }

    pub fn insert(&mut self, day: Weekday) -> bool {
        let was_present = self.contains(day);
        self.0 |= bit(day);
        !was_present
    }

    pub fn remove(&mut self, day: Weekday) -> bool {
        let was_present = self.contains(day);
        self.0 &= !bit(day);
        was_present
    }

    /// Adds `day` when absent, removes it when present.
    pub fn toggle(&mut self, day: Weekday) {
        self.0 ^= bit(day);
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterates members from Monday to Sunday.
    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        ALL_WEEKDAYS
            .into_iter()
            .filter(move |day| self.contains(*day))
    }

    /// Raw bitmask, Monday is bit 0.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Builds a set from a raw bitmask, ignoring bits above Sunday.
    pub fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::EVERY_DAY.0)
    }

    /// Parses ISO weekday numbers (Monday = 1 ... Sunday = 7).
    ///
    /// Duplicates collapse; order is irrelevant.
    pub fn from_iso_numbers(numbers: &[u8]) -> Result<Self, InvalidRuleError> {
        let mut set = Self::EMPTY;
        for number in numbers {
            set.insert(weekday_from_iso(*number)?);
        }
        Ok(set)
    }

    /// Returns ISO weekday numbers in ascending order.
    pub fn to_iso_numbers(self) -> Vec<u8> {
        self.iter()
            .map(|day| day.number_from_monday() as u8)
            .collect()
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl TryFrom<Vec<u8>> for WeekdaySet {
    type Error = InvalidRuleError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_iso_numbers(&value)
    }
}

impl From<WeekdaySet> for Vec<u8> {
    fn from(value: WeekdaySet) -> Self {
        value.to_iso_numbers()
    }
}

impl Display for WeekdaySet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names = self.iter().map(|day| day.to_string()).collect::<Vec<_>>();
        write!(f, "{}", names.join(","))
    }
}

/// Parses one ISO weekday number.
pub fn weekday_from_iso(number: u8) -> Result<Weekday, InvalidRuleError> {
    match number {
        1..=7 => Ok(ALL_WEEKDAYS[usize::from(number - 1)]),
        other => Err(InvalidRuleError::UnknownWeekday(other)),
    }
}

fn bit(day: Weekday) -> u8 {
    1 << day.num_days_from_monday()
}

/// Validated `(repeat_days, hour, minute)` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecurrenceRule {
    repeat_days: WeekdaySet,
    hour: u8,
    minute: u8,
}

impl RecurrenceRule {
    /// Builds a rule, rejecting empty day sets and out-of-range times.
    pub fn new(repeat_days: WeekdaySet, hour: u8, minute: u8) -> Result<Self, InvalidRuleError> {
        if repeat_days.is_empty() {
            return Err(InvalidRuleError::EmptyRepeatDays);
        }
        if hour > 23 {
            return Err(InvalidRuleError::HourOutOfRange(hour));
        }
        if minute > 59 {
            return Err(InvalidRuleError::MinuteOutOfRange(minute));
        }
        Ok(Self {
            repeat_days,
            hour,
            minute,
        })
    }

    pub fn repeat_days(&self) -> WeekdaySet {
        self.repeat_days
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }
}

/// User-facing reminder fields without identity.
///
/// This is what the engine receives on `create`/`update`; it is expected to be
/// fully formed (see `ReminderDraft::submit`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderSpec {
    pub label: String,
    pub repeat_days: WeekdaySet,
    pub hour: u8,
    pub minute: u8,
    pub enabled: bool,
}

impl ReminderSpec {
    pub fn rule(&self) -> Result<RecurrenceRule, InvalidRuleError> {
        RecurrenceRule::new(self.repeat_days, self.hour, self.minute)
    }
}

/// Canonical persisted reminder record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: ReminderId,
    pub label: String,
    pub repeat_days: WeekdaySet,
    pub enabled: bool,
    pub hour: u8,
    pub minute: u8,
}

impl Reminder {
    /// Combines an identity with user fields.
    pub fn from_spec(id: ReminderId, spec: &ReminderSpec) -> Self {
        Self {
            id,
            label: spec.label.clone(),
            repeat_days: spec.repeat_days,
            enabled: spec.enabled,
            hour: spec.hour,
            minute: spec.minute,
        }
    }

    /// Returns the user fields of this record.
    pub fn spec(&self) -> ReminderSpec {
        ReminderSpec {
            label: self.label.clone(),
            repeat_days: self.repeat_days,
            hour: self.hour,
            minute: self.minute,
            enabled: self.enabled,
        }
    }

    pub fn rule(&self) -> Result<RecurrenceRule, InvalidRuleError> {
        RecurrenceRule::new(self.repeat_days, self.hour, self.minute)
    }
}
