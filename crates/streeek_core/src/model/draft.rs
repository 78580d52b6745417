//! Reminder editing draft.
//!
//! # Responsibility
//! - Buffer in-progress edits from the reminder sheet (label, days, time).
//! - Decide when the submit action is available.
//! - Convert a finished draft into a `ReminderSpec` at submit time.
//!
//! # Invariants
//! - The scheduling engine never sees a draft, only submitted specs.
//! - Submitted labels are trimmed and longer than `MIN_LABEL_CHARS`.

use crate::model::reminder::{Reminder, ReminderSpec, WeekdaySet};
use chrono::Weekday;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Labels must be strictly longer than this many characters.
pub const MIN_LABEL_CHARS: usize = 3;

/// Submit-boundary validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftError {
    LabelTooShort { min_exclusive: usize },
    NoDaysSelected,
    TimeNotSelected,
    HourOutOfRange(u8),
    MinuteOutOfRange(u8),
}

impl DraftError {
    /// Returns the draft field at fault.
    pub fn field(&self) -> &'static str {
        match self {
            Self::LabelTooShort { .. } => "label",
            Self::NoDaysSelected => "repeat_days",
            Self::TimeNotSelected => "time",
            Self::HourOutOfRange(_) => "hour",
            Self::MinuteOutOfRange(_) => "minute",
        }
    }
}

impl Display for DraftError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LabelTooShort { min_exclusive } => {
                write!(f, "label must be longer than {min_exclusive} characters")
            }
            Self::NoDaysSelected => write!(f, "select at least one day"),
            Self::TimeNotSelected => write!(f, "select a time"),
            Self::HourOutOfRange(value) => write!(f, "hour must be within 0..=23, got {value}"),
            Self::MinuteOutOfRange(value) => {
                write!(f, "minute must be within 0..=59, got {value}")
            }
        }
    }
}

impl Error for DraftError {}

/// Editable buffer behind the create/edit reminder sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReminderDraft {
    label: String,
    days: WeekdaySet,
    hour: Option<u8>,
    minute: Option<u8>,
    original: Option<Reminder>,
}

impl ReminderDraft {
    /// Empty draft for a new reminder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Draft pre-filled from an existing reminder.
    pub fn from_reminder(reminder: &Reminder) -> Self {
        Self {
            label: reminder.label.clone(),
            days: reminder.repeat_days,
            hour: Some(reminder.hour),
            minute: Some(reminder.minute),
            original: Some(reminder.clone()),
        }
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn toggle_day(&mut self, day: Weekday) {
        self.days.toggle(day);
    }

    pub fn set_days(&mut self, days: WeekdaySet) {
        self.days = days;
    }

    pub fn set_time(&mut self, hour: u8, minute: u8) {
        self.hour = Some(hour);
        self.minute = Some(minute);
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn days(&self) -> WeekdaySet {
        self.days
    }

    pub fn time(&self) -> Option<(u8, u8)> {
        Some((self.hour?, self.minute?))
    }

    /// The reminder this draft edits, if any.
    pub fn original(&self) -> Option<&Reminder> {
        self.original.as_ref()
    }

    /// Whether the submit action should be offered.
    ///
    /// - Editing: any of label, days, hour or minute differs from the original.
    /// - Creating: the label is long enough, a day is selected and a time is
    ///   picked.
    pub fn can_submit(&self) -> bool {
        match &self.original {
            Some(original) => {
                self.label != original.label
                    || self.days != original.repeat_days
                    || self.hour != Some(original.hour)
                    || self.minute != Some(original.minute)
            }
            None => self.validate().is_ok(),
        }
    }

    /// Converts the draft into a fully formed spec.
    ///
    /// New reminders are enabled; edits keep the original enabled flag.
    pub fn submit(&self) -> Result<ReminderSpec, DraftError> {
        let (hour, minute) = self.validate()?;
        Ok(ReminderSpec {
            label: self.label.trim().to_string(),
            repeat_days: self.days,
            hour,
            minute,
            enabled: self.original.as_ref().map_or(true, |original| original.enabled),
        })
    }

    fn validate(&self) -> Result<(u8, u8), DraftError> {
        if self.label.trim().chars().count() <= MIN_LABEL_CHARS {
            return Err(DraftError::LabelTooShort {
                min_exclusive: MIN_LABEL_CHARS,
            });
        }
        if self.days.is_empty() {
            return Err(DraftError::NoDaysSelected);
        }
        let (hour, minute) = self.time().ok_or(DraftError::TimeNotSelected)?;
        if hour > 23 {
            return Err(DraftError::HourOutOfRange(hour));
        }
        if minute > 59 {
            return Err(DraftError::MinuteOutOfRange(minute));
        }
        Ok((hour, minute))
    }
}
