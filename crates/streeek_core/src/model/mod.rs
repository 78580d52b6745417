//! Reminder domain model.
//!
//! # Responsibility
//! - Define the canonical reminder record and its recurrence rule.
//! - Keep presentation-side draft editing separate from engine inputs.
//!
//! # Invariants
//! - Every reminder is identified by a stable `ReminderId`.
//! - Weekday sets have set semantics; duplicates cannot be represented.

pub mod draft;
pub mod reminder;
