//! Trigger computation and bookkeeping.
//!
//! # Responsibility
//! - Compute the next instant matching a recurrence rule (`recurrence`).
//! - Track the single outstanding trigger per reminder (`registry`).
//! - Describe the external wake-timer and permission collaborators
//!   (`wake_timer`).

pub mod recurrence;
pub mod registry;
pub mod wake_timer;
