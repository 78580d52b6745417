//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store, registry and dispatch into reminder use-cases.
//! - Keep FFI/UI layers decoupled from storage and wake-timer details.

pub mod reconcile;
pub mod reminder_engine;
