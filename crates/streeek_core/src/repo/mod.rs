//! Reminder persistence contracts and implementations.
//!
//! # Responsibility
//! - Define the store contract the scheduling engine depends on.
//! - Isolate SQLite details from engine orchestration.
//!
//! # Invariants
//! - Store failures are returned to callers, never retried here.

pub mod memory_repo;
pub mod reminder_repo;
pub mod sqlite_repo;
