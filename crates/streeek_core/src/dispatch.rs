//! Dispatch events and gateway fan-out.
//!
//! # Responsibility
//! - Define the closed set of reminder actions delivered to the host.
//! - Fan events out to registered gateways, best-effort.
//!
//! # Invariants
//! - A failing gateway never blocks delivery to the others.
//! - Gateways must tolerate duplicates (reconciliation may re-deliver).

use crate::model::reminder::ReminderId;
use chrono::{DateTime, Utc};
use log::warn;
use parking_lot::{Mutex, RwLock};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchAction {
    Enable,
    Disable,
    Delete,
    Fire,
}

impl DispatchAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enable => "ENABLE",
            Self::Disable => "DISABLE",
            Self::Delete => "DELETE",
            Self::Fire => "FIRE",
        }
    }
}

impl Display for DispatchAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchEvent {
    pub reminder_id: ReminderId,
    pub action: DispatchAction,
    pub occurred_at: DateTime<Utc>,
}

impl DispatchEvent {
    pub fn new(reminder_id: ReminderId, action: DispatchAction, occurred_at: DateTime<Utc>) -> Self {
        Self {
            reminder_id,
            action,
            occurred_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchError {
    pub message: String,
}

impl DispatchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "dispatch failed: {}", self.message)
    }
}

impl Error for DispatchError {}

/// Receiver of reminder actions (notifications, UI state updates).
pub trait DispatchGateway: Send + Sync {
    fn notify(&self, event: &DispatchEvent) -> Result<(), DispatchError>;
}

/// Registered gateways.
#[derive(Default)]
pub struct DispatchHub {
    gateways: RwLock<Vec<Arc<dyn DispatchGateway>>>,
}

impl DispatchHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, gateway: Arc<dyn DispatchGateway>) {
        self.gateways.write().push(gateway);
    }

    pub fn len(&self) -> usize {
        self.gateways.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.read().is_empty()
    }

    /// Delivers `event` to every gateway; returns how many accepted it.
    pub fn emit(&self, event: DispatchEvent) -> usize {
        // Snapshot so a gateway may register another one while handling.
        let gateways = self.gateways.read().clone();
        let mut delivered = 0;
        for gateway in gateways {
            match gateway.notify(&event) {
                Ok(()) => delivered += 1,
                Err(err) => warn!(
                    "event=dispatch module=dispatch status=error reminder_id={} action={} error={}",
                    event.reminder_id, event.action, err
                ),
            }
        }
        delivered
    }
}

/// Gateway that buffers events for hosts that poll.
#[derive(Debug, Default)]
pub struct QueuedGateway {
    events: Mutex<Vec<DispatchEvent>>,
}

impl QueuedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns and clears buffered events in delivery order.
    pub fn drain(&self) -> Vec<DispatchEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn snapshot(&self) -> Vec<DispatchEvent> {
        self.events.lock().clone()
    }
}

impl DispatchGateway for QueuedGateway {
    fn notify(&self, event: &DispatchEvent) -> Result<(), DispatchError> {
        self.events.lock().push(*event);
        Ok(())
    }
}
