//! # Backend Events
//!
//! §9 "event emitter on the backend" re-architected as a typed broadcast
//! channel per §4's named events, instead of a generic `emit(name, payload)`
//! callback. The broker subscribes at attach time (when a backend is placed
//! in the holder) and fans each event out to the WebSocket channels that care
//! about it (`status`, `debug`, `capture`).

use crate::registers::RegisterFile;
use crate::status::BackendStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// The set of events a backend may emit, named directly after §9's list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum BackendEvent {
    /// A bare status transition, independent of the richer snapshot events
    /// below.
    Status { status: BackendStatus },
    /// Emitted strictly before the snapshot-load machine-control request is
    /// issued (§5 ordering guarantee 2).
    SnapshotLoading { name: String },
    /// Emitted strictly after a successful load response.
    SnapshotLoaded { name: String },
    /// Emitted strictly after a failed load response, before the error is
    /// re-raised to the caller (§7).
    SnapshotLoadFailed { name: String, message: String },
    /// An execution breakpoint was hit. Carries the register snapshot taken
    /// immediately afterward, per §5 ordering guarantee 3.
    BreakpointHit { id: u64, registers: RegisterFile },
    /// A single-step request completed.
    StepComplete { registers: RegisterFile },
}

/// Capacity for the broadcast channel backing each backend's event stream.
/// Generous enough that a burst of snapshot/breakpoint events between two
/// broker polls is never dropped under normal operation; lagging receivers
/// still degrade gracefully (`RecvError::Lagged`) rather than blocking the
/// backend.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Owns the send half of a backend's event broadcast; every `subscribe()`
/// call hands out an independent receiver, matching one subscriber per
/// attached WebSocket connection.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BackendEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        EventBus { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.tx.subscribe()
    }

    /// Best-effort publish; a `SendError` just means nobody is currently
    /// listening, which is not a failure for the backend itself.
    pub fn publish(&self, event: BackendEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
