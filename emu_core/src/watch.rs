//! # Memory Watches
//!
//! A caller-registered region the broker polls on a fixed interval and
//! reports over the `watch` WebSocket channel whenever its checksum changes
//! (§3). Watches are broker-side bookkeeping, not something a backend needs
//! to know about: they are implemented purely as repeated `read_memory`
//! calls plus a stored checksum.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::address::Address;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchRequest {
    pub id: u64,
    pub address: Address,
    pub len: usize,
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchUpdate {
    pub id: u64,
    pub checksum: String,
    pub bytes: Vec<u8>,
}

/// Tracks the last-seen checksum for one registered watch so the poller can
/// tell whether anything actually changed before publishing an update, plus
/// the channel back to the WebSocket connection that registered it.
pub struct WatchState {
    pub request: WatchRequest,
    pub last_checksum: Option<String>,
    pub updates: mpsc::UnboundedSender<WatchUpdate>,
}

impl WatchState {
    pub fn new(request: WatchRequest, updates: mpsc::UnboundedSender<WatchUpdate>) -> Self {
        WatchState {
            request,
            last_checksum: None,
            updates,
        }
    }

    /// Returns `true` (and records the new checksum) if `checksum` differs
    /// from the last one observed.
    pub fn observe(&mut self, checksum: String) -> bool {
        let changed = self.last_checksum.as_deref() != Some(checksum.as_str());
        if changed {
            self.last_checksum = Some(checksum);
        }
        changed
    }
}
