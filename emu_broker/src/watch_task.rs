//! # Watch Poller
//!
//! A single background task that, on a tick, reads every registered watch's
//! region, checksums it, and records the update if it changed. There is
//! deliberately one task for all watches rather than one per watch: the
//! watched regions are typically small and this keeps them serialized
//! through the backend's own single-lane executor instead of contending
//! with each other.

use std::time::Duration;

use crate::state::SharedState;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn spawn(state: SharedState) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            let Ok(backend) = state.holder.get().await else {
                continue;
            };
            let mut watches = state.watches.lock().await;
            let mut dead = Vec::new();
            for watch in watches.values_mut() {
                let address = watch.request.address;
                let len = watch.request.len;
                match backend.read_memory(address, len).await {
                    Ok(bytes) => {
                        let checksum = checksum_hex(&bytes);
                        if watch.observe(checksum.clone()) {
                            tracing::debug!(watch_id = watch.request.id, "watch changed");
                            let update = emu_core::watch::WatchUpdate {
                                id: watch.request.id,
                                checksum,
                                bytes,
                            };
                            if watch.updates.send(update).is_err() {
                                dead.push(watch.request.id);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(watch_id = watch.request.id, error = %e, "watch poll failed");
                    }
                }
            }
            for id in dead {
                watches.remove(&id);
            }
        }
    });
}

fn checksum_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
