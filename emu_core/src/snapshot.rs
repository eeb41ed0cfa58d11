//! # Snapshot Handle
//!
//! A backend-owned save of the guest's full state, restorable by name (see
//! GLOSSARY). The optional fields are populated on a best-effort basis: the
//! socket-based backend's `info snapshots` text dump only reliably gives a
//! name; size/modified-time/path come from whatever the backend can observe
//! on disk.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotHandle {
    pub name: String,
    pub backend: String,
    pub size: Option<u64>,
    pub modified_unix_ms: Option<i64>,
    pub path: Option<String>,
}

impl SnapshotHandle {
    pub fn named(name: impl Into<String>, backend: impl Into<String>) -> Self {
        SnapshotHandle {
            name: name.into(),
            backend: backend.into(),
            size: None,
            modified_unix_ms: None,
            path: None,
        }
    }
}
