//! # Backend Status
//!
//! §3 invariant (1): a backend is either fully connected or fully
//! disconnected; partial states surface as `Error`, never as a half-up status.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    Disconnected,
    Launching,
    Running,
    Paused,
    Error,
}

/// Companion record carried alongside `BackendStatus` in the `status`
/// WebSocket channel and `GET /api/backend`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendStatusReport {
    pub backend: String,
    pub status: BackendStatus,
    pub pid: Option<u32>,
    /// Only meaningful for the socket-based backend: machine-control socket
    /// is connected.
    pub mc_connected: Option<bool>,
    /// Only meaningful for the socket-based backend: remote-debug stub is
    /// connected.
    pub rdbg_connected: Option<bool>,
}

impl BackendStatusReport {
    pub fn disconnected(backend: impl Into<String>) -> Self {
        BackendStatusReport {
            backend: backend.into(),
            status: BackendStatus::Disconnected,
            pid: None,
            mc_connected: None,
            rdbg_connected: None,
        }
    }
}
