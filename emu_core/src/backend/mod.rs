//! # Backend Trait
//!
//! The common contract both backend implementations satisfy: the
//! socket-based backend (`qemu.rs`, driving a long-lived emulator process
//! over machine-control + remote-debug sockets) and the session-based
//! backend (`session.rs`, driving one short-lived process per operation).
//!
//! Every verb here mirrors a component from spec.md §4.4/§4.7. A verb the
//! active backend cannot support returns `EmuError::NotSupported` rather
//! than panicking or silently no-op'ing (§7).

#[cfg(feature = "qemu-backend")]
pub mod qemu;
#[cfg(feature = "session-backend")]
pub mod session;

use async_trait::async_trait;
use std::time::Duration;

use crate::address::Address;
use crate::breakpoint::{Breakpoint, BreakpointKind};
use crate::capture::{CaptureRequest, CaptureResult};
use crate::error::{EmuError, Result};
use crate::events::BackendEvent;
use crate::registers::RegisterFile;
use crate::snapshot::SnapshotHandle;
use crate::status::{BackendStatus, BackendStatusReport};

/// What a concrete backend is willing to do, queried by the broker before it
/// advertises operations over HTTP (§4.9 capability negotiation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub read_memory: bool,
    pub write_memory: bool,
    pub read_registers: bool,
    pub send_keys: bool,
    pub screenshot: bool,
    pub breakpoints: bool,
    pub pause_resume_step: bool,
    pub snapshots: bool,
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Short identifier used in status reports and artifact naming, e.g.
    /// `"qemu"` or `"session"`.
    fn kind(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    /// Current lifecycle/status snapshot; never blocks on the guest.
    async fn status(&self) -> BackendStatusReport;

    /// Launch a fresh guest process under this backend's control.
    async fn launch(&self) -> Result<()>;

    /// Attach to an already-running guest process (socket-based backend
    /// only; session-based backends have no persistent process to attach
    /// to and return `NotSupported`).
    async fn connect(&self) -> Result<()>;

    /// Tear down the connection without killing the guest process.
    async fn disconnect(&self) -> Result<()>;

    /// Tear down the connection and terminate the guest process.
    async fn shutdown(&self) -> Result<()>;

    async fn read_memory(&self, address: Address, len: usize) -> Result<Vec<u8>>;

    async fn write_memory(&self, address: Address, data: &[u8]) -> Result<()>;

    async fn read_registers(&self) -> Result<RegisterFile>;

    async fn send_key(&self, key: &str) -> Result<()>;

    async fn send_keys_sequence(&self, keys: &[String], delay_ms: Option<u64>) -> Result<()>;

    async fn screenshot(&self) -> Result<(Vec<u8>, crate::capture::ImageFormat)>;

    async fn save_snapshot(&self, name: &str) -> Result<SnapshotHandle>;

    async fn load_snapshot(&self, name: &str) -> Result<()>;

    async fn list_snapshots(&self) -> Result<Vec<SnapshotHandle>>;

    async fn set_breakpoint(
        &self,
        kind: BreakpointKind,
        address: Option<Address>,
        interrupt_number: Option<u8>,
        interrupt_sub_function: Option<u8>,
    ) -> Result<Breakpoint>;

    async fn remove_breakpoint(&self, id: u64) -> Result<()>;

    async fn list_breakpoints(&self) -> Result<Vec<Breakpoint>>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    async fn step(&self) -> Result<RegisterFile>;

    /// Waits for the breakpoint with the given id to be hit, per §4.8 step
    /// 3c. Backends with a live stop-event channel (the socket backend,
    /// over remote-debug) should override this to block on that channel and
    /// publish `BackendEvent::BreakpointHit` on success. The default here is
    /// the weak fallback for backends with no such channel: poll `status()`
    /// until it reports `Paused`, which only works if something else causes
    /// that transition.
    async fn wait_for_breakpoint_hit(&self, id: u64, timeout: Duration) -> Result<RegisterFile> {
        let _ = id;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.status().await.status == BackendStatus::Paused {
                return self.read_registers().await;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(EmuError::Timeout("breakpoint wait (status poll fallback)".into()));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Run a full capture per §4.8, composed out of the verbs above.
    async fn capture(&self, request: CaptureRequest) -> Result<CaptureResult>;

    /// Subscribe to this backend's event stream (§9).
    fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<BackendEvent>;

    fn pid(&self) -> Option<u32>;
}
