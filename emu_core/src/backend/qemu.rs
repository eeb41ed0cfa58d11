//! # Socket-Based Backend
//!
//! Drives one long-lived emulator process over its machine-control and
//! remote-debug sockets (§4.4). All mutating operations run through a
//! single-lane executor (`tokio::sync::Mutex`-guarded inner state) so that,
//! for example, a capture in progress can never interleave with a
//! concurrently-issued snapshot load (§5).

use async_trait::async_trait;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};

use super::{Backend, Capabilities};
use crate::address::Address;
use crate::breakpoint::{Breakpoint, BreakpointKind};
use crate::capture::{CaptureRequest, CaptureResult, ImageFormat};
use crate::error::{EmuError, Result};
use crate::events::{BackendEvent, EventBus};
use crate::launcher::{self, LaunchConfig};
use crate::mc::MachineControlClient;
use crate::rdbg::RemoteDebugClient;
use crate::registers::RegisterFile;
use crate::snapshot::SnapshotHandle;
use crate::status::{BackendStatus, BackendStatusReport};

struct Connected {
    mc: MachineControlClient,
    rdbg: RemoteDebugClient,
    child: tokio::process::Child,
}

struct Inner {
    connected: Option<Connected>,
    status: BackendStatus,
    breakpoints: Vec<Breakpoint>,
}

/// The socket-based backend. Cheaply cloneable: the expensive state lives
/// behind the inner mutex and the event bus's internal `Arc`.
pub struct QemuBackend {
    config: LaunchConfig,
    inner: Arc<Mutex<Inner>>,
    events: EventBus,
    next_breakpoint_id: Arc<AtomicU64>,
}

impl QemuBackend {
    pub fn new(config: LaunchConfig) -> Self {
        QemuBackend {
            config,
            inner: Arc::new(Mutex::new(Inner {
                connected: None,
                status: BackendStatus::Disconnected,
                breakpoints: Vec::new(),
            })),
            events: EventBus::new(),
            next_breakpoint_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn set_status(&self, guard: &mut Inner, status: BackendStatus) {
        guard.status = status;
        self.events.publish(BackendEvent::Status { status });
    }

    async fn require_connected<'a>(
        &self,
        guard: &'a mut Inner,
    ) -> Result<&'a mut Connected> {
        guard
            .connected
            .as_mut()
            .ok_or_else(|| EmuError::Connection("backend is not connected".into()))
    }

    async fn attach(&self, guard: &mut Inner, child: tokio::process::Child) -> Result<()> {
        let socket_path = self
            .config
            .machine_control_socket
            .clone()
            .ok_or_else(|| EmuError::Argument("launch config has no machine-control socket".into()))?;
        let rdbg_port = self
            .config
            .remote_debug_port
            .ok_or_else(|| EmuError::Argument("launch config has no remote-debug port".into()))?;

        let (unsolicited_tx, mut unsolicited_rx) = mpsc::unbounded_channel();
        let mc = MachineControlClient::connect(&socket_path, unsolicited_tx)
            .await
            .map_err(EmuError::from)?;
        let rdbg = RemoteDebugClient::connect(&format!("127.0.0.1:{rdbg_port}"))
            .await
            .map_err(EmuError::from)?;

        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(message) = unsolicited_rx.recv().await {
                republish_unsolicited_event(&events, &message);
            }
        });

        guard.connected = Some(Connected { mc, rdbg, child });
        self.set_status(guard, BackendStatus::Running);
        Ok(())
    }
}

/// Maps a raw QMP out-of-band event onto the backend's typed `EventBus`.
/// `STOP`/`RESUME` are QEMU's own async notifications that the guest halted
/// or resumed outside of a request this client issued (e.g. the operator
/// paused from the QEMU monitor directly); anything else is logged and
/// dropped rather than forwarded as a fabricated event variant.
fn republish_unsolicited_event(events: &EventBus, message: &serde_json::Value) {
    match message.get("event").and_then(|v| v.as_str()) {
        Some("STOP") => events.publish(BackendEvent::Status {
            status: BackendStatus::Paused,
        }),
        Some("RESUME") => events.publish(BackendEvent::Status {
            status: BackendStatus::Running,
        }),
        Some(other) => tracing::debug!(event = other, "unhandled machine-control event"),
        None => tracing::debug!(?message, "unsolicited machine-control message with no event tag"),
    }
}

#[async_trait]
impl Backend for QemuBackend {
    fn kind(&self) -> &'static str {
        "qemu"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            read_memory: true,
            write_memory: true,
            read_registers: true,
            send_keys: true,
            screenshot: true,
            breakpoints: true,
            pause_resume_step: true,
            snapshots: true,
        }
    }

    async fn status(&self) -> BackendStatusReport {
        let guard = self.inner.lock().await;
        BackendStatusReport {
            backend: self.kind().to_string(),
            status: guard.status,
            pid: guard.connected.as_ref().and_then(|c| c.child.id()),
            mc_connected: Some(guard.connected.is_some()),
            rdbg_connected: Some(guard.connected.is_some()),
        }
    }

    async fn launch(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        if guard.connected.is_some() {
            return Err(EmuError::Connection("already connected".into()));
        }
        self.set_status(&mut guard, BackendStatus::Launching);
        let child = launcher::launch(&self.config).await.map_err(EmuError::from)?;
        self.attach(&mut guard, child).await
    }

    async fn connect(&self) -> Result<()> {
        Err(EmuError::not_supported(
            "connect-to-running is not yet implemented for the socket backend",
        ))
    }

    async fn disconnect(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        guard.connected = None;
        self.set_status(&mut guard, BackendStatus::Disconnected);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        if let Some(connected) = guard.connected.as_mut() {
            let _ = connected.mc.quit().await;
            let _ = connected.child.kill().await;
        }
        guard.connected = None;
        guard.breakpoints.clear();
        self.set_status(&mut guard, BackendStatus::Disconnected);
        Ok(())
    }

    async fn read_memory(&self, address: Address, len: usize) -> Result<Vec<u8>> {
        let mut guard = self.inner.lock().await;
        let connected = self.require_connected(&mut guard).await?;
        connected
            .rdbg
            .read_memory(address.linear, len)
            .await
            .map_err(EmuError::from)
    }

    async fn write_memory(&self, address: Address, data: &[u8]) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let connected = self.require_connected(&mut guard).await?;
        connected
            .rdbg
            .write_memory(address.linear, data)
            .await
            .map_err(EmuError::from)
    }

    async fn read_registers(&self) -> Result<RegisterFile> {
        let mut guard = self.inner.lock().await;
        let connected = self.require_connected(&mut guard).await?;
        connected.rdbg.read_registers().await.map_err(EmuError::from)
    }

    async fn send_key(&self, key: &str) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let connected = self.require_connected(&mut guard).await?;
        connected.mc.send_key(key).await.map_err(EmuError::from)
    }

    async fn send_keys_sequence(&self, keys: &[String], delay_ms: Option<u64>) -> Result<()> {
        for key in keys {
            self.send_key(key).await?;
            if let Some(ms) = delay_ms {
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            }
        }
        Ok(())
    }

    async fn screenshot(&self) -> Result<(Vec<u8>, ImageFormat)> {
        let path = format!("/tmp/emu-screenshot-{}.ppm", uuid::Uuid::new_v4());
        {
            let mut guard = self.inner.lock().await;
            let connected = self.require_connected(&mut guard).await?;
            connected.mc.screendump(&path).await.map_err(EmuError::from)?;
        }
        let bytes = tokio::fs::read(&path).await.map_err(EmuError::Io)?;
        let _ = tokio::fs::remove_file(&path).await;
        Ok((bytes, ImageFormat::Ppm))
    }

    async fn save_snapshot(&self, name: &str) -> Result<SnapshotHandle> {
        let mut guard = self.inner.lock().await;
        let connected = self.require_connected(&mut guard).await?;
        connected.mc.save_snapshot(name).await.map_err(EmuError::from)?;
        Ok(SnapshotHandle::named(name, self.kind()))
    }

    /// Ordering per §5 guarantee 2: breakpoint table is cleared and a
    /// `snapshot-loading` event fires before the machine-control request is
    /// issued; `snapshot-loaded`/`snapshot-load-failed` fires strictly after.
    async fn load_snapshot(&self, name: &str) -> Result<()> {
        let mut guard = self.inner.lock().await;
        guard.breakpoints.clear();
        self.events.publish(BackendEvent::SnapshotLoading {
            name: name.to_string(),
        });
        let connected = self.require_connected(&mut guard).await?;
        match connected.mc.load_snapshot(name).await {
            Ok(()) => {
                self.events.publish(BackendEvent::SnapshotLoaded {
                    name: name.to_string(),
                });
                Ok(())
            }
            Err(e) => {
                self.events.publish(BackendEvent::SnapshotLoadFailed {
                    name: name.to_string(),
                    message: e.to_string(),
                });
                Err(EmuError::from(e))
            }
        }
    }

    async fn list_snapshots(&self) -> Result<Vec<SnapshotHandle>> {
        let raw = {
            let mut guard = self.inner.lock().await;
            let connected = self.require_connected(&mut guard).await?;
            connected.mc.list_snapshots_raw().await.map_err(EmuError::from)?
        };
        Ok(parse_snapshot_table(&raw, self.kind()))
    }

    async fn set_breakpoint(
        &self,
        kind: BreakpointKind,
        address: Option<Address>,
        interrupt_number: Option<u8>,
        interrupt_sub_function: Option<u8>,
    ) -> Result<Breakpoint> {
        if kind != BreakpointKind::Execution {
            return Err(EmuError::not_supported(
                "only execution breakpoints are supported by the socket backend",
            ));
        }
        let address = address.ok_or_else(|| {
            EmuError::argument("an execution breakpoint requires an address")
        })?;
        let mut guard = self.inner.lock().await;
        let connected = self.require_connected(&mut guard).await?;
        connected
            .rdbg
            .set_execution_breakpoint(address.linear)
            .await
            .map_err(EmuError::from)?;
        let id = self.next_breakpoint_id.fetch_add(1, Ordering::SeqCst);
        let breakpoint = Breakpoint {
            id,
            kind,
            address: Some(address),
            interrupt_number,
            interrupt_sub_function,
            enabled: true,
        };
        guard.breakpoints.push(breakpoint.clone());
        Ok(breakpoint)
    }

    async fn remove_breakpoint(&self, id: u64) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let position = guard
            .breakpoints
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| EmuError::Argument(format!("no breakpoint with id {id}")))?;
        let breakpoint = guard.breakpoints.remove(position);
        if let Some(address) = breakpoint.address {
            let connected = self.require_connected(&mut guard).await?;
            connected
                .rdbg
                .remove_execution_breakpoint(address.linear)
                .await
                .map_err(EmuError::from)?;
        }
        Ok(())
    }

    async fn list_breakpoints(&self) -> Result<Vec<Breakpoint>> {
        let guard = self.inner.lock().await;
        Ok(guard.breakpoints.clone())
    }

    async fn pause(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let connected = self.require_connected(&mut guard).await?;
        connected.mc.pause().await.map_err(EmuError::from)?;
        self.set_status(&mut guard, BackendStatus::Paused);
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let connected = self.require_connected(&mut guard).await?;
        connected.mc.resume().await.map_err(EmuError::from)?;
        self.set_status(&mut guard, BackendStatus::Running);
        Ok(())
    }

    /// Single-steps over remote-debug, then reads registers back and emits
    /// `step-complete` per §5 guarantee 3 (register snapshot immediately
    /// follows the stop condition).
    async fn step(&self) -> Result<RegisterFile> {
        let mut guard = self.inner.lock().await;
        let connected = self.require_connected(&mut guard).await?;
        connected.rdbg.single_step().await.map_err(EmuError::from)?;
        connected
            .rdbg
            .wait_for_stop(std::time::Duration::from_secs(10))
            .await
            .map_err(EmuError::from)?;
        let registers = connected.rdbg.read_registers().await.map_err(EmuError::from)?;
        self.events.publish(BackendEvent::StepComplete {
            registers: registers.clone(),
        });
        Ok(registers)
    }

    /// Overrides the default poll-based fallback: blocks on the remote-debug
    /// stop-reply packet (the live stop channel this backend has), then
    /// publishes `BreakpointHit` with the register snapshot taken
    /// immediately after, per §5 ordering guarantee 3.
    async fn wait_for_breakpoint_hit(&self, id: u64, timeout: std::time::Duration) -> Result<RegisterFile> {
        let mut guard = self.inner.lock().await;
        let connected = self.require_connected(&mut guard).await?;
        connected.rdbg.wait_for_stop(timeout).await.map_err(EmuError::from)?;
        let registers = connected.rdbg.read_registers().await.map_err(EmuError::from)?;
        self.set_status(&mut guard, BackendStatus::Paused);
        self.events.publish(BackendEvent::BreakpointHit {
            id,
            registers: registers.clone(),
        });
        Ok(registers)
    }

    async fn capture(&self, request: CaptureRequest) -> Result<CaptureResult> {
        crate::capture_pipeline::run_capture(self, request).await
    }

    fn subscribe_events(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }

    fn pid(&self) -> Option<u32> {
        None
    }
}

/// Parses `info snapshots` monitor output. Lines look like:
/// ```text
/// ID        TAG                 VM SIZE                DATE       VM CLOCK
/// 1         boot                 12M 2024-01-01 00:00:00   00:00:00.000
/// ```
fn parse_snapshot_table(raw: &str, backend: &str) -> Vec<SnapshotHandle> {
    let row = Regex::new(r"^\s*\d+\s+(\S+)\s").expect("valid regex");
    raw.lines()
        .filter_map(|line| row.captures(line))
        .map(|caps| SnapshotHandle::named(caps[1].to_string(), backend))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_snapshot_table_rows() {
        let raw = "ID        TAG                 VM SIZE                DATE       VM CLOCK\n\
                   1         boot                 12M 2024-01-01 00:00:00   00:00:00.000\n\
                   2         mid-level            20M 2024-01-02 00:00:00   00:01:00.000\n";
        let handles = parse_snapshot_table(raw, "qemu");
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].name, "boot");
        assert_eq!(handles[1].name, "mid-level");
    }

    #[test]
    fn ignores_header_row() {
        let raw = "ID        TAG                 VM SIZE                DATE       VM CLOCK\n";
        assert!(parse_snapshot_table(raw, "qemu").is_empty());
    }
}
