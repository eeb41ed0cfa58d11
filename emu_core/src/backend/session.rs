//! # Session-Based Backend
//!
//! Drives one short-lived emulator process per operation: write a session
//! config and a debug-command script, spawn, wait for exit, harvest
//! whatever the run produced (§4.7). There is no persistent connection, so
//! anything that needs one — breakpoints that survive across calls, pause
//! and resume, live snapshot save/load, a synchronous screenshot — is
//! `NotSupported` here even though the socket backend can do it.

use async_trait::async_trait;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::{broadcast, Mutex};

use super::{Backend, Capabilities};
use crate::address::Address;
use crate::breakpoint::{Breakpoint, BreakpointKind};
use crate::capture::{CaptureRequest, CaptureResult, ImageFormat};
use crate::error::{EmuError, Result};
use crate::events::{BackendEvent, EventBus};
use crate::registers::RegisterFile;
use crate::session::config::{DebugCommand, DebugScript, SessionConfig};
use crate::session::logparse;
use crate::snapshot::SnapshotHandle;
use crate::status::{BackendStatus, BackendStatusReport};

#[derive(Debug, Clone)]
pub struct SessionBackendConfig {
    pub binary: String,
    pub drive_image: String,
    pub memory_kb: u32,
    pub run_timeout_ms: u64,
}

pub struct SessionBackend {
    config: SessionBackendConfig,
    status: Arc<Mutex<BackendStatus>>,
    events: EventBus,
}

impl SessionBackend {
    pub fn new(config: SessionBackendConfig) -> Self {
        SessionBackend {
            config,
            status: Arc::new(Mutex::new(BackendStatus::Disconnected)),
            events: EventBus::new(),
        }
    }

    async fn set_status(&self, status: BackendStatus) {
        *self.status.lock().await = status;
        self.events.publish(BackendEvent::Status { status });
    }

    /// Runs one session: writes config + script into a fresh temp dir,
    /// spawns the binary, waits for it to exit (bounded by
    /// `run_timeout_ms`), and returns the captured stdout log plus the
    /// directory so the caller can harvest any dump files before it drops.
    async fn run_session(&self, autoexec: Vec<String>, script: DebugScript) -> Result<(String, TempDir)> {
        let dir = TempDir::new().map_err(EmuError::Io)?;
        let session_config = SessionConfig {
            drive_image: self.config.drive_image.clone(),
            memory_kb: self.config.memory_kb,
            autoexec_lines: autoexec,
        };
        let config_path = session_config.write_to(dir.path()).await?;
        let _script_path = script.write_to(dir.path()).await?;

        self.set_status(BackendStatus::Launching).await;
        let output = tokio::time::timeout(
            std::time::Duration::from_millis(self.config.run_timeout_ms),
            tokio::process::Command::new(&self.config.binary)
                .arg("-conf")
                .arg(&config_path)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| EmuError::Timeout("session process".into()))?
        .map_err(EmuError::Io)?;

        self.set_status(BackendStatus::Disconnected).await;
        let log = String::from_utf8_lossy(&output.stdout).to_string();
        Ok((log, dir))
    }
}

#[async_trait]
impl Backend for SessionBackend {
    fn kind(&self) -> &'static str {
        "session"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            read_memory: true,
            write_memory: false,
            read_registers: true,
            send_keys: true,
            screenshot: false,
            breakpoints: false,
            pause_resume_step: false,
            snapshots: false,
        }
    }

    async fn status(&self) -> BackendStatusReport {
        let status = *self.status.lock().await;
        BackendStatusReport {
            backend: self.kind().to_string(),
            status,
            pid: None,
            mc_connected: None,
            rdbg_connected: None,
        }
    }

    async fn launch(&self) -> Result<()> {
        Ok(())
    }

    async fn connect(&self) -> Result<()> {
        Err(EmuError::not_supported(
            "the session backend has no persistent process to connect to",
        ))
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn read_memory(&self, address: Address, len: usize) -> Result<Vec<u8>> {
        let dump_name = "memory.bin".to_string();
        let mut script = DebugScript::new();
        script.push(DebugCommand::BinaryDump {
            address,
            len,
            path: dump_name.clone(),
        });
        let (_log, dir) = self.run_session(vec![], script).await?;
        tokio::fs::read(dir.path().join(&dump_name))
            .await
            .map_err(EmuError::Io)
    }

    async fn write_memory(&self, _address: Address, _data: &[u8]) -> Result<()> {
        Err(EmuError::not_supported("write_memory on the session backend"))
    }

    async fn read_registers(&self) -> Result<RegisterFile> {
        let mut script = DebugScript::new();
        script.push(DebugCommand::ShowRegisters);
        let (log, _dir) = self.run_session(vec![], script).await?;
        logparse::parse_final_registers(&log)
            .ok_or_else(|| EmuError::Protocol("no register dump found in session log".into()))
    }

    async fn send_key(&self, key: &str) -> Result<()> {
        self.send_keys_sequence(std::slice::from_ref(&key.to_string()), None).await
    }

    async fn send_keys_sequence(&self, keys: &[String], delay_ms: Option<u64>) -> Result<()> {
        let mut script = DebugScript::new();
        for key in keys {
            script.push(DebugCommand::SendKey(key.clone()));
            if let Some(ms) = delay_ms {
                script.push(DebugCommand::Wait(ms));
            }
        }
        self.run_session(vec![], script).await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<(Vec<u8>, ImageFormat)> {
        Err(EmuError::not_supported("screenshot on the session backend"))
    }

    async fn save_snapshot(&self, _name: &str) -> Result<SnapshotHandle> {
        Err(EmuError::not_supported("save_snapshot on the session backend"))
    }

    async fn load_snapshot(&self, _name: &str) -> Result<()> {
        Err(EmuError::not_supported("load_snapshot on the session backend"))
    }

    async fn list_snapshots(&self) -> Result<Vec<SnapshotHandle>> {
        Ok(Vec::new())
    }

    async fn set_breakpoint(
        &self,
        _kind: BreakpointKind,
        _address: Option<Address>,
        _interrupt_number: Option<u8>,
        _interrupt_sub_function: Option<u8>,
    ) -> Result<Breakpoint> {
        Err(EmuError::not_supported("live breakpoints on the session backend"))
    }

    async fn remove_breakpoint(&self, _id: u64) -> Result<()> {
        Err(EmuError::not_supported("live breakpoints on the session backend"))
    }

    async fn list_breakpoints(&self) -> Result<Vec<Breakpoint>> {
        Ok(Vec::new())
    }

    async fn pause(&self) -> Result<()> {
        Err(EmuError::not_supported("pause on the session backend"))
    }

    async fn resume(&self) -> Result<()> {
        Err(EmuError::not_supported("resume on the session backend"))
    }

    async fn step(&self) -> Result<RegisterFile> {
        Err(EmuError::not_supported("step on the session backend"))
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
