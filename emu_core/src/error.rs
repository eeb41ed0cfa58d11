//! # Error Taxonomy
//!
//! Every subsystem in this crate raises one of a small set of error kinds, so
//! that callers at the broker boundary can translate failures into the right
//! wire representation (HTTP status code or WebSocket `error` frame) without
//! inspecting error messages. The layering mirrors a pattern used throughout
//! the corpus this crate was built against: a `thiserror` enum per subsystem
//! (`McError`, `RdbgError`, `LaunchError`) that wraps `std::io::Error`, plus a
//! top-level `EmuError` that every subsystem error converts into.

use std::fmt;
use thiserror::Error;

/// Errors raised by the machine-control client (§4.1).
#[derive(Debug, Error)]
pub enum McError {
    /// The transport socket closed mid-request or refused to connect.
    #[error("machine-control connection error: {0}")]
    Connection(String),
    /// The greeting was missing the protocol token, or a request returned
    /// an `error` field.
    #[error("machine-control protocol error: {0}")]
    Protocol(String),
    /// No response arrived before the deadline.
    #[error("machine-control timed out waiting for a response")]
    Timeout,
    /// The reply JSON did not parse.
    #[error("machine-control reply was not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("machine-control I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the remote-debug client (§4.2).
#[derive(Debug, Error)]
pub enum RdbgError {
    #[error("remote-debug connection error: {0}")]
    Connection(String),
    /// An `E...` reply, a non-`OK` affirmative reply, or a malformed packet.
    #[error("remote-debug protocol error: {0}")]
    Protocol(String),
    #[error("remote-debug timed out waiting for a packet")]
    Timeout,
    #[error("remote-debug I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the process launcher (§4.3).
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The child exited before the backend finished connecting to it.
    #[error("emulator process exited early (status {status:?}): {stderr}")]
    EarlyExit {
        status: Option<i32>,
        stderr: String,
    },
    #[error("failed to spawn emulator process: {0}")]
    Spawn(#[from] std::io::Error),
}

/// The top-level error taxonomy (§7), the one callers at the broker boundary
/// match on.
#[derive(Debug, Error)]
pub enum EmuError {
    /// Transport down: socket closed mid-request, connect refused.
    #[error("connection error: {0}")]
    Connection(String),
    /// Wire reply is well-formed but indicates failure. Never retried
    /// automatically.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The wire was silent past the deadline.
    #[error("timed out: {0}")]
    Timeout(String),
    /// This backend cannot serve the requested primitive.
    #[error("not supported by this backend: {0}")]
    NotSupported(String),
    /// Bad address literal, missing required config field, bad JSON body.
    #[error("invalid argument: {0}")]
    Argument(String),
    /// An underlying I/O failure not otherwise classified.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EmuError {
    /// Short machine-readable tag used in wire error envelopes (`error.kind`).
    pub fn kind(&self) -> &'static str {
        match self {
            EmuError::Connection(_) => "connection",
            EmuError::Protocol(_) => "protocol",
            EmuError::Timeout(_) => "timeout",
            EmuError::NotSupported(_) => "not_supported",
            EmuError::Argument(_) => "argument",
            EmuError::Io(_) => "io",
        }
    }

    pub fn not_supported(op: impl fmt::Display) -> Self {
        EmuError::NotSupported(format!("{op} is not supported by this backend"))
    }

    pub fn argument(msg: impl Into<String>) -> Self {
        EmuError::Argument(msg.into())
    }
}

impl From<McError> for EmuError {
    fn from(e: McError) -> Self {
        match e {
            McError::Connection(m) => EmuError::Connection(m),
            McError::Protocol(m) => EmuError::Protocol(m),
            McError::Timeout => EmuError::Timeout("machine-control".into()),
            McError::Json(e) => EmuError::Protocol(format!("bad JSON from machine-control: {e}")),
            McError::Io(e) => EmuError::Io(e),
        }
    }
}

impl From<RdbgError> for EmuError {
    fn from(e: RdbgError) -> Self {
        match e {
            RdbgError::Connection(m) => EmuError::Connection(m),
            RdbgError::Protocol(m) => EmuError::Protocol(m),
            RdbgError::Timeout => EmuError::Timeout("remote-debug".into()),
            RdbgError::Io(e) => EmuError::Io(e),
        }
    }
}

impl From<LaunchError> for EmuError {
    fn from(e: LaunchError) -> Self {
        match e {
            LaunchError::EarlyExit { status, stderr } => EmuError::Connection(format!(
                "emulator exited early (status {status:?}): {stderr}"
            )),
            LaunchError::Spawn(e) => EmuError::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, EmuError>;
