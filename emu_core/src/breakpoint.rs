//! # Breakpoints
//!
//! Identifiers are issued by the owning backend, never the caller (§3). The
//! socket-based backend only ever produces `Kind::Execution` entries; the
//! session-based backend reports no live breakpoints at all (its kinds are
//! scripted directly into generated debug files, §4.7).

use crate::address::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakpointKind {
    Execution,
    Memory,
    Interrupt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breakpoint {
    pub id: u64,
    pub kind: BreakpointKind,
    pub address: Option<Address>,
    pub interrupt_number: Option<u8>,
    pub interrupt_sub_function: Option<u8>,
    pub enabled: bool,
}

impl Breakpoint {
    pub fn execution(id: u64, address: Address) -> Self {
        Breakpoint {
            id,
            kind: BreakpointKind::Execution,
            address: Some(address),
            interrupt_number: None,
            interrupt_sub_function: None,
            enabled: true,
        }
    }
}
