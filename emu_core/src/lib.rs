//! Backend abstraction, protocol clients, and capture pipeline for the DOS
//! emulator debug broker.
//!
//! Two backend implementations share one trait (`backend::Backend`): a
//! socket-based backend (`backend::qemu`) that drives a long-lived emulator
//! process over machine-control and remote-debug sockets, and a
//! session-based backend (`backend::session`) that drives one short-lived
//! process per operation. `emu_broker` holds whichever is currently attached
//! behind a `holder::BackendHolder` and exposes it over HTTP and WebSocket;
//! `emu_cli` talks to the same trait directly.

pub mod address;
pub mod backend;
pub mod breakpoint;
pub mod capture;
pub mod capture_pipeline;
pub mod config;
pub mod error;
pub mod events;
pub mod holder;
pub mod launcher;
pub mod logging;
pub mod registers;
pub mod session;
pub mod snapshot;
pub mod status;
pub mod watch;

#[cfg(feature = "qemu-backend")]
pub mod mc;
#[cfg(feature = "qemu-backend")]
pub mod rdbg;

pub use address::Address;
pub use backend::Backend;
pub use error::{EmuError, Result};
