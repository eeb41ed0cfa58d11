//! # Backend Holder
//!
//! The broker owns exactly one active backend at a time (§4.10): a
//! `tokio::sync::RwLock`-guarded `Option<Arc<dyn Backend>>` swapped out
//! wholesale on `POST /api/backend`, never mutated in place. Readers (the
//! HTTP handlers) take the read lock and clone the `Arc`; only attach/detach
//! take the write lock.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::backend::Backend;
use crate::error::{EmuError, Result};

/// Picks which concrete `Backend` implementation to construct, named after
/// the kind strings both backends report from `Backend::kind`.
#[derive(Debug, Clone)]
pub enum BackendKind {
    #[cfg(feature = "qemu-backend")]
    Qemu(crate::launcher::LaunchConfig),
    #[cfg(feature = "session-backend")]
    Session(crate::backend::session::SessionBackendConfig),
}

pub fn build_backend(kind: BackendKind) -> Arc<dyn Backend> {
    match kind {
        #[cfg(feature = "qemu-backend")]
        BackendKind::Qemu(config) => Arc::new(crate::backend::qemu::QemuBackend::new(config)),
        #[cfg(feature = "session-backend")]
        BackendKind::Session(config) => Arc::new(crate::backend::session::SessionBackend::new(config)),
    }
}

/// Holds the single backend instance the broker is currently driving.
#[derive(Default)]
pub struct BackendHolder {
    slot: RwLock<Option<Arc<dyn Backend>>>,
}

impl BackendHolder {
    pub fn new() -> Self {
        BackendHolder {
            slot: RwLock::new(None),
        }
    }

    /// Replaces the active backend. Does not shut down whatever was
    /// previously attached; callers that care about a clean handoff should
    /// call `shutdown` on the old `Arc` themselves before swapping.
    pub async fn attach(&self, backend: Arc<dyn Backend>) {
        let mut guard = self.slot.write().await;
        *guard = Some(backend);
    }

    pub async fn detach(&self) -> Option<Arc<dyn Backend>> {
        let mut guard = self.slot.write().await;
        guard.take()
    }

    pub async fn get(&self) -> Result<Arc<dyn Backend>> {
        self.slot
            .read()
            .await
            .clone()
            .ok_or_else(|| EmuError::Connection("no backend is attached".into()))
    }

    pub async fn is_attached(&self) -> bool {
        self.slot.read().await.is_some()
    }
}
