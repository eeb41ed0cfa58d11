//! # Shared Application State
//!
//! Holds everything the HTTP and WebSocket handlers need: the single
//! attached backend (or lack thereof) and the set of registered memory
//! watches. Wrapped in an `Arc` and cloned into every handler via axum's
//! `State` extractor, the same shape the teacher's gateway uses for its
//! `Dispatcher`.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use emu_core::capture::CaptureResult;
use emu_core::config::RuntimeConfig;
use emu_core::holder::BackendHolder;
use emu_core::watch::WatchState;

pub struct AppState {
    pub config: RuntimeConfig,
    pub holder: BackendHolder,
    pub watches: Mutex<BTreeMap<u64, WatchState>>,
    pub next_watch_id: std::sync::atomic::AtomicU64,
    /// History of captures run via `/api/captures`, most recent last.
    pub captures: Mutex<Vec<CaptureResult>>,
    /// Golden references recorded via `/api/golden/generate`, keyed by the
    /// capture prefix they were generated from.
    pub goldens: Mutex<BTreeMap<String, CaptureResult>>,
}

impl AppState {
    pub fn new(config: RuntimeConfig) -> Self {
        AppState {
            config,
            holder: BackendHolder::new(),
            watches: Mutex::new(BTreeMap::new()),
            next_watch_id: std::sync::atomic::AtomicU64::new(1),
            captures: Mutex::new(Vec::new()),
            goldens: Mutex::new(BTreeMap::new()),
        }
    }
}

pub type SharedState = Arc<AppState>;
