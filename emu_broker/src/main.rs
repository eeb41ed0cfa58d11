//! # DOS Debug Broker
//!
//! The control-plane binary: owns one attached emulator backend at a time
//! and exposes it over HTTP and WebSocket so that multiple tools (a web UI,
//! CI harnesses, this crate's own CLI) can drive the same running guest
//! without each reimplementing the machine-control / remote-debug wire
//! protocols.
//!
//! ## Execution Flow
//! 1. Load `RuntimeConfig` from the environment.
//! 2. Initialize structured logging (console + daily-rotating JSON file).
//! 3. Build the shared `AppState` and router.
//! 4. Bind and serve, shutting down gracefully on `Ctrl+C` / `SIGTERM`.

mod http;
mod state;
mod watch_task;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use emu_core::config::RuntimeConfig;
use emu_core::logging::init_logging;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RuntimeConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let _log_guard = init_logging(&config.log_dir, "emu_broker");

    tracing::info!(%config, "emu_broker starting");

    let state: Arc<AppState> = Arc::new(AppState::new(config.clone()));
    watch_task::spawn(state.clone());

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let app = http::router()
        .route("/ws", axum::routing::get(ws::ws_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.http_addr, config.http_port).parse()?;
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Waits for `Ctrl+C` or, on Unix, `SIGTERM`, whichever arrives first.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::warn!("shutdown signal received, draining connections");
}
