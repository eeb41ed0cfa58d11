//! # Logging
//!
//! Structured logging setup: a pretty console layer plus a daily-rotating
//! JSON file layer, both gated by `RUST_LOG` via `EnvFilter`. The shape
//! mirrors the teacher's own `setup_logging` helper: one non-blocking file
//! writer guard that must be kept alive for the process lifetime, returned
//! to the caller so `main` can hold it.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global `tracing` subscriber. Must be called once, near
/// the top of `main`, before any other logging happens. The returned guard
/// flushes the background file-writer thread on drop; dropping it early
/// silently truncates the log.
pub fn init_logging(log_dir: &str, file_prefix: &str) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = fmt::layer().with_target(true).with_level(true);
    let file_layer = fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_target(true)
        .with_current_span(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}
