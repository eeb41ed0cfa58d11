use emu_core::backend::session::{SessionBackend, SessionBackendConfig};
use emu_core::backend::Backend;
use emu_core::holder::BackendHolder;
use emu_core::status::BackendStatus;

#[tokio::test]
async fn holder_reports_no_backend_before_attach() {
    let holder = BackendHolder::new();
    assert!(!holder.is_attached().await);
    assert!(holder.get().await.is_err());
}

#[tokio::test]
async fn holder_swap_replaces_the_active_backend() {
    let holder = BackendHolder::new();
    let first = std::sync::Arc::new(SessionBackend::new(SessionBackendConfig {
        binary: "/bin/true".into(),
        drive_image: "unused.img".into(),
        memory_kb: 16384,
        run_timeout_ms: 1_000,
    }));
    holder.attach(first.clone()).await;
    assert!(holder.is_attached().await);

    let second = std::sync::Arc::new(SessionBackend::new(SessionBackendConfig {
        binary: "/bin/false".into(),
        drive_image: "unused.img".into(),
        memory_kb: 16384,
        run_timeout_ms: 1_000,
    }));
    holder.attach(second).await;
    let active = holder.get().await.unwrap();
    assert_eq!(active.kind(), "session");
}

#[tokio::test]
async fn status_events_are_published_on_the_event_bus() {
    let backend = SessionBackend::new(SessionBackendConfig {
        binary: "/bin/true".into(),
        drive_image: "unused.img".into(),
        memory_kb: 16384,
        run_timeout_ms: 1_000,
    });
    let mut events = backend.subscribe_events();

    let report = backend.status().await;
    assert_eq!(report.status, BackendStatus::Disconnected);

    // read_registers will fail (no register dump from /bin/true) but still
    // drives the backend through Launching -> Disconnected, publishing both
    // transitions on the bus.
    let _ = backend.read_registers().await;

    let mut saw_launching = false;
    while let Ok(event) = tokio::time::timeout(std::time::Duration::from_millis(200), events.recv()).await {
        if let Ok(emu_core::events::BackendEvent::Status { status }) = event {
            if status == BackendStatus::Launching {
                saw_launching = true;
            }
        } else {
            break;
        }
    }
    assert!(saw_launching);
}
