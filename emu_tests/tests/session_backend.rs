//! End-to-end exercise of the session backend's supported/unsupported split
//! (§4.7) using a fake emulator binary (a short shell script) instead of a
//! real DOS emulator, so these tests run anywhere `/bin/sh` exists.

use emu_core::backend::session::{SessionBackend, SessionBackendConfig};
use emu_core::backend::Backend;
use emu_core::address::Address;

async fn fake_binary_printing_registers() -> (tempfile::TempDir, String) {
    let dir = tempfile::TempDir::new().unwrap();
    let script_path = dir.path().join("fake-emu.sh");
    tokio::fs::write(
        &script_path,
        "#!/bin/sh\necho 'booting...'\necho 'EAX=0000ABCD EBX=00000001 ECX=00000000 EDX=00000000'\necho 'CS=07C0 SS=0000 DS=0000 ES=0000 FS=0000 GS=0000'\n",
    )
    .await
    .unwrap();
    let mut perms = tokio::fs::metadata(&script_path).await.unwrap().permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(0o755);
    }
    tokio::fs::set_permissions(&script_path, perms).await.unwrap();
    (dir, script_path.to_string_lossy().to_string())
}

#[tokio::test]
async fn read_registers_parses_fake_emulator_log() {
    let (_dir, binary) = fake_binary_printing_registers().await;
    let backend = SessionBackend::new(SessionBackendConfig {
        binary,
        drive_image: "unused.img".into(),
        memory_kb: 16384,
        run_timeout_ms: 5_000,
    });

    let registers = backend.read_registers().await.expect("registers should parse");
    assert_eq!(registers.eax, 0x0000ABCD);
    assert_eq!(registers.cs, 0x07C0);
}

#[tokio::test]
async fn write_memory_is_not_supported() {
    let (_dir, binary) = fake_binary_printing_registers().await;
    let backend = SessionBackend::new(SessionBackendConfig {
        binary,
        drive_image: "unused.img".into(),
        memory_kb: 16384,
        run_timeout_ms: 5_000,
    });

    let err = backend
        .write_memory(Address::from_linear(0x1000), &[0u8; 4])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_supported");
}

#[tokio::test]
async fn screenshot_is_not_supported() {
    let (_dir, binary) = fake_binary_printing_registers().await;
    let backend = SessionBackend::new(SessionBackendConfig {
        binary,
        drive_image: "unused.img".into(),
        memory_kb: 16384,
        run_timeout_ms: 5_000,
    });

    assert_eq!(backend.screenshot().await.unwrap_err().kind(), "not_supported");
}
