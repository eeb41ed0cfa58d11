use emu_core::launcher::{self, DisplayMode, LaunchConfig};

fn headless_config(binary: String) -> LaunchConfig {
    LaunchConfig {
        binary,
        hard_disk_image: "dos.img".into(),
        shared_image: None,
        game_image: None,
        display: DisplayMode::Headless,
        audio_sb16: false,
        remote_debug_port: None,
        machine_control_socket: None,
        monitor_on_stdio: false,
        record_path: None,
        replay_path: None,
        initial_snapshot: None,
        extra_args: vec![],
    }
}

#[tokio::test]
async fn detects_early_exit_and_captures_stderr() {
    let dir = tempfile::TempDir::new().unwrap();
    let script = dir.path().join("bad-emu.sh");
    tokio::fs::write(&script, "#!/bin/sh\necho 'fatal: bad disk image' 1>&2\nexit 1\n")
        .await
        .unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = tokio::fs::metadata(&script).await.unwrap().permissions();
        perms.set_mode(0o755);
        tokio::fs::set_permissions(&script, perms).await.unwrap();
    }

    let config = headless_config(script.to_string_lossy().to_string());
    let err = launcher::launch(&config).await.unwrap_err();
    match err {
        emu_core::error::LaunchError::EarlyExit { status, stderr } => {
            assert_eq!(status, Some(1));
            assert!(stderr.contains("bad disk image"));
        }
        other => panic!("expected EarlyExit, got {other:?}"),
    }
}

#[tokio::test]
async fn long_running_process_is_treated_as_launched() {
    let dir = tempfile::TempDir::new().unwrap();
    let script = dir.path().join("slow-emu.sh");
    tokio::fs::write(&script, "#!/bin/sh\nsleep 2\n").await.unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = tokio::fs::metadata(&script).await.unwrap().permissions();
        perms.set_mode(0o755);
        tokio::fs::set_permissions(&script, perms).await.unwrap();
    }

    let config = headless_config(script.to_string_lossy().to_string());
    let mut child = launcher::launch(&config)
        .await
        .expect("a script that outlives the early-exit window should count as launched");
    let _ = child.kill().await;
}
