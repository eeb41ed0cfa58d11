//! # Process Launcher
//!
//! Builds the emulator's argv from a typed config and spawns it, watching
//! for an early exit (the emulator refusing a bad argument, a missing disk
//! image, etc.) rather than leaving a caller waiting on a process that is
//! never going to answer on its control sockets (§4.3).

use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;

use crate::error::LaunchError;

/// How long to wait after spawn before declaring the process "launched".
/// Chosen to be comfortably longer than the emulator's own socket bind time
/// but short enough that a broken invocation fails fast.
const EARLY_EXIT_WINDOW: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub path: String,
    /// `"floppy"`, `"hd"`, or `"cdrom"`.
    pub kind: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Headless,
    Sdl,
    Vnc { display: u16 },
}

#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub binary: String,
    pub hard_disk_image: String,
    /// Optical image shared across titles (e.g. a game's common data disc).
    /// §4.3's slot-assignment rule: when both this and `game_image` are set,
    /// `game_image` takes the primary optical slot and this one takes the
    /// secondary.
    pub shared_image: Option<String>,
    /// Optical image specific to the title being run.
    pub game_image: Option<String>,
    pub display: DisplayMode,
    pub audio_sb16: bool,
    pub remote_debug_port: Option<u16>,
    pub machine_control_socket: Option<String>,
    pub monitor_on_stdio: bool,
    pub record_path: Option<String>,
    pub replay_path: Option<String>,
    pub initial_snapshot: Option<String>,
    pub extra_args: Vec<String>,
}

impl LaunchConfig {
    /// §4.3's drive topology: one hard disk always, up to two optical
    /// drives. If both a shared and a game image are provided, the game
    /// image takes the primary optical slot and the shared image takes the
    /// secondary; otherwise whichever one is set takes the primary slot
    /// alone.
    fn optical_slots(&self) -> Vec<DriveConfig> {
        match (&self.game_image, &self.shared_image) {
            (Some(game), Some(shared)) => vec![
                DriveConfig {
                    path: game.clone(),
                    kind: "cdrom".into(),
                    read_only: true,
                },
                DriveConfig {
                    path: shared.clone(),
                    kind: "cdrom".into(),
                    read_only: true,
                },
            ],
            (Some(primary), None) | (None, Some(primary)) => vec![DriveConfig {
                path: primary.clone(),
                kind: "cdrom".into(),
                read_only: true,
            }],
            (None, None) => Vec::new(),
        }
    }

    /// Builds the argv following §4.3's ordering: drives, display, audio,
    /// debug stub, machine control, monitor, record/replay, snapshot, then
    /// any caller-supplied passthrough args last so they can override
    /// earlier flags if the emulator treats later flags as authoritative.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        let hard_disk = DriveConfig {
            path: self.hard_disk_image.clone(),
            kind: "hd".into(),
            read_only: false,
        };
        for drive in std::iter::once(hard_disk).chain(self.optical_slots()) {
            let mut spec = format!("file={}", drive.path);
            spec.push_str(&format!(",if={}", if drive.kind == "floppy" { "floppy" } else { "ide" }));
            if drive.kind == "cdrom" {
                spec.push_str(",media=cdrom");
            }
            if drive.read_only {
                spec.push_str(",readonly=on");
            }
            args.push("-drive".to_string());
            args.push(spec);
        }

        match self.display {
            DisplayMode::Headless => {
                args.push("-display".to_string());
                args.push("none".to_string());
            }
            DisplayMode::Sdl => {
                args.push("-display".to_string());
                args.push("sdl".to_string());
            }
            DisplayMode::Vnc { display } => {
                args.push("-vnc".to_string());
                args.push(format!(":{display}"));
            }
        }

        if self.audio_sb16 {
            args.push("-soundhw".to_string());
            args.push("sb16".to_string());
        }

        if let Some(port) = self.remote_debug_port {
            args.push("-gdb".to_string());
            args.push(format!("tcp::{port}"));
            args.push("-S".to_string());
        }

        if let Some(socket) = &self.machine_control_socket {
            args.push("-qmp".to_string());
            args.push(format!("unix:{socket},server,nowait"));
        }

        if self.monitor_on_stdio && self.machine_control_socket.is_none() {
            args.push("-monitor".to_string());
            args.push("stdio".to_string());
        }

        if let Some(record) = &self.record_path {
            args.push("-record".to_string());
            args.push(record.clone());
        }
        if let Some(replay) = &self.replay_path {
            args.push("-replay".to_string());
            args.push(replay.clone());
        }

        if let Some(snapshot) = &self.initial_snapshot {
            args.push("-loadvm".to_string());
            args.push(snapshot.clone());
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// Spawns the emulator and waits `EARLY_EXIT_WINDOW` to catch an immediate
/// failure, returning the captured stderr in that case instead of handing
/// back a dead `Child`.
pub async fn launch(config: &LaunchConfig) -> Result<Child, LaunchError> {
    let args = config.build_args();
    let mut child = Command::new(&config.binary)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    match timeout(EARLY_EXIT_WINDOW, child.wait()).await {
        Ok(Ok(status)) => {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr).await;
            }
            Err(LaunchError::EarlyExit {
                status: status.code(),
                stderr,
            })
        }
        Ok(Err(io_err)) => Err(LaunchError::Spawn(io_err)),
        Err(_elapsed) => Ok(child),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(binary: &str) -> LaunchConfig {
        LaunchConfig {
            binary: binary.into(),
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

    #[test]
    fn build_args_orders_sections() {
        let config = LaunchConfig {
            audio_sb16: true,
            remote_debug_port: Some(1234),
            machine_control_socket: Some("/tmp/mc.sock".into()),
            monitor_on_stdio: true,
            initial_snapshot: Some("boot".into()),
            extra_args: vec!["-m".into(), "16".into()],
            ..base_config("qemu-system-i386")
        };
        let args = config.build_args();
        assert_eq!(args[0], "-drive");
        assert!(args.contains(&"none".to_string()));
        assert!(args.contains(&"sb16".to_string()));
        assert!(args.contains(&"tcp::1234".to_string()));
        assert!(args.contains(&"unix:/tmp/mc.sock,server,nowait".to_string()));
        assert!(!args.contains(&"stdio".to_string()));
        assert_eq!(args.last(), Some(&"16".to_string()));
    }

    #[test]
    fn monitor_on_stdio_only_without_machine_control_socket() {
        let config = LaunchConfig {
            monitor_on_stdio: true,
            ..base_config("qemu-system-i386")
        };
        let args = config.build_args();
        assert!(args.contains(&"stdio".to_string()));
    }

    #[test]
    fn hard_disk_is_always_present_alone_by_default() {
        let config = base_config("qemu-system-i386");
        let args = config.build_args();
        let drive_count = args.iter().filter(|a| *a == "-drive").count();
        assert_eq!(drive_count, 1);
        assert!(args[1].contains("media=cdrom") == false);
    }

    #[test]
    fn game_image_takes_primary_slot_and_shared_takes_secondary() {
        let config = LaunchConfig {
            shared_image: Some("shared.iso".into()),
            game_image: Some("game.iso".into()),
            ..base_config("qemu-system-i386")
        };
        let args = config.build_args();
        let specs: Vec<&String> = args
            .iter()
            .enumerate()
            .filter(|(i, _)| i % 2 == 1 && args[i - 1] == "-drive")
            .map(|(_, v)| v)
            .collect();
        assert_eq!(specs.len(), 3);
        assert!(specs[0].contains("dos.img"));
        assert!(specs[1].contains("game.iso"));
        assert!(specs[2].contains("shared.iso"));
    }

    #[test]
    fn shared_image_alone_takes_primary_optical_slot() {
        let config = LaunchConfig {
            shared_image: Some("shared.iso".into()),
            ..base_config("qemu-system-i386")
        };
        let args = config.build_args();
        let drive_count = args.iter().filter(|a| *a == "-drive").count();
        assert_eq!(drive_count, 2);
        assert!(args.iter().any(|a| a.contains("shared.iso") && a.contains("media=cdrom")));
    }
}
