//! # DOS Debug CLI
//!
//! A thin command-line facade over `emu_core::Backend`, for driving a
//! backend directly from a shell or a CI script without going through
//! `emu_broker`'s HTTP surface. Every subcommand launches (or attaches to)
//! exactly one backend, performs one operation, prints the result as JSON,
//! and exits — there is no persistent session here, so anything that needs
//! one (breakpoints across multiple CLI invocations) belongs in the broker.

use clap::{Parser, Subcommand};

use emu_core::address::Address;
use emu_core::backend::qemu::QemuBackend;
use emu_core::backend::session::{SessionBackend, SessionBackendConfig};
use emu_core::backend::Backend;
use emu_core::breakpoint::BreakpointKind;
use emu_core::capture::CaptureRequest;
use emu_core::launcher::{DisplayMode, LaunchConfig};

#[derive(Parser)]
#[command(name = "emu_cli", about = "Drive a DOS emulator debug backend from the command line")]
struct Cli {
    #[arg(long, default_value = "qemu-system-i386")]
    binary: String,
    /// Hard disk image; always mounted as the primary IDE disk.
    #[arg(long)]
    drive_image: String,
    /// Optical image shared across titles; takes the secondary optical slot
    /// when `--game-image` is also given, otherwise the primary.
    #[arg(long)]
    shared_image: Option<String>,
    /// Optical image specific to the title being run; takes the primary
    /// optical slot whenever it is given.
    #[arg(long)]
    game_image: Option<String>,
    #[arg(long, default_value_t = false)]
    session: bool,
    #[arg(long, default_value_t = 1234)]
    remote_debug_port: u16,
    #[arg(long, default_value = "/tmp/emu-mc.sock")]
    machine_control_socket: String,
    #[arg(long, default_value_t = 16384)]
    memory_kb: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Status,
    ReadRegisters,
    ReadMemory { address: String, len: usize },
    WriteKeys { keys: Vec<String> },
    Screenshot { out: String },
    SaveSnapshot { name: String },
    LoadSnapshot { name: String },
    ListSnapshots,
    SetBreakpoint { address: String },
    Pause,
    Resume,
    Step,
    Capture { prefix: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let backend: Box<dyn Backend> = if cli.session {
        Box::new(SessionBackend::new(SessionBackendConfig {
            binary: cli.binary.clone(),
            drive_image: cli.drive_image.clone(),
            memory_kb: cli.memory_kb,
            run_timeout_ms: 30_000,
        }))
    } else {
        Box::new(QemuBackend::new(LaunchConfig {
            binary: cli.binary.clone(),
            hard_disk_image: cli.drive_image.clone(),
            shared_image: cli.shared_image.clone(),
            game_image: cli.game_image.clone(),
            display: DisplayMode::Headless,
            audio_sb16: false,
            remote_debug_port: Some(cli.remote_debug_port),
            machine_control_socket: Some(cli.machine_control_socket.clone()),
            monitor_on_stdio: false,
            record_path: None,
            replay_path: None,
            initial_snapshot: None,
            extra_args: vec![],
        }))
    };

    if !matches!(cli.command, Command::Status) {
        tracing::info!(binary = %cli.binary, "launching backend");
        backend.launch().await?;
    }

    match cli.command {
        Command::Status => {
            let report = backend.status().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::ReadRegisters => {
            let registers = backend.read_registers().await?;
            println!("{}", serde_json::to_string_pretty(&registers)?);
        }
        Command::ReadMemory { address, len } => {
            let addr = Address::parse(&address)?;
            let bytes = backend.read_memory(addr, len).await?;
            println!("{}", hex::encode(bytes));
        }
        Command::WriteKeys { keys } => {
            backend.send_keys_sequence(&keys, Some(50)).await?;
            println!("{{\"sent\": {}}}", keys.len());
        }
        Command::Screenshot { out } => {
            let (bytes, format) = backend.screenshot().await?;
            tokio::fs::write(&out, &bytes).await?;
            println!("{{\"path\": \"{out}\", \"format\": \"{}\"}}", format.extension());
        }
        Command::SaveSnapshot { name } => {
            let handle = backend.save_snapshot(&name).await?;
            println!("{}", serde_json::to_string_pretty(&handle)?);
        }
        Command::LoadSnapshot { name } => {
            backend.load_snapshot(&name).await?;
            println!("{{\"loaded\": \"{name}\"}}");
        }
        Command::ListSnapshots => {
            let snapshots = backend.list_snapshots().await?;
            println!("{}", serde_json::to_string_pretty(&snapshots)?);
        }
        Command::SetBreakpoint { address } => {
            let addr = Address::parse(&address)?;
            let breakpoint = backend
                .set_breakpoint(BreakpointKind::Execution, Some(addr), None, None)
                .await?;
            println!("{}", serde_json::to_string_pretty(&breakpoint)?);
        }
        Command::Pause => {
            backend.pause().await?;
            println!("{{\"paused\": true}}");
        }
        Command::Resume => {
            backend.resume().await?;
            println!("{{\"resumed\": true}}");
        }
        Command::Step => {
            let registers = backend.step().await?;
            println!("{}", serde_json::to_string_pretty(&registers)?);
        }
        Command::Capture { prefix } => {
            let result = backend.capture(CaptureRequest::new(prefix)).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    backend.shutdown().await?;
    Ok(())
}
