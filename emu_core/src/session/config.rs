//! # Session Config Synthesizer
//!
//! Builds the emulator configuration file and the debug-command script that
//! drive one session-backend run (§4.5). Each invocation is independent:
//! there is no persistent process to carry state between them, so every
//! capability the caller wants (set a breakpoint, dump registers, ...) has
//! to be expressed as a line in the generated script.

use std::path::{Path, PathBuf};

use crate::address::Address;
use crate::error::{EmuError, Result};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub drive_image: String,
    pub memory_kb: u32,
    pub autoexec_lines: Vec<String>,
}

impl SessionConfig {
    /// Renders the `[autoexec]`-sectioned ini file the session backend's
    /// emulator binary reads on startup.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("[dosbox]\n");
        out.push_str(&format!("memsize={}\n\n", self.memory_kb / 1024));
        out.push_str("[autoexec]\n");
        for line in &self.autoexec_lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("exit\n");
        out
    }

    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join("session.conf");
        tokio::fs::write(&path, self.render())
            .await
            .map_err(EmuError::Io)?;
        Ok(path)
    }
}

/// One line of a generated debug-command script. Each variant renders to
/// exactly the text the debug console expects.
#[derive(Debug, Clone)]
pub enum DebugCommand {
    SetExecutionBreakpoint(Address),
    SetInterruptBreakpoint { number: u8, sub_function: Option<u8> },
    SetMemoryWriteBreakpoint(Address),
    Continue,
    Step(u32),
    ShowRegisters,
    HexDump { address: Address, len: usize },
    BinaryDump { address: Address, len: usize, path: String },
    TraceLog(u32),
    /// Presses one key, identified by the debug console's own key-name
    /// vocabulary (e.g. `"enter"`, `"a"`).
    SendKey(String),
    /// Idles the debug console for `ms` milliseconds before the next
    /// command, used to space out `SendKey` lines per §4.7 step 3's
    /// per-key delay.
    Wait(u64),
    Raw(String),
}

impl DebugCommand {
    pub fn render(&self) -> String {
        match self {
            DebugCommand::SetExecutionBreakpoint(addr) => format!("BPINT {}", addr.seg_off_string()),
            DebugCommand::SetInterruptBreakpoint { number, sub_function } => match sub_function {
                Some(sub) => format!("BPINT {number:02X} {sub:02X}"),
                None => format!("BPINT {number:02X}"),
            },
            DebugCommand::SetMemoryWriteBreakpoint(addr) => format!("BPM {}", addr.seg_off_string()),
            DebugCommand::Continue => "RUN".to_string(),
            DebugCommand::Step(count) => format!("SV {count}"),
            DebugCommand::ShowRegisters => "REG".to_string(),
            DebugCommand::HexDump { address, len } => format!("D {} {len:X}", address.seg_off_string()),
            DebugCommand::BinaryDump { address, len, path } => {
                format!("SAVE {path} {} {len:X}", address.seg_off_string())
            }
            DebugCommand::TraceLog(count) => format!("TRACE {count}"),
            DebugCommand::SendKey(code) => format!("KEY {code}"),
            DebugCommand::Wait(ms) => format!("WAIT {ms}"),
            DebugCommand::Raw(text) => text.clone(),
        }
    }
}

/// A full debug-command script, rendered one command per line and written
/// alongside the session config.
#[derive(Debug, Clone, Default)]
pub struct DebugScript {
    commands: Vec<DebugCommand>,
}

impl DebugScript {
    pub fn new() -> Self {
        DebugScript::default()
    }

    pub fn push(&mut self, command: DebugCommand) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn render(&self) -> String {
        self.commands
            .iter()
            .map(DebugCommand::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join("debug.scr");
        tokio::fs::write(&path, self.render())
            .await
            .map_err(EmuError::Io)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_config_with_autoexec() {
        let config = SessionConfig {
            drive_image: "dos.img".into(),
            memory_kb: 16384,
            autoexec_lines: vec!["mount c .".into(), "c:".into(), "prog.exe".into()],
        };
        let rendered = config.render();
        assert!(rendered.contains("[autoexec]"));
        assert!(rendered.contains("mount c ."));
        assert!(rendered.ends_with("exit\n"));
    }

    #[test]
    fn renders_key_and_wait_commands() {
        let mut script = DebugScript::new();
        script.push(DebugCommand::SendKey("enter".into())).push(DebugCommand::Wait(50));
        let rendered = script.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines, vec!["KEY enter", "WAIT 50"]);
    }

    #[test]
    fn renders_script_commands_in_order() {
        let mut script = DebugScript::new();
        script
            .push(DebugCommand::SetExecutionBreakpoint(Address::from_seg_off(0x1000, 0x0010)))
            .push(DebugCommand::Continue)
            .push(DebugCommand::ShowRegisters);
        let rendered = script.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("BPINT"));
        assert_eq!(lines[1], "RUN");
        assert_eq!(lines[2], "REG");
    }
}
