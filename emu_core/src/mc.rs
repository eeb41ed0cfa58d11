//! # Machine-Control Client
//!
//! Newline-delimited JSON client for a running emulator's machine-control
//! socket (§4.1). The wire shape is intentionally loose (`serde_json::Value`
//! in, `serde_json::Value` out) because the socket speaks a command
//! vocabulary the emulator defines, not one this crate owns; typed requests
//! are built right before sending and typed results extracted right after
//! receiving.

use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::error::McError;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const GREETING_TIMEOUT: Duration = Duration::from_secs(5);

/// A single connection to the machine-control socket. Requests are
/// serialized one at a time by the caller (the socket-based backend holds
/// this behind its own single-lane executor, §5); this client itself does
/// no internal queuing.
pub struct MachineControlClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
    /// Messages read off the socket that were not replies to an in-flight
    /// request (events, async notifications) are forwarded here instead of
    /// being dropped.
    unsolicited: mpsc::UnboundedSender<Value>,
}

impl MachineControlClient {
    /// Connects, reads the greeting line, and sends the capability-enable
    /// handshake the emulator expects before accepting commands.
    pub async fn connect(
        socket_path: &str,
        unsolicited: mpsc::UnboundedSender<Value>,
    ) -> Result<Self, McError> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|e| McError::Connection(format!("{socket_path}: {e}")))?;
        let (read_half, write_half) = stream.into_split();
        let mut client = MachineControlClient {
            reader: BufReader::new(read_half),
            writer: write_half,
            unsolicited,
        };

        let greeting = client.read_line_timeout(GREETING_TIMEOUT).await?;
        let greeting: Value = serde_json::from_str(&greeting)?;
        if greeting.get("QMP").is_none() {
            return Err(McError::Protocol(format!(
                "unexpected greeting, missing QMP banner: {greeting}"
            )));
        }

        client
            .request_raw(json!({"execute": "qmp_capabilities"}), DEFAULT_REQUEST_TIMEOUT)
            .await?;

        Ok(client)
    }

    async fn read_line_timeout(&mut self, dur: Duration) -> Result<String, McError> {
        let mut line = String::new();
        let n = timeout(dur, self.reader.read_line(&mut line))
            .await
            .map_err(|_| McError::Timeout)??;
        if n == 0 {
            return Err(McError::Connection("socket closed".into()));
        }
        Ok(line)
    }

    /// Sends `payload` and waits for the matching reply, forwarding any
    /// unsolicited messages encountered along the way. Falls back to
    /// parsing the whole accumulated buffer as one JSON value if line
    /// framing does not yield a complete document, since some emulator
    /// builds emit pretty-printed (multi-line) JSON on the machine-control
    /// socket.
    async fn request_raw(&mut self, payload: Value, dur: Duration) -> Result<Value, McError> {
        let mut line = serde_json::to_string(&payload)?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(McError::Io)?;
        self.writer.flush().await.map_err(McError::Io)?;

        let mut buf = String::new();
        loop {
            let chunk = self.read_line_timeout(dur).await?;
            buf.push_str(&chunk);
            match serde_json::from_str::<Value>(&buf) {
                Ok(value) => {
                    if value.get("event").is_some() {
                        let _ = self.unsolicited.send(value);
                        buf.clear();
                        continue;
                    }
                    return Ok(value);
                }
                Err(_) => continue,
            }
        }
    }

    async fn execute(&mut self, command: &str, arguments: Value) -> Result<Value, McError> {
        let payload = json!({"execute": command, "arguments": arguments});
        let reply = self.request_raw(payload, DEFAULT_REQUEST_TIMEOUT).await?;
        if let Some(error) = reply.get("error") {
            return Err(McError::Protocol(error.to_string()));
        }
        Ok(reply.get("return").cloned().unwrap_or(Value::Null))
    }

    pub async fn send_key(&mut self, key: &str) -> Result<(), McError> {
        self.execute(
            "send-key",
            json!({"keys": [{"type": "qcode", "data": key}]}),
        )
        .await?;
        Ok(())
    }

    pub async fn screendump(&mut self, path: &str) -> Result<(), McError> {
        self.execute("screendump", json!({"filename": path})).await?;
        Ok(())
    }

    pub async fn save_snapshot(&mut self, name: &str) -> Result<(), McError> {
        self.execute("human-monitor-command", json!({"command-line": format!("savevm {name}")}))
            .await?;
        self.execute("cont", json!({})).await?;
        Ok(())
    }

    pub async fn load_snapshot(&mut self, name: &str) -> Result<(), McError> {
        self.execute("human-monitor-command", json!({"command-line": format!("loadvm {name}")}))
            .await?;
        Ok(())
    }

    pub async fn list_snapshots_raw(&mut self) -> Result<String, McError> {
        let reply = self
            .execute(
                "human-monitor-command",
                json!({"command-line": "info snapshots"}),
            )
            .await?;
        Ok(reply.as_str().unwrap_or_default().to_string())
    }

    pub async fn pmem_save(&mut self, address: u64, size: usize, path: &str) -> Result<(), McError> {
        self.execute(
            "human-monitor-command",
            json!({"command-line": format!("pmemsave {address} {size} {path}")}),
        )
        .await?;
        Ok(())
    }

    pub async fn pause(&mut self) -> Result<(), McError> {
        self.execute("stop", json!({})).await?;
        Ok(())
    }

    pub async fn resume(&mut self) -> Result<(), McError> {
        self.execute("cont", json!({})).await?;
        Ok(())
    }

    pub async fn quit(&mut self) -> Result<(), McError> {
        self.execute("quit", json!({})).await?;
        Ok(())
    }
}
