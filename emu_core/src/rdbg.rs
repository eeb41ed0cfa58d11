//! # Remote-Debug Client
//!
//! Client for the GDB-remote-style stub the emulator exposes for memory and
//! register access (§4.2). Packets are `$payload#checksum`, acknowledged
//! with a bare `+`. Memory reads are chunked because the stub itself caps
//! how much it will return per packet.

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::RdbgError;
use crate::registers::RegisterFile;

const READ_CHUNK: usize = 4096;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RemoteDebugClient {
    stream: TcpStream,
}

fn checksum(payload: &str) -> u8 {
    payload.bytes().fold(0u8, |acc, b| acc.wrapping_add(b))
}

fn frame(payload: &str) -> Vec<u8> {
    let sum = checksum(payload);
    format!("${payload}#{sum:02x}").into_bytes()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Result<Vec<u8>, RdbgError> {
    if s.len() % 2 != 0 {
        return Err(RdbgError::Protocol(format!("odd-length hex payload: {s}")));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|_| RdbgError::Protocol(format!("bad hex byte at {i}: {s}")))
        })
        .collect()
}

impl RemoteDebugClient {
    pub async fn connect(addr: &str) -> Result<Self, RdbgError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| RdbgError::Connection(format!("{addr}: {e}")))?;
        Ok(RemoteDebugClient { stream })
    }

    async fn send_packet(&mut self, payload: &str) -> Result<(), RdbgError> {
        let bytes = frame(payload);
        self.stream.write_all(&bytes).await.map_err(RdbgError::Io)?;
        self.await_ack().await
    }

    async fn await_ack(&mut self) -> Result<(), RdbgError> {
        let mut byte = [0u8; 1];
        timeout(DEFAULT_TIMEOUT, self.stream.read_exact(&mut byte))
            .await
            .map_err(|_| RdbgError::Timeout)?
            .map_err(RdbgError::Io)?;
        if byte[0] != b'+' {
            return Err(RdbgError::Protocol(format!(
                "expected ack '+', got {:#x}",
                byte[0]
            )));
        }
        Ok(())
    }

    /// Reads one `$...#xx` reply and acks it back.
    async fn recv_reply(&mut self) -> Result<String, RdbgError> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            timeout(DEFAULT_TIMEOUT, self.stream.read_exact(&mut byte))
                .await
                .map_err(|_| RdbgError::Timeout)?
                .map_err(RdbgError::Io)?;
            if byte[0] == b'$' {
                buf.clear();
                continue;
            }
            if byte[0] == b'#' {
                let mut checksum_bytes = [0u8; 2];
                timeout(DEFAULT_TIMEOUT, self.stream.read_exact(&mut checksum_bytes))
                    .await
                    .map_err(|_| RdbgError::Timeout)?
                    .map_err(RdbgError::Io)?;
                break;
            }
            buf.push(byte[0]);
        }
        self.stream.write_all(b"+").await.map_err(RdbgError::Io)?;
        String::from_utf8(buf).map_err(|e| RdbgError::Protocol(e.to_string()))
    }

    async fn exchange(&mut self, payload: &str) -> Result<String, RdbgError> {
        self.send_packet(payload).await?;
        self.recv_reply().await
    }

    pub async fn read_memory(&mut self, linear: u32, len: usize) -> Result<Vec<u8>, RdbgError> {
        let mut out = Vec::with_capacity(len);
        let mut remaining = len;
        let mut addr = linear;
        while remaining > 0 {
            let chunk_len = remaining.min(READ_CHUNK);
            let reply = self
                .exchange(&format!("m{addr:x},{chunk_len:x}"))
                .await?;
            if let Some(rest) = reply.strip_prefix('E') {
                return Err(RdbgError::Protocol(format!("stub error E{rest}")));
            }
            let bytes = hex_decode(&reply)?;
            if bytes.len() != chunk_len {
                return Err(RdbgError::Protocol(format!(
                    "short read: expected {chunk_len} got {}",
                    bytes.len()
                )));
            }
            out.extend_from_slice(&bytes);
            addr = addr.wrapping_add(chunk_len as u32);
            remaining -= chunk_len;
        }
        Ok(out)
    }

    pub async fn write_memory(&mut self, linear: u32, data: &[u8]) -> Result<(), RdbgError> {
        let hex = hex_encode(data);
        let reply = self
            .exchange(&format!("M{linear:x},{:x}:{hex}", data.len()))
            .await?;
        if reply != "OK" {
            return Err(RdbgError::Protocol(format!("write failed: {reply}")));
        }
        Ok(())
    }

    /// Parses the `g` packet's fixed-order register dump: ten 32-bit general
    /// registers followed by six 16-bit segment registers, all little-endian
    /// hex, matching `RegisterFile::GP_ORDER` / `SEG_ORDER`.
    pub async fn read_registers(&mut self) -> Result<RegisterFile, RdbgError> {
        let reply = self.exchange("g").await?;
        let bytes = hex_decode(&reply)?;
        let expected = RegisterFile::GP_ORDER.len() * 4 + RegisterFile::SEG_ORDER.len() * 2;
        if bytes.len() < expected {
            return Err(RdbgError::Protocol(format!(
                "short register dump: expected {expected} bytes, got {}",
                bytes.len()
            )));
        }
        let mut regs = RegisterFile::default();
        let mut offset = 0;
        for name in RegisterFile::GP_ORDER {
            let word = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
            regs.set_by_name(name, word);
            offset += 4;
        }
        for name in RegisterFile::SEG_ORDER {
            let word = u16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap());
            regs.set_by_name(name, word as u32);
            offset += 2;
        }
        Ok(regs)
    }

    pub async fn set_execution_breakpoint(&mut self, linear: u32) -> Result<(), RdbgError> {
        let reply = self.exchange(&format!("Z0,{linear:x},1")).await?;
        if reply != "OK" {
            return Err(RdbgError::Protocol(format!("set breakpoint failed: {reply}")));
        }
        Ok(())
    }

    pub async fn remove_execution_breakpoint(&mut self, linear: u32) -> Result<(), RdbgError> {
        let reply = self.exchange(&format!("z0,{linear:x},1")).await?;
        if reply != "OK" {
            return Err(RdbgError::Protocol(format!(
                "remove breakpoint failed: {reply}"
            )));
        }
        Ok(())
    }

    pub async fn cont(&mut self) -> Result<(), RdbgError> {
        self.send_packet("c").await
    }

    pub async fn single_step(&mut self) -> Result<(), RdbgError> {
        self.send_packet("s").await
    }

    /// Blocks for a stop-reply packet (`S05`, `T05...`), the stub's signal
    /// that execution halted at a breakpoint or single step completed.
    pub async fn wait_for_stop(&mut self, timeout_dur: Duration) -> Result<(), RdbgError> {
        timeout(timeout_dur, self.recv_reply())
            .await
            .map_err(|_| RdbgError::Timeout)??;
        Ok(())
    }
}
