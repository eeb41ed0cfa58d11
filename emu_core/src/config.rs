//! # Runtime Configuration
//!
//! Environment-driven configuration for the broker and CLI, following the
//! teacher's layered `RuntimeConfig` pattern but simplified to plain
//! environment variables (no JSON config-file cascade): this crate has no
//! equivalent to the teacher's multi-environment cloud deployment, so one
//! flat layer is all the ambient config surface needs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("environment variable {name} had an invalid value {value:?}: {source}")]
    InvalidValue {
        name: String,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub http_addr: String,
    pub http_port: u16,
    pub log_dir: String,
    pub emulator_binary: String,
    pub machine_control_socket: String,
    pub remote_debug_port: u16,
}

impl RuntimeConfig {
    /// Reads every field from the environment, applying the documented
    /// defaults for anything not overridden.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(RuntimeConfig {
            http_addr: env_or("EMU_BROKER_HTTP_ADDR", "0.0.0.0"),
            http_port: env_parsed_or("EMU_BROKER_HTTP_PORT", 8080)?,
            log_dir: env_or("EMU_BROKER_LOG_DIR", "./logs"),
            emulator_binary: env_or("EMU_EMULATOR_BINARY", "qemu-system-i386"),
            machine_control_socket: env_or("EMU_MACHINE_CONTROL_SOCKET", "/tmp/emu-mc.sock"),
            remote_debug_port: env_parsed_or("EMU_REMOTE_DEBUG_PORT", 1234)?,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parsed_or(name: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.parse::<u16>().map_err(|source| ConfigError::InvalidValue {
            name: name.to_string(),
            value,
            source,
        }),
        Err(_) => Ok(default),
    }
}

impl std::fmt::Display for RuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RuntimeConfig {{ http: {}:{}, log_dir: {}, emulator_binary: {}, mc_socket: {}, rdbg_port: {} }}",
            self.http_addr,
            self.http_port,
            self.log_dir,
            self.emulator_binary,
            self.machine_control_socket,
            self.remote_debug_port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_to_default() {
        assert_eq!(env_or("EMU_TEST_DOES_NOT_EXIST_XYZ", "fallback"), "fallback");
    }

    #[test]
    fn env_parsed_or_falls_back_to_default() {
        assert_eq!(env_parsed_or("EMU_TEST_DOES_NOT_EXIST_XYZ", 42).unwrap(), 42);
    }
}
