//! # Capture Types
//!
//! Value types for the capture pipeline (§3, §4.8). The pipeline itself lives
//! in `capture_pipeline.rs`; this module only holds the request/result shapes
//! so that both the pipeline and the HTTP/WebSocket layers can share them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::registers::RegisterFile;

/// Binary image format tag a screenshot may come back in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Ppm,
    Bmp,
    Png,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Ppm => "ppm",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Png => "png",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Ppm => "image/x-portable-pixmap",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Png => "image/png",
        }
    }
}

/// One extra memory range to dump alongside the standard framebuffer /
/// registers / screenshot artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraRange {
    pub address: String,
    pub size: usize,
    pub filename: String,
}

/// An optional key sequence to inject before observing state, with optional
/// per-key delay and a post-sequence settle wait.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySequenceSpec {
    pub keys: Vec<String>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub wait_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRequest {
    /// Used to name artifacts: `{prefix}_framebuffer.bin`, etc.
    pub prefix: String,
    #[serde(default)]
    pub snapshot: Option<String>,
    #[serde(default)]
    pub breakpoint: Option<String>,
    #[serde(default)]
    pub keys: Option<KeySequenceSpec>,
    #[serde(default)]
    pub extra: Vec<ExtraRange>,
    #[serde(default)]
    pub skip_framebuffer: bool,
    #[serde(default)]
    pub skip_registers: bool,
    #[serde(default)]
    pub skip_screenshot: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl CaptureRequest {
    pub fn new(prefix: impl Into<String>) -> Self {
        CaptureRequest {
            prefix: prefix.into(),
            snapshot: None,
            breakpoint: None,
            keys: None,
            extra: Vec::new(),
            skip_framebuffer: false,
            skip_registers: false,
            skip_screenshot: false,
            timeout_ms: None,
        }
    }

    pub fn breakpoint_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(30_000))
    }

    pub fn keys_wait(&self) -> Duration {
        Duration::from_millis(
            self.keys
                .as_ref()
                .and_then(|k| k.wait_ms)
                .unwrap_or(2_000),
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureResult {
    pub prefix: String,
    pub framebuffer: Option<Vec<u8>>,
    pub screenshot: Option<Vec<u8>>,
    pub screenshot_format: Option<ImageFormat>,
    pub registers: Option<RegisterFile>,
    pub extra: BTreeMap<String, Vec<u8>>,
    /// artifact name (`framebuffer`, `screenshot`, extra filenames) -> sha256 hex
    pub checksums: BTreeMap<String, String>,
    pub created_at_unix_ms: i64,
}

impl CaptureResult {
    pub fn new(prefix: impl Into<String>, created_at_unix_ms: i64) -> Self {
        CaptureResult {
            prefix: prefix.into(),
            created_at_unix_ms,
            ..Default::default()
        }
    }
}

/// Byte-exact comparison result between a freshly generated artifact and its
/// golden counterpart (§4.8 "Golden comparison").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenComparison {
    pub artifact: String,
    pub matched: bool,
    pub actual_checksum: String,
    pub golden_checksum: String,
    /// The offset of the first differing byte, or the length of the shorter
    /// file when lengths differ.
    pub first_diff_offset: Option<usize>,
    pub first_diff_bytes: Option<(u8, u8)>,
}
