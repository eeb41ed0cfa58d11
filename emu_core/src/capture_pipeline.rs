//! # Capture Pipeline
//!
//! Composes the `Backend` trait's primitives into one observation (§4.8):
//! optionally restore a snapshot, optionally wait for a breakpoint or send a
//! key sequence, then gather framebuffer/registers/screenshot/extra ranges
//! and checksum each artifact. A capability the active backend lacks (e.g.
//! the session backend has no screenshot) is skipped rather than failing
//! the whole capture, unless the caller explicitly asked for it by not
//! setting the corresponding `skip_*` flag and the backend has no fallback
//! at all — in that case the missing artifact is simply absent from the
//! result, matching §4.8's "best-effort" framing.

use sha2::{Digest, Sha256};

use crate::address::{Address, FRAMEBUFFER_LEN, FRAMEBUFFER_LINEAR};
use crate::backend::Backend;
use crate::capture::{CaptureRequest, CaptureResult};
use crate::error::{EmuError, Result};

fn checksum_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn now_unix_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Returns `Ok(None)` for a `NotSupported` error (treated as "this backend
/// has nothing to offer here") and propagates any other error as a genuine
/// capture failure.
async fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(EmuError::NotSupported(_)) => Ok(None),
        Err(other) => Err(other),
    }
}

pub async fn run_capture(backend: &(impl Backend + ?Sized), request: CaptureRequest) -> Result<CaptureResult> {
    if let Some(snapshot) = &request.snapshot {
        backend.load_snapshot(snapshot).await?;
    }

    if let Some(keys) = &request.keys {
        backend
            .send_keys_sequence(&keys.keys, keys.delay_ms)
            .await?;
        tokio::time::sleep(request.keys_wait()).await;
    }

    if let Some(breakpoint_spec) = &request.breakpoint {
        let address = Address::parse(breakpoint_spec)?;
        let breakpoint = backend
            .set_breakpoint(crate::breakpoint::BreakpointKind::Execution, Some(address), None, None)
            .await?;
        backend.resume().await?;
        let hit = backend
            .wait_for_breakpoint_hit(breakpoint.id, request.breakpoint_timeout())
            .await;
        backend.remove_breakpoint(breakpoint.id).await?;
        if let Err(EmuError::Timeout(_)) = hit {
            return Err(EmuError::Timeout(format!(
                "breakpoint at {breakpoint_spec} was not hit in time"
            )));
        }
        hit?;
    }

    let mut result = CaptureResult::new(request.prefix.clone(), now_unix_ms());

    if !request.skip_framebuffer {
        if let Some(bytes) = optional(
            backend
                .read_memory(Address::from_linear(FRAMEBUFFER_LINEAR), FRAMEBUFFER_LEN)
                .await,
        )
        .await?
        {
            result.checksums.insert("framebuffer".into(), checksum_hex(&bytes));
            result.framebuffer = Some(bytes);
        }
    }

    if !request.skip_registers {
        if let Some(registers) = optional(backend.read_registers().await).await? {
            result.registers = Some(registers);
        }
    }

    if !request.skip_screenshot {
        if let Some((bytes, format)) = optional(backend.screenshot().await).await? {
            result.checksums.insert("screenshot".into(), checksum_hex(&bytes));
            result.screenshot = Some(bytes);
            result.screenshot_format = Some(format);
        }
    }

    for extra in &request.extra {
        let address = Address::parse(&extra.address)?;
        let bytes = backend.read_memory(address, extra.size).await?;
        result.checksums.insert(extra.filename.clone(), checksum_hex(&bytes));
        result.extra.insert(extra.filename.clone(), bytes);
    }

    Ok(result)
}

/// Byte-exact golden comparison (§4.8): checksum both sides and, on
/// mismatch, locate the first differing byte so a caller can report a
/// useful diagnostic instead of just "not equal".
pub fn compare_golden(artifact: &str, actual: &[u8], golden: &[u8]) -> crate::capture::GoldenComparison {
    let actual_checksum = checksum_hex(actual);
    let golden_checksum = checksum_hex(golden);
    let matched = actual_checksum == golden_checksum;
    let (first_diff_offset, first_diff_bytes) = if matched {
        (None, None)
    } else {
        let mismatch = actual
            .iter()
            .zip(golden.iter())
            .enumerate()
            .find(|(_, (a, g))| a != g);
        match mismatch {
            Some((offset, (a, g))) => (Some(offset), Some((*a, *g))),
            None => (Some(actual.len().min(golden.len())), None),
        }
    };
    crate::capture::GoldenComparison {
        artifact: artifact.to_string(),
        matched,
        actual_checksum,
        golden_checksum,
        first_diff_offset,
        first_diff_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_buffers_match() {
        let data = b"dos program output";
        let comparison = compare_golden("framebuffer", data, data);
        assert!(comparison.matched);
        assert!(comparison.first_diff_offset.is_none());
    }

    #[test]
    fn reports_first_diff_offset() {
        let actual = b"AAAAXBBBB";
        let golden = b"AAAAYBBBB";
        let comparison = compare_golden("framebuffer", actual, golden);
        assert!(!comparison.matched);
        assert_eq!(comparison.first_diff_offset, Some(4));
        assert_eq!(comparison.first_diff_bytes, Some((b'X', b'Y')));
    }

    #[test]
    fn reports_length_as_offset_when_prefix_matches() {
        let actual = b"AAAA";
        let golden = b"AAAABBBB";
        let comparison = compare_golden("framebuffer", actual, golden);
        assert!(!comparison.matched);
        assert_eq!(comparison.first_diff_offset, Some(4));
        assert!(comparison.first_diff_bytes.is_none());
    }
}
