//! # Segmented & Linear Address Model
//!
//! A sealed value type for real-mode addresses (§3, §9 "mixed address
//! representations"). Every boundary in this crate parses a raw string into
//! an `Address` exactly once; nothing downstream passes strings around.

use crate::error::EmuError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A real-mode segment:offset pair together with its canonical linear form.
///
/// The pair and the linear value always agree: `linear == (segment << 4) +
/// offset`. Constructing from a linear address recovers `segment = (linear >>
/// 4) & 0xFFFF` and `offset = linear & 0xF`, per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub segment: u16,
    pub offset: u16,
    pub linear: u32,
}

impl Address {
    /// Builds an `Address` from an explicit segment:offset pair.
    pub fn from_seg_off(segment: u16, offset: u16) -> Self {
        let linear = ((segment as u32) << 4) + offset as u32;
        Address {
            segment,
            offset,
            linear,
        }
    }

    /// Builds an `Address` from a linear value, recovering segment:offset per
    /// the §3 invariant.
    pub fn from_linear(linear: u32) -> Self {
        let segment = ((linear >> 4) & 0xFFFF) as u16;
        let offset = (linear & 0xF) as u16;
        Address {
            segment,
            offset,
            linear,
        }
    }

    /// `SSSS:OOOO` hex rendering.
    pub fn seg_off_string(&self) -> String {
        format!("{:04X}:{:04X}", self.segment, self.offset)
    }

    /// Parses the address literal grammar from §6:
    /// `^[0-9A-Fa-f]{1,4}:[0-9A-Fa-f]{1,4}$` (segment:offset),
    /// `^0[xX][0-9A-Fa-f]+$` (hex linear),
    /// `^[0-9]+$` (decimal linear).
    pub fn parse(literal: &str) -> Result<Self, EmuError> {
        let literal = literal.trim();
        if let Some((seg, off)) = literal.split_once(':') {
            if is_hex(seg) && is_hex(off) && !seg.is_empty() && !off.is_empty() {
                let segment = u16::from_str_radix(seg, 16)
                    .map_err(|_| EmuError::argument(format!("bad segment literal: {literal}")))?;
                let offset = u16::from_str_radix(off, 16)
                    .map_err(|_| EmuError::argument(format!("bad offset literal: {literal}")))?;
                return Ok(Address::from_seg_off(segment, offset));
            }
            return Err(EmuError::argument(format!(
                "not a valid segment:offset literal: {literal}"
            )));
        }
        if let Some(hex_part) = literal
            .strip_prefix("0x")
            .or_else(|| literal.strip_prefix("0X"))
        {
            let linear = u32::from_str_radix(hex_part, 16)
                .map_err(|_| EmuError::argument(format!("bad hex literal: {literal}")))?;
            return Ok(Address::from_linear(linear));
        }
        if literal.chars().all(|c| c.is_ascii_digit()) && !literal.is_empty() {
            let linear = literal
                .parse::<u32>()
                .map_err(|_| EmuError::argument(format!("bad decimal literal: {literal}")))?;
            return Ok(Address::from_linear(linear));
        }
        Err(EmuError::argument(format!(
            "unrecognized address literal: {literal}"
        )))
    }
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.len() <= 4 && s.chars().all(|c| c.is_ascii_hexdigit())
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:X})", self.seg_off_string(), self.linear)
    }
}

/// The Mode-13h VGA framebuffer: physical `0xA0000`, 64,000 bytes, 320x200
/// one byte per pixel into a palette.
pub const FRAMEBUFFER_LINEAR: u32 = 0xA0000;
pub const FRAMEBUFFER_LEN: usize = 64_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seg_off_round_trips_through_linear() {
        for seg in [0u16, 1, 0x1234, 0xFFFF] {
            for off in [0u16, 1, 0x00FF, 0xFFFF] {
                let a = Address::from_seg_off(seg, off);
                let parsed = Address::parse(&a.seg_off_string()).unwrap();
                assert_eq!(parsed.linear, ((seg as u32) << 4) + off as u32);
            }
        }
    }

    #[test]
    fn parse_seg_off() {
        let a = Address::parse("1000:0020").unwrap();
        assert_eq!(a.segment, 0x1000);
        assert_eq!(a.offset, 0x0020);
        assert_eq!(a.linear, (0x1000u32 << 4) + 0x0020);
    }

    #[test]
    fn parse_hex_linear() {
        let a = Address::parse("0xA0000").unwrap();
        assert_eq!(a.linear, 0xA0000);
        assert_eq!(a.segment, 0xA000);
        assert_eq!(a.offset, 0x0000);
    }

    #[test]
    fn parse_decimal_linear() {
        let a = Address::parse("655360").unwrap();
        assert_eq!(a.linear, 655360);
    }

    #[test]
    fn linear_round_trip_invariant() {
        for linear in [0u32, 1, 0xA0000, 0xFFFFF, 0x100000] {
            let a = Address::from_linear(linear);
            assert_eq!(a.segment, ((linear >> 4) & 0xFFFF) as u16);
            assert_eq!(a.offset, (linear & 0xF) as u16);
            assert_eq!(a.linear, linear);
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(Address::parse("not-an-address").is_err());
        assert!(Address::parse("").is_err());
        assert!(Address::parse("12345:1").is_err());
    }
}
