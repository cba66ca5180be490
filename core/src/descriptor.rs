//! Bit-position descriptors: `"high:low"` ranges and `"bit"` singles
//!
//! Bits are numbered from 0 at the least-significant end of the instruction word. A range is
//! inclusive on both ends and order-independent, so `"20:24"` and `"24:20"` describe the same
//! five bits.
use std::{fmt, str::FromStr};

use serde::Serialize;

/// One contiguous run of source bits contributing to a field
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Descriptor {
    /// Inclusive range, normalized so that `high >= low`
    Range { high: u32, low: u32 },
    /// A single bit
    Bit(u32),
}

/// Why a descriptor string was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("descriptor is empty")]
    Empty,

    #[error("bit index `{0}` is not a decimal number")]
    InvalidIndex(String),

    #[error("expected `high:low` or `bit`, found {0} `:` separators")]
    TooManySeparators(usize),
}

impl Descriptor {
    pub fn range(a: u32, b: u32) -> Self {
        Descriptor::Range { high: a.max(b), low: a.min(b) }
    }

    /// Lowest source bit covered
    pub fn low(&self) -> u32 {
        match *self {
            Descriptor::Range { low, .. } => low,
            Descriptor::Bit(bit) => bit,
        }
    }

    /// Highest source bit covered
    pub fn high(&self) -> u32 {
        match *self {
            Descriptor::Range { high, .. } => high,
            Descriptor::Bit(bit) => bit,
        }
    }

    /// Number of bits covered. Wider than `u32` for `"4294967295:0"`.
    pub fn width(&self) -> u64 {
        u64::from(self.high()) - u64::from(self.low()) + 1
    }

    /// Mask with bits `[low, high]` set, truncated to the low 64 bits
    pub fn mask(&self) -> u64 {
        let width = self.width();
        let ones = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
        ones.checked_shl(self.low()).unwrap_or(0)
    }
}

fn parse_index(text: &str) -> Result<u32, DescriptorError> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DescriptorError::InvalidIndex(text.to_string()));
    }
    text.parse().map_err(|_| DescriptorError::InvalidIndex(text.to_string()))
}

impl FromStr for Descriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DescriptorError::Empty);
        }

        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [bit] => Ok(Descriptor::Bit(parse_index(bit)?)),
            [a, b] => Ok(Descriptor::range(parse_index(a)?, parse_index(b)?)),
            _ => Err(DescriptorError::TooManySeparators(parts.len() - 1)),
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Range { high, low } => write!(f, "{high}:{low}"),
            Descriptor::Bit(bit) => write!(f, "{bit}"),
        }
    }
}
