//! Fingerprint value type and similarity scoring.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of bits in a fingerprint.
const BITS: u32 = 64;

/// A 64-bit perceptual fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Wraps a raw hash value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw hash value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Number of differing bits.
    #[must_use]
    pub const fn hamming_distance(&self, other: &Self) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Similarity to another fingerprint in `[0, 100]`. See [`similarity`].
    #[must_use]
    pub const fn similarity(&self, other: &Self) -> u8 {
        similarity(*self, *other)
    }

    /// Returns the 16-digit lowercase hex form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }

    /// Parses the hex form produced by [`Self::to_hex`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the string is not 1-16 hex digits.
    pub fn from_hex(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_start_matches("0x");
        if trimmed.is_empty() || trimmed.len() > 16 {
            return Err(Error::InvalidInput(format!(
                "fingerprint must be 1-16 hex digits: {s}"
            )));
        }
        u64::from_str_radix(trimmed, 16)
            .map(Self)
            .map_err(|e| Error::InvalidInput(format!("invalid fingerprint {s}: {e}")))
    }

    /// Bit-for-bit conversion for storage in signed 64-bit columns.
    #[must_use]
    pub const fn to_i64(&self) -> i64 {
        i64::from_ne_bytes(self.0.to_ne_bytes())
    }

    /// Inverse of [`Self::to_i64`].
    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        Self(u64::from_ne_bytes(value.to_ne_bytes()))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

/// Similarity of two fingerprints as an integer percentage.
///
/// `100 * (64 - d) / 64` rounded to the nearest integer, where `d` is the
/// Hamming distance. Exact halves (d = 8, 24, 40, 56) round down, so a tie never
/// lifts a pair over a threshold. Threshold comparisons are inclusive.
///
/// | bits differing | similarity |
/// |----------------|------------|
/// | 0 | 100 |
/// | 1 | 98 |
/// | 2 | 97 |
/// | 8 | 87 |
/// | 64 | 0 |
#[must_use]
pub const fn similarity(a: Fingerprint, b: Fingerprint) -> u8 {
    let same = BITS - a.hamming_distance(&b);
    let score = (100 * same + BITS / 2 - 1) / BITS;
    // score <= 100 by construction
    score as u8
}
