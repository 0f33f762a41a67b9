use std::fmt::{self, Display};
use std::ops::Range;

use crate::{Error, Result};

/// Number of hex digits used to encode a single [FrameHash].
pub const HASH_CODE_LEN: usize = 16;

/// A 64-bit perceptual hash of a single sampled frame.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct FrameHash(pub u64);

impl FrameHash {
    /// Hamming distance between two hashes.
    #[inline(always)]
    pub fn distance(&self, other: &FrameHash) -> u32 {
        u64::count_ones(self.0 ^ other.0)
    }

    /// Returns true if the two hashes are within `threshold` bits of each other (exclusive).
    #[inline(always)]
    pub fn matches(&self, other: &FrameHash, threshold: u32) -> bool {
        self.distance(other) < threshold
    }
}

impl Display for FrameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Ordered sequence of frame hashes for a single video, sampled at a fixed rate.
///
/// A fingerprint is never mutated once built. Trimming returns a new one.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Fingerprint {
    hashes: Vec<FrameHash>,
}

impl Fingerprint {
    pub fn new(hashes: Vec<FrameHash>) -> Self {
        Self { hashes }
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn hashes(&self) -> &[FrameHash] {
        &self.hashes
    }

    /// Returns a copy of the hashes in `range`, clamped to the bounds of this fingerprint.
    pub fn trimmed(&self, range: Range<usize>) -> Fingerprint {
        let end = range.end.min(self.hashes.len());
        let start = range.start.min(end);
        Fingerprint::new(self.hashes[start..end].to_vec())
    }

    /// Encodes the fingerprint as a flat string of fixed-width hex codes.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(self.hashes.len() * HASH_CODE_LEN);
        for h in &self.hashes {
            out.push_str(&h.to_string());
        }
        out
    }

    /// Parses a string produced by [Fingerprint::to_hex].
    ///
    /// Surrounding whitespace is ignored. The remaining length must be a multiple of
    /// [HASH_CODE_LEN].
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() % HASH_CODE_LEN != 0 || !s.is_ascii() {
            return Err(Error::InvalidHashCode(s.chars().take(32).collect()));
        }

        let mut hashes = Vec::with_capacity(s.len() / HASH_CODE_LEN);
        for i in (0..s.len()).step_by(HASH_CODE_LEN) {
            let code = &s[i..i + HASH_CODE_LEN];
            let h = u64::from_str_radix(code, 16)
                .map_err(|_| Error::InvalidHashCode(code.to_owned()))?;
            hashes.push(FrameHash(h));
        }

        Ok(Self { hashes })
    }
}

impl From<Vec<u64>> for Fingerprint {
    fn from(raw: Vec<u64>) -> Self {
        Self::new(raw.into_iter().map(FrameHash).collect())
    }
}
