//! Fixtures shared by unit tests.

use crate::video::Fingerprint;

/// Deterministic pseudo-random hashes (xorshift64).
pub(crate) fn random_hashes(seed: u64, len: usize) -> Vec<u64> {
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        })
        .collect()
}

/// `prefix` random hashes, then `intro`, then `suffix` random hashes.
pub(crate) fn episode(seed: u64, prefix: usize, intro: &[u64], suffix: usize) -> Fingerprint {
    let mut hashes = random_hashes(seed, prefix);
    hashes.extend_from_slice(intro);
    hashes.extend(random_hashes(seed + 1000, suffix));
    Fingerprint::from(hashes)
}
