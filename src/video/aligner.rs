use super::{Fingerprint, FrameHash};
use crate::{Config, Error, Result};

/// Selects which of the two aligned profiles a caller should update.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Side {
    Both,
    First,
    Second,
}

impl Side {
    pub fn first(&self) -> bool {
        matches!(self, Side::Both | Side::First)
    }

    pub fn second(&self) -> bool {
        matches!(self, Side::Both | Side::Second)
    }
}

/// Inclusive `(start, end)` bounds of the matched span in each input, in native frames.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Alignment {
    pub first: (u64, u64),
    pub second: (u64, u64),
}

impl Alignment {
    /// No match.
    pub const NONE: Alignment = Alignment {
        first: (0, 0),
        second: (0, 0),
    };

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

// Best diagonal found so far. Indices are (needle, haystack).
#[derive(Copy, Clone, Debug)]
struct DiagonalMatch {
    first: (usize, usize),
    last: (usize, usize),
    count: usize,
}

/// Finds the longest run of matching hashes shared by two fingerprints.
///
/// The shorter fingerprint (the needle) is slid across the longer one (the haystack), one
/// hash at a time, so that either video may start before the other. At each offset the
/// index-aligned pairs whose hashes match are counted, and the offset with the most matches
/// wins. The first and last matched pairs of the winning offset bound the shared span.
///
/// This runs in O(n * (n + m)) time, where n and m are the fingerprint lengths. Both are
/// capped by the fingerprint budget, not by the length of the videos.
#[derive(Copy, Clone, Debug)]
pub struct PairAligner {
    hash_fps: u32,
    hash_match_threshold: u32,
}

impl PairAligner {
    pub fn new(hash_fps: u32, hash_match_threshold: u32) -> Self {
        Self {
            hash_fps: hash_fps.max(1),
            hash_match_threshold,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.hash_fps(), config.hash_match_threshold())
    }

    /// Returns the matched span in hash-index coordinates as `(a_start, a_end), (b_start, b_end)`,
    /// or `None` if no offset yields at least two matching pairs.
    pub fn best_match(
        &self,
        a: &Fingerprint,
        b: &Fingerprint,
    ) -> Option<((usize, usize), (usize, usize))> {
        if a.is_empty() || b.is_empty() {
            return None;
        }

        // On equal lengths, `a` is the needle.
        let a_is_needle = a.len() <= b.len();
        let (needle, haystack) = if a_is_needle {
            (a.hashes(), b.hashes())
        } else {
            (b.hashes(), a.hashes())
        };

        let m = self.slide(needle, haystack)?;
        let needle_span = (m.first.0, m.last.0);
        let haystack_span = (m.first.1, m.last.1);

        if a_is_needle {
            Some((needle_span, haystack_span))
        } else {
            Some((haystack_span, needle_span))
        }
    }

    fn slide(&self, needle: &[FrameHash], haystack: &[FrameHash]) -> Option<DiagonalMatch> {
        let (n, h) = (needle.len() as isize, haystack.len() as isize);
        let mut best: Option<DiagonalMatch> = None;

        // Needle index `i` is compared with haystack index `i + offset`. Negative offsets
        // place the start of the haystack after the start of the needle.
        for offset in -(n - 1)..h {
            let lo = (-offset).max(0);
            let hi = n.min(h - offset);

            // A winner needs at least two matches, and a later offset must strictly beat
            // the current best.
            let to_beat = best.map(|m| m.count).unwrap_or(1);
            if ((hi - lo) as usize) <= to_beat {
                continue;
            }

            let mut current: Option<DiagonalMatch> = None;
            for i in lo..hi {
                let (i, j) = (i as usize, (i + offset) as usize);
                if !needle[i].matches(&haystack[j], self.hash_match_threshold) {
                    continue;
                }
                match current.as_mut() {
                    Some(m) => {
                        m.last = (i, j);
                        m.count += 1;
                    }
                    None => {
                        current = Some(DiagonalMatch {
                            first: (i, j),
                            last: (i, j),
                            count: 1,
                        })
                    }
                }
            }

            if let Some(m) = current {
                // Pairs on a diagonal never span more than the needle.
                debug_assert!(m.last.0 - m.first.0 < needle.len());
                if m.count > to_beat {
                    best = Some(m);
                }
            }
        }

        best
    }

    /// Aligns two fingerprints and converts the matched span of each to native frames
    /// using the native frame rate of its video.
    ///
    /// Returns [Alignment::NONE] if either fingerprint is empty or nothing matches.
    pub fn align(
        &self,
        a: &Fingerprint,
        fps_a: f64,
        b: &Fingerprint,
        fps_b: f64,
    ) -> Result<Alignment> {
        let span = tracing::span!(tracing::Level::TRACE, "align", a = a.len(), b = b.len());
        let _enter = span.enter();

        for fps in [fps_a, fps_b] {
            if !fps.is_finite() || fps <= 0.0 {
                return Err(Error::InvalidFrameRate(fps));
            }
        }

        let ((a_start, a_end), (b_start, b_end)) = match self.best_match(a, b) {
            Some(m) => m,
            None => return Ok(Alignment::NONE),
        };

        let alignment = Alignment {
            first: (self.to_native(a_start, fps_a), self.to_native(a_end, fps_a)),
            second: (self.to_native(b_start, fps_b), self.to_native(b_end, fps_b)),
        };
        tracing::trace!(?alignment, "aligned fingerprints");

        Ok(alignment)
    }

    /// Converts a hash index to a native frame index.
    #[inline]
    pub fn to_native(&self, hash_index: usize, native_fps: f64) -> u64 {
        (hash_index as f64 * native_fps / f64::from(self.hash_fps)).floor() as u64
    }
}
