use std::path::PathBuf;

pub mod config;
pub mod corrector;
pub mod detector;
pub mod profile;
pub mod season;
#[cfg(test)]
mod testing;
pub mod util;
pub mod video;

pub use config::Config;
pub use corrector::{Consensus, ProfileCorrector};
pub use detector::{IntroDetector, StopToken};
pub use profile::{Profile, ProfileStatus};
pub use season::{SeasonReference, SeasonStore};

/// Revision of the on-disk fingerprint and season reference formats.
///
/// Bump this whenever the hashing pipeline changes in a way that makes previously
/// persisted hashes incomparable with new ones.
pub const REVISION_ID: u32 = 2;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid frame rate: {0}")]
    InvalidFrameRate(f64),
    #[error("invalid frame hash code: {0:?}")]
    InvalidHashCode(String),
    #[error("frame source failed for {path:?}: {reason}")]
    FrameSource { path: PathBuf, reason: String },
    #[error("format revision mismatch: found={found} expected={expected}")]
    RevisionMismatch { found: u32, expected: u32 },
    #[error("hash rate mismatch: stored={stored} current={current}")]
    HashRateMismatch { stored: u32, current: u32 },
    #[error("hash algorithm mismatch: stored={stored:?} current={current:?}")]
    AlgorithmMismatch {
        stored: video::HashAlgorithm,
        current: video::HashAlgorithm,
    },
    #[error("reference fingerprint has {len} hashes, expected {expected} (+/- {tolerance})")]
    ReferenceLengthMismatch {
        len: usize,
        expected: usize,
        tolerance: usize,
    },
    #[error("reference intro is too short: duration={duration} frames, {len} hashes")]
    EmptyReference { duration: u64, len: usize },
    #[cfg(feature = "ffmpeg")]
    #[error("FFmpeg error: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),
    #[error("serde_json error: {0}")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
