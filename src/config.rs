use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::video::HashAlgorithm;

/// Default hash rate (hashes per second of video).
///
/// Fingerprints are sampled at this rate regardless of the native frame rate of a video.
pub const DEFAULT_HASH_FPS: u32 = 2;

/// Default hash match threshold.
///
/// Two frame hashes match if their Hamming distance is strictly below this value. The
/// range is 1 (exact match only) to 65 (everything matches).
pub const DEFAULT_HASH_MATCH_THRESHOLD: u32 = 5;

/// Default upper bound on how much of each video is fingerprinted (minutes).
///
/// At most the first quarter of a video is fingerprinted, and never more than this.
pub const DEFAULT_MAX_FINGERPRINT_MINUTES: u32 = 10;

/// Default minimum intro length (seconds).
///
/// Anything shorter is reported as "no intro".
pub const DEFAULT_MIN_INTRO_LENGTH: u64 = 10;

/// Default maximum intro length (seconds).
///
/// Detected intros longer than this are left out of the season statistics.
pub const DEFAULT_MAX_INTRO_LENGTH: u64 = 300;

/// Default fraction of the duration pool trimmed before averaging.
///
/// Half of it is cut from each end, so 0.2 keeps the middle 80%.
pub const DEFAULT_TRIM_FRACTION: f32 = 0.2;

/// Default tolerance (seconds) between an intro and the season average for the intro to
/// be considered conforming.
pub const DEFAULT_CONFORMING_TOLERANCE: f32 = 15.0;

/// Default number of concurrent fingerprinting workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Default directory for cached fingerprints and season references.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Tuning knobs for intro detection.
///
/// Built with [Default] and adjusted through the `with_*` methods:
///
/// ```
/// use std::time::Duration;
/// use skipper::Config;
///
/// let config = Config::default()
///     .with_hash_fps(3)
///     .with_min_intro_length(Duration::from_secs(15));
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    hash_fps: u32,
    hash_match_threshold: u32,
    hash_algorithm: HashAlgorithm,
    max_fingerprint_minutes: u32,
    min_intro_length: Duration,
    max_intro_length: Duration,
    trim_fraction: f32,
    conforming_tolerance: f32,
    preroll: Duration,
    workers: usize,
    data_dir: PathBuf,
    persist: bool,
    force: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hash_fps: DEFAULT_HASH_FPS,
            hash_match_threshold: DEFAULT_HASH_MATCH_THRESHOLD,
            hash_algorithm: HashAlgorithm::default(),
            max_fingerprint_minutes: DEFAULT_MAX_FINGERPRINT_MINUTES,
            min_intro_length: Duration::from_secs(DEFAULT_MIN_INTRO_LENGTH),
            max_intro_length: Duration::from_secs(DEFAULT_MAX_INTRO_LENGTH),
            trim_fraction: DEFAULT_TRIM_FRACTION,
            conforming_tolerance: DEFAULT_CONFORMING_TOLERANCE,
            preroll: Duration::ZERO,
            workers: DEFAULT_WORKERS,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            persist: true,
            force: false,
        }
    }
}

impl Config {
    /// Returns a new [Config] with the provided `hash_fps`. Zero is bumped to one.
    pub fn with_hash_fps(mut self, hash_fps: u32) -> Self {
        self.hash_fps = hash_fps.max(1);
        self
    }

    /// Returns a new [Config] with the provided `hash_match_threshold`.
    pub fn with_hash_match_threshold(mut self, hash_match_threshold: u32) -> Self {
        self.hash_match_threshold = hash_match_threshold;
        self
    }

    /// Returns a new [Config] with the provided `hash_algorithm`.
    pub fn with_hash_algorithm(mut self, hash_algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = hash_algorithm;
        self
    }

    /// Returns a new [Config] with the provided `max_fingerprint_minutes`.
    pub fn with_max_fingerprint_minutes(mut self, max_fingerprint_minutes: u32) -> Self {
        self.max_fingerprint_minutes = max_fingerprint_minutes;
        self
    }

    /// Returns a new [Config] with the provided `min_intro_length`.
    pub fn with_min_intro_length(mut self, min_intro_length: Duration) -> Self {
        self.min_intro_length = min_intro_length;
        self
    }

    /// Returns a new [Config] with the provided `max_intro_length`.
    pub fn with_max_intro_length(mut self, max_intro_length: Duration) -> Self {
        self.max_intro_length = max_intro_length;
        self
    }

    /// Returns a new [Config] with the provided `trim_fraction`, clamped to `[0, 1)`.
    pub fn with_trim_fraction(mut self, trim_fraction: f32) -> Self {
        self.trim_fraction = trim_fraction.clamp(0.0, 0.99);
        self
    }

    /// Returns a new [Config] with the provided `conforming_tolerance` (seconds).
    pub fn with_conforming_tolerance(mut self, conforming_tolerance: f32) -> Self {
        self.conforming_tolerance = conforming_tolerance;
        self
    }

    /// Returns a new [Config] with the provided `preroll`.
    ///
    /// The preroll is subtracted from the end of every detected intro, so playback resumes a
    /// little before the intro is over.
    pub fn with_preroll(mut self, preroll: Duration) -> Self {
        self.preroll = preroll;
        self
    }

    /// Returns a new [Config] with the provided number of fingerprinting `workers`.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Returns a new [Config] with the provided `data_dir`.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Returns a new [Config] with `persist` set to the provided value. When unset, neither
    /// fingerprints nor season references are written to disk.
    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Returns a new [Config] with `force` set to the provided value. When set, cached
    /// fingerprints and season references are ignored.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn hash_fps(&self) -> u32 {
        self.hash_fps
    }

    pub fn hash_match_threshold(&self) -> u32 {
        self.hash_match_threshold
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    pub fn max_fingerprint_minutes(&self) -> u32 {
        self.max_fingerprint_minutes
    }

    pub fn min_intro_length(&self) -> Duration {
        self.min_intro_length
    }

    pub fn max_intro_length(&self) -> Duration {
        self.max_intro_length
    }

    pub fn trim_fraction(&self) -> f32 {
        self.trim_fraction
    }

    pub fn conforming_tolerance(&self) -> f32 {
        self.conforming_tolerance
    }

    pub fn preroll(&self) -> Duration {
        self.preroll
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn fingerprint_dir(&self) -> PathBuf {
        self.data_dir.join("fingerprints")
    }

    pub fn season_dir(&self) -> PathBuf {
        self.data_dir.join("seasons")
    }

    pub fn persist(&self) -> bool {
        self.persist
    }

    pub fn force(&self) -> bool {
        self.force
    }

    /// Number of hashes to compute for a video of the given duration: a quarter of the
    /// video, capped at `max_fingerprint_minutes`.
    pub fn frame_budget(&self, video_duration: Duration) -> usize {
        let max_secs = f64::from(self.max_fingerprint_minutes) * 60.0;
        let secs = (video_duration.as_secs_f64() / 4.0).min(max_secs);
        (secs * f64::from(self.hash_fps)) as usize
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_frame_budget() {
        let config = Config::default();
        // 20 minute episode: first 5 minutes.
        assert_eq!(config.frame_budget(Duration::from_secs(20 * 60)), 600);
        // 60 minute episode: capped at 10 minutes.
        assert_eq!(config.frame_budget(Duration::from_secs(60 * 60)), 1200);
        assert_eq!(config.frame_budget(Duration::ZERO), 0);

        let config = config.with_hash_fps(3).with_max_fingerprint_minutes(1);
        assert_eq!(config.frame_budget(Duration::from_secs(60 * 60)), 180);
    }

    #[test]
    fn test_builder_clamps() {
        let config = Config::default()
            .with_hash_fps(0)
            .with_workers(0)
            .with_trim_fraction(3.0);
        assert_eq!(config.hash_fps(), 1);
        assert_eq!(config.workers(), 1);
        assert!(config.trim_fraction() < 1.0);
    }
}
