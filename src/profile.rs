use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{util, Error, Result};

/// Where a [Profile] is in the detection pipeline.
///
/// `Unprocessed -> Aligned -> {Conforming, NonConforming} -> {Repaired, Rejected}`
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileStatus {
    #[default]
    Unprocessed,
    Aligned,
    Conforming,
    NonConforming,
    Repaired,
    Rejected,
}

/// Intro detection state for a single episode.
///
/// Bounds are expressed in native frames of the episode. `(0, 0)` means that no intro was
/// found.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProfileRecord")]
pub struct Profile {
    pub path: PathBuf,
    pub fps: f64,
    pub total_frames: u64,
    pub start_frame: u64,
    pub end_frame: u64,
    pub start_time: String,
    pub end_time: String,
    pub start_time_ms: u64,
    pub end_time_ms: u64,
    pub status: ProfileStatus,
}

// Serialized form of a profile. Only the path, frame rate and frame count are required.
#[derive(Deserialize)]
struct ProfileRecord {
    path: PathBuf,
    fps: f64,
    total_frames: u64,
    #[serde(default)]
    start_frame: u64,
    #[serde(default)]
    end_frame: u64,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    start_time_ms: u64,
    #[serde(default)]
    end_time_ms: u64,
    #[serde(default)]
    status: ProfileStatus,
}

impl TryFrom<ProfileRecord> for Profile {
    type Error = Error;

    fn try_from(record: ProfileRecord) -> Result<Self> {
        let mut profile = Profile::new(record.path, record.fps, record.total_frames)?;
        profile.start_frame = record.start_frame;
        profile.end_frame = record.end_frame;
        if let Some(start_time) = record.start_time {
            profile.start_time = start_time;
        }
        if let Some(end_time) = record.end_time {
            profile.end_time = end_time;
        }
        profile.start_time_ms = record.start_time_ms;
        profile.end_time_ms = record.end_time_ms;
        profile.status = record.status;
        Ok(profile)
    }
}

impl Profile {
    /// Constructs an unprocessed profile. `fps` must be a positive, finite number.
    pub fn new(path: impl Into<PathBuf>, fps: f64, total_frames: u64) -> Result<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(Error::InvalidFrameRate(fps));
        }
        Ok(Self {
            path: path.into(),
            fps,
            total_frames,
            start_frame: 0,
            end_frame: 0,
            start_time: util::format_timestamp(Duration::ZERO),
            end_time: util::format_timestamp(Duration::ZERO),
            start_time_ms: 0,
            end_time_ms: 0,
            status: ProfileStatus::Unprocessed,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total running time of the episode. Zero if the frame rate is not usable.
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.total_frames as f64 / self.fps).unwrap_or(Duration::ZERO)
    }

    /// Length of the detected intro in frames.
    pub fn intro_frames(&self) -> u64 {
        self.end_frame.saturating_sub(self.start_frame)
    }

    /// Number of native frames spanning `d`.
    pub fn frames_in(&self, d: Duration) -> u64 {
        (d.as_secs_f64() * self.fps) as u64
    }

    pub fn has_intro(&self) -> bool {
        self.intro_frames() > 0
    }

    pub(crate) fn set_bounds(&mut self, (start, end): (u64, u64)) {
        if start <= end {
            self.start_frame = start;
            self.end_frame = end;
        } else {
            self.start_frame = end;
            self.end_frame = start;
        }
    }

    /// Clears the bounds and marks the profile as rejected.
    pub(crate) fn reject(&mut self) {
        self.start_frame = 0;
        self.end_frame = 0;
        self.status = ProfileStatus::Rejected;
    }

    /// Moves the end of the intro back by `preroll`, as long as the intro stays longer
    /// than the preroll itself.
    pub(crate) fn apply_preroll(&mut self, preroll: Duration) {
        let preroll = self.frames_in(preroll);
        if preroll > 0 && self.end_frame > self.start_frame + preroll {
            self.end_frame -= preroll;
        }
    }

    /// Fills in the derived timestamps from the frame bounds.
    pub(crate) fn finalize(&mut self) {
        let to_secs = |frame: u64| (frame as f64 / self.fps).round() as u64;
        let (start, end) = (to_secs(self.start_frame), to_secs(self.end_frame));
        self.start_time_ms = start * 1000;
        self.end_time_ms = end * 1000;
        self.start_time = util::format_timestamp(Duration::from_secs(start));
        self.end_time = util::format_timestamp(Duration::from_secs(end));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_new_validates_fps() {
        assert!(Profile::new("a.mkv", 0.0, 100).is_err());
        assert!(Profile::new("a.mkv", f64::NAN, 100).is_err());
        assert!(Profile::new("a.mkv", -24.0, 100).is_err());
        let profile = Profile::new("a.mkv", 24.0, 2400).unwrap();
        assert_eq!(profile.duration(), Duration::from_secs(100));
        assert_eq!(profile.status, ProfileStatus::Unprocessed);
    }

    #[test]
    fn test_intro_frames_saturates() {
        let mut profile = Profile::new("a.mkv", 24.0, 2400).unwrap();
        profile.start_frame = 50;
        profile.end_frame = 10;
        assert_eq!(profile.intro_frames(), 0);
        profile.set_bounds((90, 30));
        assert_eq!((profile.start_frame, profile.end_frame), (30, 90));
    }

    #[test]
    fn test_finalize() {
        let mut profile = Profile::new("a.mkv", 24.0, 48_000).unwrap();
        profile.set_bounds((240, 2172));
        profile.finalize();
        assert_eq!(profile.start_time, "0:00:10");
        assert_eq!(profile.end_time, "0:01:31");
        assert_eq!((profile.start_time_ms, profile.end_time_ms), (10_000, 91_000));
    }

    #[test]
    fn test_apply_preroll() {
        let mut profile = Profile::new("a.mkv", 24.0, 48_000).unwrap();
        profile.set_bounds((0, 24 * 60));
        profile.apply_preroll(Duration::from_secs(3));
        assert_eq!(profile.end_frame, 24 * 57);

        profile.set_bounds((0, 24 * 2));
        profile.apply_preroll(Duration::from_secs(3));
        assert_eq!(profile.end_frame, 24 * 2);
    }

    #[test]
    fn test_serde() {
        let profile = Profile::new("a.mkv", 25.0, 34_000).unwrap();
        let json = serde_json::to_string(&profile).unwrap();
        let back: Profile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, profile);

        let stub: Profile =
            serde_json::from_str(r#"{"path":"b.mkv","fps":25.0,"total_frames":100}"#).unwrap();
        assert_eq!(stub.status, ProfileStatus::Unprocessed);
        assert_eq!(stub.end_frame, 0);
        assert_eq!(stub.start_time, "0:00:00");
    }

    #[test]
    fn test_deserialize_validates_fps() {
        for fps in ["0.0", "-25.0"] {
            let json = format!(r#"{{"path":"b.mkv","fps":{},"total_frames":100}}"#, fps);
            let err = serde_json::from_str::<Profile>(&json).unwrap_err();
            assert!(err.to_string().contains("invalid frame rate"), "{}", err);
        }
    }

    #[test]
    fn test_duration_with_unusable_fps() {
        let mut profile = Profile::new("a.mkv", 24.0, 2400).unwrap();
        profile.fps = 0.0;
        assert_eq!(profile.duration(), Duration::ZERO);
        profile.fps = f64::NAN;
        assert_eq!(profile.duration(), Duration::ZERO);
    }
}
