use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::video::Fingerprint;
use crate::{Consensus, Error, Profile, ProfileStatus, Result};

/// Number of hashes a reference fingerprint may differ from the length implied by its
/// recorded duration.
pub const REFERENCE_LENGTH_TOLERANCE: usize = 2;

fn hash_index(frame: u64, fps: f64, hash_fps: u32) -> usize {
    (frame as f64 * f64::from(hash_fps) / fps).floor() as usize
}

/// Persisted result of a successful consensus pass: the season's reference episode and its
/// fingerprint trimmed to just the intro.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeasonReference {
    pub revision_id: u32,
    pub hash_fps: u32,
    /// Hex-encoded intro fingerprint.
    pub fingerprint: String,
    /// Intro length of the reference episode, in its native frames.
    pub reference_duration: u64,
    pub average_frames: u64,
    pub average_sample_size: usize,
    pub profile: Profile,
}

impl SeasonReference {
    /// Builds a reference from the chosen profile and its full fingerprint.
    pub fn new(
        profile: &Profile,
        fingerprint: &Fingerprint,
        consensus: &Consensus,
        hash_fps: u32,
    ) -> Self {
        let start = hash_index(profile.start_frame, profile.fps, hash_fps);
        let end = hash_index(profile.end_frame, profile.fps, hash_fps);
        let intro = fingerprint.trimmed(start..end + 1);

        Self {
            revision_id: crate::REVISION_ID,
            hash_fps,
            fingerprint: intro.to_hex(),
            reference_duration: profile.intro_frames(),
            average_frames: consensus.average_frames,
            average_sample_size: consensus.sample_size,
            profile: profile.clone(),
        }
    }

    /// Checks that the reference can be used with the current `hash_fps` and returns the
    /// decoded intro fingerprint.
    pub fn validate(&self, hash_fps: u32) -> Result<Fingerprint> {
        if self.revision_id != crate::REVISION_ID {
            return Err(Error::RevisionMismatch {
                found: self.revision_id,
                expected: crate::REVISION_ID,
            });
        }
        if self.hash_fps != hash_fps {
            return Err(Error::HashRateMismatch {
                stored: self.hash_fps,
                current: hash_fps,
            });
        }
        let fps = self.profile.fps;
        if !fps.is_finite() || fps <= 0.0 {
            return Err(Error::InvalidFrameRate(fps));
        }

        let fingerprint = Fingerprint::from_hex(&self.fingerprint)?;
        // An alignment needs at least two matching hashes.
        if self.reference_duration == 0 || fingerprint.len() < 2 {
            return Err(Error::EmptyReference {
                duration: self.reference_duration,
                len: fingerprint.len(),
            });
        }
        let expected =
            (self.reference_duration as f64 * f64::from(hash_fps) / fps).round() as usize;
        if fingerprint.len().abs_diff(expected) > REFERENCE_LENGTH_TOLERANCE {
            return Err(Error::ReferenceLengthMismatch {
                len: fingerprint.len(),
                expected,
                tolerance: REFERENCE_LENGTH_TOLERANCE,
            });
        }

        Ok(fingerprint)
    }

    /// The reference episode as it enters a new batch: aligned, with its stored bounds.
    pub fn pseudo_profile(&self) -> Profile {
        let mut profile = self.profile.clone();
        profile.status = ProfileStatus::Aligned;
        profile
    }
}

/// File-backed store of [SeasonReference]s, one JSON file per season key.
#[derive(Clone, Debug)]
pub struct SeasonStore {
    dir: PathBuf,
}

impl SeasonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    pub fn save(&self, key: &str, reference: &SeasonReference) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let f = std::fs::File::create(self.path(key))?;
        serde_json::to_writer_pretty(f, reference)?;
        tracing::debug!(key, path = %reference.profile.path().display(), "saved season reference");
        Ok(())
    }

    /// Returns `Ok(None)` if nothing is stored for `key`.
    pub fn load(&self, key: &str) -> Result<Option<SeasonReference>> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        let f = std::fs::File::open(&path)?;
        Ok(Some(serde_json::from_reader(f)?))
    }

    /// Loads the reference for `key` and validates it against `hash_fps`.
    ///
    /// Unreadable or invalid records are logged and ignored; they are left on disk until a
    /// new consensus overwrites them.
    pub fn load_and_validate(&self, key: &str, hash_fps: u32) -> Option<(SeasonReference, Fingerprint)> {
        let reference = match self.load(key) {
            Ok(Some(reference)) => reference,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, "failed to load season reference: {}", e);
                return None;
            }
        };

        match reference.validate(hash_fps) {
            Ok(fingerprint) => Some((reference, fingerprint)),
            Err(e) => {
                tracing::info!(key, "discarding season reference: {}", e);
                None
            }
        }
    }
}
