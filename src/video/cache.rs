use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{Fingerprint, HashAlgorithm};
use crate::{util, Error, Result};

/// Metadata stored next to each cached fingerprint.
#[derive(Debug, Deserialize, Serialize)]
struct CacheMeta {
    revision_id: u32,
    hash_fps: u32,
    algorithm: HashAlgorithm,
    len: usize,
}

/// File-backed fingerprint cache.
///
/// Each video gets its own directory under the cache root, named by a filesystem-safe slug
/// of the video path. The directory holds the fingerprint as a flat hex string and a small
/// JSON file describing how it was generated.
#[derive(Clone, Debug)]
pub struct FingerprintCache {
    root: PathBuf,
    hash_fps: u32,
    algorithm: HashAlgorithm,
}

impl FingerprintCache {
    pub fn new(root: impl Into<PathBuf>, hash_fps: u32, algorithm: HashAlgorithm) -> Self {
        Self {
            root: root.into(),
            hash_fps,
            algorithm,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory that holds the cache entry for `video`.
    pub fn entry_dir(&self, video: impl AsRef<Path>) -> PathBuf {
        self.root.join(util::path_slug(video))
    }

    /// Loads the cached fingerprint for `video`.
    ///
    /// Returns `Ok(None)` when there is no usable entry: nothing cached yet, the entry was
    /// produced by a different format revision, hash rate or algorithm, or its length is
    /// inconsistent with its metadata or with `budget`.
    pub fn load(&self, video: impl AsRef<Path>, budget: usize) -> Result<Option<Fingerprint>> {
        let dir = self.entry_dir(&video);
        let (data_path, meta_path) = (
            dir.join(super::FINGERPRINT_FILE_NAME),
            dir.join(super::FINGERPRINT_META_FILE_NAME),
        );
        if !data_path.exists() || !meta_path.exists() {
            return Ok(None);
        }

        let meta: CacheMeta = serde_json::from_reader(std::fs::File::open(&meta_path)?)?;
        if let Err(e) = self.check_meta(&meta) {
            tracing::debug!(video = %video.as_ref().display(), "ignoring cached fingerprint: {}", e);
            return Ok(None);
        }

        let fingerprint = Fingerprint::from_hex(&std::fs::read_to_string(&data_path)?)?;
        if fingerprint.is_empty() || fingerprint.len() != meta.len || fingerprint.len() > budget {
            tracing::debug!(
                video = %video.as_ref().display(),
                len = fingerprint.len(),
                expected = meta.len,
                budget,
                "ignoring cached fingerprint with unexpected length"
            );
            return Ok(None);
        }

        Ok(Some(fingerprint))
    }

    /// Writes `fingerprint` to the cache entry for `video`, replacing any existing entry.
    pub fn save(&self, video: impl AsRef<Path>, fingerprint: &Fingerprint) -> Result<()> {
        let dir = self.entry_dir(&video);
        std::fs::create_dir_all(&dir)?;

        std::fs::write(dir.join(super::FINGERPRINT_FILE_NAME), fingerprint.to_hex())?;
        let meta = CacheMeta {
            revision_id: crate::REVISION_ID,
            hash_fps: self.hash_fps,
            algorithm: self.algorithm,
            len: fingerprint.len(),
        };
        let mut f = std::fs::File::create(dir.join(super::FINGERPRINT_META_FILE_NAME))?;
        serde_json::to_writer(&mut f, &meta)?;

        Ok(())
    }

    fn check_meta(&self, meta: &CacheMeta) -> Result<()> {
        if meta.revision_id != crate::REVISION_ID {
            return Err(Error::RevisionMismatch {
                found: meta.revision_id,
                expected: crate::REVISION_ID,
            });
        }
        if meta.hash_fps != self.hash_fps {
            return Err(Error::HashRateMismatch {
                stored: meta.hash_fps,
                current: self.hash_fps,
            });
        }
        if meta.algorithm != self.algorithm {
            return Err(Error::AlgorithmMismatch {
                stored: meta.algorithm,
                current: self.algorithm,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const VIDEO: &str = "/media/Show (2009)/Season 01/Show S01E01.mkv";

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FingerprintCache::new(dir.path(), 2, HashAlgorithm::Gradient);
        let fingerprint = Fingerprint::from(vec![1, 2, 3, 0xdead_beef]);

        cache.save(VIDEO, &fingerprint).unwrap();
        assert_eq!(
            cache.entry_dir(VIDEO),
            dir.path().join("mediaShow2009Season01ShowS01E01mkv_af6d3e44")
        );
        assert_eq!(cache.load(VIDEO, 10).unwrap(), Some(fingerprint));
    }

    #[test]
    fn test_similar_names_do_not_share_an_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FingerprintCache::new(dir.path(), 2, HashAlgorithm::Gradient);
        cache.save("/tv/show/Ep 1.mkv", &Fingerprint::from(vec![1, 2, 3])).unwrap();
        cache.save("/tv/show/Ep1.mkv", &Fingerprint::from(vec![4, 5])).unwrap();

        assert_ne!(cache.entry_dir("/tv/show/Ep 1.mkv"), cache.entry_dir("/tv/show/Ep1.mkv"));
        assert_eq!(cache.load("/tv/show/Ep 1.mkv", 10).unwrap().map(|f| f.len()), Some(3));
        assert_eq!(cache.load("/tv/show/Ep1.mkv", 10).unwrap().map(|f| f.len()), Some(2));
    }

    #[test]
    fn test_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FingerprintCache::new(dir.path(), 2, HashAlgorithm::Gradient);
        assert_eq!(cache.load(VIDEO, 10).unwrap(), None);
    }

    #[test]
    fn test_format_mismatch_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let fingerprint = Fingerprint::from(vec![1, 2, 3]);
        FingerprintCache::new(dir.path(), 2, HashAlgorithm::Gradient)
            .save(VIDEO, &fingerprint)
            .unwrap();

        let other_rate = FingerprintCache::new(dir.path(), 3, HashAlgorithm::Gradient);
        assert_eq!(other_rate.load(VIDEO, 10).unwrap(), None);
        let other_algorithm = FingerprintCache::new(dir.path(), 2, HashAlgorithm::Block);
        assert_eq!(other_algorithm.load(VIDEO, 10).unwrap(), None);
    }

    #[test]
    fn test_length_validation() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FingerprintCache::new(dir.path(), 2, HashAlgorithm::Gradient);
        cache
            .save(VIDEO, &Fingerprint::from(vec![1, 2, 3, 4]))
            .unwrap();

        // Longer than the current budget.
        assert_eq!(cache.load(VIDEO, 3).unwrap(), None);

        // Truncated data file.
        let data = cache.entry_dir(VIDEO).join(crate::video::FINGERPRINT_FILE_NAME);
        std::fs::write(&data, "0000000000000001").unwrap();
        assert_eq!(cache.load(VIDEO, 10).unwrap(), None);
    }
}
