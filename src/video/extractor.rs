#[cfg(feature = "rayon")]
extern crate rayon;

use std::path::Path;
use std::time::Instant;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use super::{hash_frame, Fingerprint, FingerprintCache, FrameSource};
use crate::{Config, Profile, Result};

/// Converts videos into [Fingerprint]s.
///
/// At a high-level, the extractor does the following for a given video:
///
/// 1. Computes the frame budget: a quarter of the video, capped at the configured number of
///    minutes, at `hash_fps` frames per second
/// 2. Returns the cached fingerprint for the video if it is still valid
/// 3. Otherwise, asks the [FrameSource] for the sampled frames and hashes each one
/// 4. Writes the new fingerprint to the cache (if persistence is enabled)
///
/// Failures never propagate: a video that cannot be fingerprinted yields an empty
/// fingerprint, which callers treat as "no usable signal".
#[derive(Debug)]
pub struct FingerprintExtractor<S: FrameSource> {
    source: S,
    cache: FingerprintCache,
    config: Config,
}

impl<S: FrameSource> FingerprintExtractor<S> {
    pub fn new(source: S, config: &Config) -> Self {
        let cache = FingerprintCache::new(
            config.fingerprint_dir(),
            config.hash_fps(),
            config.hash_algorithm(),
        );
        Self {
            source,
            cache,
            config: config.clone(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cache(&self) -> &FingerprintCache {
        &self.cache
    }

    // Decodes and hashes up to `budget` frames.
    fn compute(&self, path: &Path, budget: usize) -> Result<Fingerprint> {
        let span = tracing::span!(tracing::Level::TRACE, "compute", budget);
        let _enter = span.enter();

        let algorithm = self.config.hash_algorithm();
        let mut hashes = Vec::with_capacity(budget);
        let delivered = self.source.decode(
            path,
            self.config.hash_fps(),
            budget,
            &mut |frame| {
                if hashes.len() < budget {
                    hashes.push(hash_frame(&frame, algorithm));
                }
            },
        )?;
        tracing::trace!(delivered, hashed = hashes.len());

        Ok(Fingerprint::new(hashes))
    }

    /// Returns the fingerprint for the given episode, loading it from the cache if possible.
    pub fn extract(&self, profile: &Profile) -> Fingerprint {
        let path = profile.path();
        if !profile.fps.is_finite() || profile.fps <= 0.0 {
            tracing::warn!(path = %path.display(), fps = profile.fps, "invalid frame rate, skipping video");
            return Fingerprint::default();
        }
        let budget = self.config.frame_budget(profile.duration());
        if budget == 0 {
            tracing::warn!(path = %path.display(), "video too short to fingerprint");
            return Fingerprint::default();
        }

        if !self.config.force() {
            match self.cache.load(path, budget) {
                Ok(Some(fingerprint)) => {
                    tracing::debug!(path = %path.display(), len = fingerprint.len(), "loaded existing fingerprint");
                    return fingerprint;
                }
                Ok(None) => (),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "failed to load cached fingerprint: {}", e)
                }
            }
        }

        tracing::debug!(path = %path.display(), budget, "creating new fingerprint");
        let start = Instant::now();
        let fingerprint = match self.compute(path, budget) {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to create fingerprint: {}", e);
                return Fingerprint::default();
            }
        };
        if fingerprint.is_empty() {
            tracing::warn!(path = %path.display(), "no frames decoded");
            return fingerprint;
        }

        tracing::info!(
            path = %path.display(),
            len = fingerprint.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "processed fingerprint"
        );

        if self.config.persist() {
            if let Err(e) = self.cache.save(path, &fingerprint) {
                tracing::warn!(path = %path.display(), "failed to write fingerprint: {}", e);
            }
        }

        fingerprint
    }

    /// Fingerprints all episodes, using up to `workers` threads, and returns the results in
    /// input order. Returns only once every episode has been processed.
    pub fn extract_all(&self, profiles: &[Profile]) -> Vec<Fingerprint> {
        let span = tracing::span!(tracing::Level::TRACE, "extract_all", count = profiles.len());
        let _enter = span.enter();

        if cfg!(feature = "rayon") && self.config.workers() > 1 {
            #[cfg(feature = "rayon")]
            {
                match rayon::ThreadPoolBuilder::new()
                    .num_threads(self.config.workers())
                    .build()
                {
                    Ok(pool) => {
                        return pool
                            .install(|| profiles.par_iter().map(|p| self.extract(p)).collect())
                    }
                    Err(e) => tracing::warn!("falling back to sequential fingerprinting: {}", e),
                }
            }
        }

        profiles.iter().map(|p| self.extract(p)).collect()
    }
}
