use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::video::{Fingerprint, FingerprintExtractor, FrameSource};
use crate::{util, Config, Profile, ProfileCorrector, ProfileStatus, SeasonReference, SeasonStore};

/// Cooperative cancellation flag, checked between seasons.
#[derive(Clone, Debug, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Detects the intro of every episode in a season.
///
/// A run goes through the following steps:
///
/// 1. Fingerprint every episode (in parallel)
/// 2. Align the episodes in pairs, or against the stored season reference if there is a valid one
/// 3. Reconcile the detected intros with [ProfileCorrector]
/// 4. Store the new season reference
///
/// Episodes that cannot be fingerprinted are reported without an intro.
#[derive(Debug)]
pub struct IntroDetector<S: FrameSource> {
    config: Config,
    extractor: FingerprintExtractor<S>,
    corrector: ProfileCorrector,
    store: SeasonStore,
    stop: StopToken,
}

impl<S: FrameSource> IntroDetector<S> {
    pub fn new(source: S, config: Config) -> Self {
        Self {
            extractor: FingerprintExtractor::new(source, &config),
            corrector: ProfileCorrector::new(&config),
            store: SeasonStore::new(config.season_dir()),
            stop: StopToken::new(),
            config,
        }
    }

    /// Returns a new [IntroDetector] that stops between seasons once `stop` is set.
    pub fn with_stop_token(mut self, stop: StopToken) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &SeasonStore {
        &self.store
    }

    /// Detects intros for one season.
    ///
    /// If `reference` is valid for the current hash rate, every episode is aligned against it
    /// and a single episode is enough. Otherwise at least two episodes must be fingerprinted,
    /// or an empty list is returned.
    pub fn run(&self, mut profiles: Vec<Profile>, reference: Option<&SeasonReference>) -> Vec<Profile> {
        let span = tracing::span!(tracing::Level::TRACE, "run", count = profiles.len());
        let _enter = span.enter();

        if profiles.is_empty() {
            return profiles;
        }
        let paths: Vec<_> = profiles.iter().map(|p| p.path().to_path_buf()).collect();
        let key = util::season_key(&paths);

        let reference = reference.and_then(|r| match r.validate(self.config.hash_fps()) {
            Ok(fingerprint) => Some((r, fingerprint)),
            Err(e) => {
                tracing::info!(key = %key, "ignoring season reference: {}", e);
                None
            }
        });

        let mut fingerprints = self.extractor.extract_all(&profiles);
        let usable: Vec<usize> = (0..profiles.len())
            .filter(|i| !fingerprints[*i].is_empty())
            .collect();

        let needed = if reference.is_some() { 1 } else { 2 };
        if usable.len() < needed {
            tracing::warn!(key = %key, usable = usable.len(), needed, "not enough fingerprints to detect intros");
            return Vec::new();
        }

        // The reference, if any, goes first.
        let has_reference = reference.is_some();
        let offset = usize::from(has_reference);
        let mut batch: Vec<Profile> = Vec::with_capacity(usable.len() + offset);
        let mut batch_fingerprints: Vec<Fingerprint> = Vec::with_capacity(usable.len() + offset);
        if let Some((r, fingerprint)) = reference {
            batch.push(r.pseudo_profile());
            batch_fingerprints.push(fingerprint);
        }
        for &i in &usable {
            batch.push(profiles[i].clone());
            batch_fingerprints.push(std::mem::take(&mut fingerprints[i]));
        }

        self.corrector.align_all(&mut batch, &batch_fingerprints, has_reference);
        let consensus = self.corrector.correct(&mut batch, &batch_fingerprints);

        match consensus {
            Some(c)
                if !batch[c.reference].has_intro()
                    || batch[c.reference].status == ProfileStatus::Rejected =>
            {
                tracing::warn!(key = %key, "season reference has no intro, not saving it");
            }
            Some(c) if !has_reference && self.config.persist() => {
                let reference = SeasonReference::new(
                    &batch[c.reference],
                    &batch_fingerprints[c.reference],
                    &c,
                    self.config.hash_fps(),
                );
                if let Err(e) = self.store.save(&key, &reference) {
                    tracing::warn!(key = %key, "failed to save season reference: {}", e);
                }
            }
            Some(_) => (),
            None => tracing::info!(key = %key, "no intro found for season"),
        }

        for p in profiles.iter_mut() {
            p.reject();
        }
        for (b, &i) in usable.iter().enumerate() {
            profiles[i] = batch[b + offset].clone();
        }
        for p in profiles.iter_mut() {
            p.apply_preroll(self.config.preroll());
            p.finalize();
            tracing::info!(
                path = %p.path().display(),
                start = %p.start_time,
                end = %p.end_time,
                status = ?p.status,
                "detected intro"
            );
        }

        profiles
    }

    /// Detects intros for one season, reusing the stored season reference unless `force` is
    /// set.
    pub fn run_season(&self, profiles: Vec<Profile>) -> Vec<Profile> {
        let reference = if self.config.force() {
            None
        } else {
            let paths: Vec<_> = profiles.iter().map(|p| p.path().to_path_buf()).collect();
            self.store
                .load_and_validate(&util::season_key(&paths), self.config.hash_fps())
                .map(|(r, _)| r)
        };
        self.run(profiles, reference.as_ref())
    }

    /// Processes seasons one after the other until done or stopped. A stop request never
    /// interrupts a season in progress.
    pub fn run_seasons(&self, seasons: impl IntoIterator<Item = Vec<Profile>>) -> Vec<Vec<Profile>> {
        let mut results = Vec::new();
        for season in seasons {
            if self.stop.is_stopped() {
                tracing::info!("stop requested, skipping remaining seasons");
                break;
            }
            results.push(self.run_season(season));
        }
        results
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::video::GrayFrame;
    use crate::{Error, Result};

    const WIDTH: u32 = 32;
    const HEIGHT: u32 = 18;
    const FPS: f64 = 24.0;
    // 30 s at 2 hashes/s.
    const INTRO_LEN: u64 = 60;

    // Random noise frame for a content id; equal ids give equal frames.
    fn frame(content: u64) -> Vec<u8> {
        let mut x = content.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
        (0..WIDTH * HEIGHT)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 7;
                x ^= x << 17;
                (x >> 56) as u8
            })
            .collect()
    }

    // Serves one frame per listed content id.
    #[derive(Default)]
    struct ShowSource {
        episodes: HashMap<PathBuf, Vec<u64>>,
    }

    impl ShowSource {
        // `prefix` unique frames, the shared intro, then more unique frames.
        fn with_episode(mut self, path: &str, n: u64, prefix: u64) -> Self {
            let unique = |k: u64| (n << 32) | k;
            let mut content: Vec<u64> = (0..prefix).map(unique).collect();
            content.extend((0..INTRO_LEN).map(|k| (1 << 48) | k));
            content.extend((prefix..prefix + 80).map(unique));
            self.episodes.insert(PathBuf::from(path), content);
            self
        }
    }

    impl FrameSource for ShowSource {
        fn decode(
            &self,
            path: &Path,
            _hash_fps: u32,
            budget: usize,
            on_frame: &mut dyn FnMut(GrayFrame<'_>),
        ) -> Result<usize> {
            let content = self.episodes.get(path).ok_or_else(|| Error::FrameSource {
                path: path.to_owned(),
                reason: "not found".to_owned(),
            })?;
            let n = content.len().min(budget);
            for c in &content[..n] {
                let data = frame(*c);
                on_frame(GrayFrame::packed(WIDTH, HEIGHT, &data));
            }
            Ok(n)
        }
    }

    fn source() -> ShowSource {
        ShowSource::default()
            .with_episode("/tv/show/s1/e1.mkv", 1, 10)
            .with_episode("/tv/show/s1/e2.mkv", 2, 20)
            .with_episode("/tv/show/s1/e3.mkv", 3, 30)
            .with_episode("/tv/show/s1/e4.mkv", 4, 40)
            .with_episode("/tv/show/s1/e5.mkv", 5, 16)
    }

    fn profile(path: &str) -> Profile {
        // 20 minutes.
        Profile::new(path, FPS, 24 * 1200).unwrap()
    }

    fn profiles(paths: &[&str]) -> Vec<Profile> {
        paths.iter().map(|p| profile(p)).collect()
    }

    fn config(dir: &Path) -> Config {
        Config::default().with_data_dir(dir).with_workers(2)
    }

    // Native bounds of an intro that starts after `prefix` hashes.
    fn bounds(prefix: u64) -> (u64, u64) {
        (prefix * 12, (prefix + INTRO_LEN - 1) * 12)
    }

    #[test]
    fn test_season_detection() {
        let dir = tempfile::tempdir().unwrap();
        let detector = IntroDetector::new(source(), config(dir.path()));
        let input = profiles(&[
            "/tv/show/s1/e1.mkv",
            "/tv/show/s1/e2.mkv",
            "/tv/show/s1/e3.mkv",
            "/tv/show/s1/e9.mkv",
            "/tv/show/s1/e4.mkv",
        ]);

        let output = detector.run_season(input);
        assert_eq!(output.len(), 5);

        for (i, prefix) in [(0, 10), (1, 20), (2, 30), (4, 40)] {
            let p = &output[i];
            assert_eq!((p.start_frame, p.end_frame), bounds(prefix), "{}", p.path().display());
            assert_eq!(p.status, ProfileStatus::Conforming);
        }
        assert_eq!(output[0].start_time, "0:00:05");
        assert_eq!(output[0].end_time, "0:00:35");
        assert_eq!(output[0].end_time_ms, 35_000);

        // Unreadable episode.
        assert_eq!(output[3].status, ProfileStatus::Rejected);
        assert!(!output[3].has_intro());

        let key = util::season_key(&["/tv/show/s1/e1.mkv"]);
        let (reference, fingerprint) = detector.store().load_and_validate(&key, 2).unwrap();
        assert_eq!(reference.profile.path(), Path::new("/tv/show/s1/e3.mkv"));
        assert_eq!(fingerprint.len(), INTRO_LEN as usize);
    }

    #[test]
    fn test_single_episode_with_stored_reference() {
        let dir = tempfile::tempdir().unwrap();
        let detector = IntroDetector::new(source(), config(dir.path()));
        detector.run_season(profiles(&[
            "/tv/show/s1/e1.mkv",
            "/tv/show/s1/e2.mkv",
            "/tv/show/s1/e3.mkv",
        ]));

        let output = detector.run_season(profiles(&["/tv/show/s1/e5.mkv"]));
        assert_eq!(output.len(), 1);
        assert_eq!((output[0].start_frame, output[0].end_frame), bounds(16));

        // A run that used the stored reference does not replace it.
        let key = util::season_key(&["/tv/show/s1/e5.mkv"]);
        let stored = detector.store().load(&key).unwrap().unwrap();
        assert_eq!(stored.profile.path(), Path::new("/tv/show/s1/e2.mkv"));
    }

    #[test]
    fn test_stored_reference_without_intro_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let detector = IntroDetector::new(source(), config(dir.path()));

        let mut empty = profile("/tv/show/s1/e1.mkv");
        empty.reject();
        let consensus = crate::Consensus {
            reference: 0,
            average_frames: 0,
            sample_size: 2,
        };
        let key = util::season_key(&["/tv/show/s1/e1.mkv"]);
        let stored = SeasonReference::new(&empty, &Fingerprint::from(vec![7u64; 4]), &consensus, 2);
        detector.store().save(&key, &stored).unwrap();

        let output = detector.run_season(profiles(&[
            "/tv/show/s1/e1.mkv",
            "/tv/show/s1/e2.mkv",
            "/tv/show/s1/e3.mkv",
        ]));
        assert_eq!((output[0].start_frame, output[0].end_frame), bounds(10));

        let (replaced, fingerprint) = detector.store().load_and_validate(&key, 2).unwrap();
        assert_eq!(replaced.profile.path(), Path::new("/tv/show/s1/e2.mkv"));
        assert_eq!(replaced.reference_duration, (INTRO_LEN - 1) * 12);
        assert_eq!(fingerprint.len(), INTRO_LEN as usize);
    }

    #[test]
    fn test_reference_with_other_hash_rate_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        IntroDetector::new(source(), config(dir.path())).run_season(profiles(&[
            "/tv/show/s1/e1.mkv",
            "/tv/show/s1/e2.mkv",
        ]));

        let detector = IntroDetector::new(source(), config(dir.path()).with_hash_fps(3));
        assert!(detector.run_season(profiles(&["/tv/show/s1/e5.mkv"])).is_empty());
    }

    #[test]
    fn test_invalid_frame_rate_does_not_abort_season() {
        let dir = tempfile::tempdir().unwrap();
        let detector = IntroDetector::new(source(), config(dir.path()));
        let mut input = profiles(&["/tv/show/s1/e1.mkv", "/tv/show/s1/e2.mkv", "/tv/show/s1/e3.mkv"]);
        input[2].fps = 0.0;

        let output = detector.run(input, None);
        assert_eq!(output.len(), 3);
        assert_eq!((output[0].start_frame, output[0].end_frame), bounds(10));
        assert_eq!((output[1].start_frame, output[1].end_frame), bounds(20));
        assert_eq!(output[2].status, ProfileStatus::Rejected);
        assert!(!output[2].has_intro());
    }

    #[test]
    fn test_not_enough_fingerprints() {
        let dir = tempfile::tempdir().unwrap();
        let detector = IntroDetector::new(source(), config(dir.path()));
        assert!(detector.run(profiles(&["/tv/show/s1/e1.mkv"]), None).is_empty());
        assert!(detector
            .run(profiles(&["/tv/show/s1/e1.mkv", "/tv/show/s1/e9.mkv"]), None)
            .is_empty());
        assert!(detector.run(Vec::new(), None).is_empty());
    }

    #[test]
    fn test_preroll() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path()).with_preroll(std::time::Duration::from_secs(2));
        let detector = IntroDetector::new(source(), config);
        let output = detector.run(profiles(&["/tv/show/s1/e1.mkv", "/tv/show/s1/e2.mkv"]), None);
        let (start, end) = bounds(10);
        assert_eq!((output[0].start_frame, output[0].end_frame), (start, end - 48));
    }

    #[test]
    fn test_stop_between_seasons() {
        let dir = tempfile::tempdir().unwrap();
        let stop = StopToken::new();
        let detector = IntroDetector::new(source(), config(dir.path())).with_stop_token(stop.clone());
        let season = || profiles(&["/tv/show/s1/e1.mkv", "/tv/show/s1/e2.mkv"]);

        assert_eq!(detector.run_seasons(vec![season(), season()]).len(), 2);

        stop.stop();
        assert!(detector.stop_token().is_stopped());
        assert!(detector.run_seasons(vec![season(), season()]).is_empty());
    }
}
