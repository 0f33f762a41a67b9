use crate::video::{Alignment, Fingerprint, PairAligner, Side};
use crate::{Config, Profile, ProfileStatus};

/// Outcome of a successful consensus pass over a season.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Consensus {
    /// Index of the reference profile in the batch.
    pub reference: usize,
    /// Trimmed mean of the intro durations, in frames.
    pub average_frames: u64,
    /// Number of durations the average was computed from.
    pub sample_size: usize,
}

// Trimmed statistics over a pool of intro durations (frames).
#[derive(Copy, Clone, Debug)]
struct PoolStats {
    low: f64,
    high: f64,
    average: f64,
    sample_size: usize,
    mean_fps: f64,
}

impl PoolStats {
    /// Returns `None` if the pool or the retained range is empty.
    fn compute(pool: &[(u64, f64)], trim_fraction: f32) -> Option<Self> {
        if pool.is_empty() {
            return None;
        }

        let mut sorted: Vec<f64> = pool.iter().map(|(d, _)| *d as f64).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let half = f64::from(trim_fraction) / 2.0;
        let low = quantile(&sorted, half);
        let high = quantile(&sorted, 1.0 - half);

        let retained: Vec<f64> = sorted
            .iter()
            .copied()
            .filter(|d| *d >= low && *d <= high)
            .collect();
        if retained.is_empty() {
            return None;
        }

        Some(Self {
            low,
            high,
            average: retained.iter().sum::<f64>() / retained.len() as f64,
            sample_size: retained.len(),
            mean_fps: pool.iter().map(|(_, fps)| fps).sum::<f64>() / pool.len() as f64,
        })
    }

    fn retains(&self, duration: u64) -> bool {
        let d = duration as f64;
        d >= self.low && d <= self.high
    }

    fn within(&self, duration: u64, tolerance: f64) -> bool {
        (duration as f64 - self.average).abs() < tolerance
    }
}

// Linear interpolation between the closest ranks. `sorted` must not be empty.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Start frame for an intro ending at `end` that assumes the intro has the reference length.
/// Returns `None` if the guessed intro still deviates from the average by `tolerance` or more.
fn fallback_start(end: u64, reference_frames: u64, average: f64, tolerance: f64) -> Option<u64> {
    let start = end.saturating_sub(reference_frames);
    if ((end - start) as f64 - average).abs() < tolerance {
        Some(start)
    } else {
        None
    }
}

/// Aligns the episodes of a season and reconciles the detected intros into a consensus.
///
/// Pairwise alignment is noisy: a pair of episodes may share a recap or a preview instead of
/// the intro, or not match at all. The corrector computes a robust average of the detected
/// intro lengths, picks the median conforming episode as the season reference and re-aligns
/// every outlier against it. Outliers that still do not fit are rejected.
#[derive(Debug)]
pub struct ProfileCorrector {
    aligner: PairAligner,
    config: Config,
}

impl ProfileCorrector {
    pub fn new(config: &Config) -> Self {
        Self {
            aligner: PairAligner::from_config(config),
            config: config.clone(),
        }
    }

    pub fn aligner(&self) -> &PairAligner {
        &self.aligner
    }

    /// Aligns `profiles[first]` with `profiles[second]` and updates the bounds of the
    /// profiles selected by `side`. Alignment errors are logged and treated as no match.
    pub fn align_pair(
        &self,
        profiles: &mut [Profile],
        fingerprints: &[Fingerprint],
        first: usize,
        second: usize,
        side: Side,
    ) {
        let alignment = match self.aligner.align(
            &fingerprints[first],
            profiles[first].fps,
            &fingerprints[second],
            profiles[second].fps,
        ) {
            Ok(alignment) => alignment,
            Err(e) => {
                tracing::warn!(
                    first = %profiles[first].path().display(),
                    second = %profiles[second].path().display(),
                    "could not compare fingerprints: {}",
                    e
                );
                Alignment::NONE
            }
        };

        if side.first() {
            profiles[first].set_bounds(alignment.first);
            profiles[first].status = ProfileStatus::Aligned;
        }
        if side.second() {
            profiles[second].set_bounds(alignment.second);
            profiles[second].status = ProfileStatus::Aligned;
        }

        tracing::debug!(
            first = %profiles[first].path().display(),
            second = %profiles[second].path().display(),
            ?alignment,
            "aligned pair"
        );
    }

    /// Runs the initial alignment over a batch.
    ///
    /// With `has_reference` set, `profiles[0]` is a known-good reference and every other
    /// episode is aligned against it. Otherwise episodes are aligned in consecutive pairs, and
    /// an odd trailing episode is aligned against its predecessor.
    pub fn align_all(&self, profiles: &mut [Profile], fingerprints: &[Fingerprint], has_reference: bool) {
        let span = tracing::span!(tracing::Level::TRACE, "align_all", count = profiles.len(), has_reference);
        let _enter = span.enter();

        let n = profiles.len();
        if has_reference {
            for i in 1..n {
                self.align_pair(profiles, fingerprints, 0, i, Side::Second);
            }
            return;
        }

        for i in (0..n).step_by(2) {
            if i + 1 < n {
                self.align_pair(profiles, fingerprints, i, i + 1, Side::Both);
            } else if i > 0 {
                self.align_pair(profiles, fingerprints, i - 1, i, Side::Second);
            }
        }
    }

    fn pool(&self, profiles: &[Profile], eligible: impl Fn(ProfileStatus) -> bool) -> Vec<(u64, f64)> {
        let max = self.config.max_intro_length();
        profiles
            .iter()
            .filter(|p| eligible(p.status))
            .map(|p| (p.intro_frames(), p.fps, p.frames_in(max)))
            .filter(|(d, _, max)| *d > 0 && d <= max)
            .map(|(d, fps, _)| (d, fps))
            .collect()
    }

    fn tolerance(&self, profile: &Profile) -> f64 {
        f64::from(self.config.conforming_tolerance()) * profile.fps
    }

    fn reject_all(&self, profiles: &mut [Profile]) {
        for p in profiles.iter_mut() {
            p.reject();
        }
    }

    /// Reconciles the aligned profiles of a season.
    ///
    /// Returns the [Consensus] if at least one profile conforms to the season average, or
    /// `None` if the whole batch was rejected. In both cases every profile ends up
    /// `Conforming`, `Repaired` or `Rejected` (with `(0, 0)` bounds).
    pub fn correct(&self, profiles: &mut [Profile], fingerprints: &[Fingerprint]) -> Option<Consensus> {
        let span = tracing::span!(tracing::Level::TRACE, "correct", count = profiles.len());
        let _enter = span.enter();

        let trim = self.config.trim_fraction();
        let min_secs = self.config.min_intro_length().as_secs_f64();

        let pool = self.pool(profiles, |s| s == ProfileStatus::Aligned);
        let stats = match PoolStats::compute(&pool, trim) {
            Some(stats) if stats.average >= min_secs * stats.mean_fps => stats,
            Some(stats) => {
                tracing::info!(average_frames = stats.average as u64, "average intro too short, rejecting season");
                self.reject_all(profiles);
                return None;
            }
            None => {
                tracing::info!("no intro durations to average, rejecting season");
                self.reject_all(profiles);
                return None;
            }
        };
        tracing::debug!(
            average_frames = stats.average as u64,
            sample_size = stats.sample_size,
            pool = pool.len(),
            "computed season average"
        );

        let mut conforming = Vec::new();
        let mut non_conforming = Vec::new();
        for (i, p) in profiles.iter_mut().enumerate() {
            let d = p.intro_frames();
            if d > 0 && (stats.retains(d) || stats.within(d, self.tolerance(p))) {
                p.status = ProfileStatus::Conforming;
                conforming.push(i);
            } else {
                p.status = ProfileStatus::NonConforming;
                non_conforming.push(i);
            }
        }

        if conforming.is_empty() {
            tracing::info!("no conforming intros, rejecting season");
            self.reject_all(profiles);
            return None;
        }

        // The reference must survive the minimum length gate below.
        let min_intro = self.config.min_intro_length();
        let mut candidates: Vec<usize> = conforming
            .iter()
            .copied()
            .filter(|i| profiles[*i].intro_frames() >= profiles[*i].frames_in(min_intro))
            .collect();
        if candidates.is_empty() {
            tracing::info!(conforming = conforming.len(), "no conforming intro reaches the minimum length, rejecting season");
            self.reject_all(profiles);
            return None;
        }
        candidates.sort_by_key(|i| profiles[*i].intro_frames());
        let reference = candidates[candidates.len() / 2];
        let reference_frames = profiles[reference].intro_frames();
        tracing::debug!(
            reference = %profiles[reference].path().display(),
            reference_frames,
            conforming = conforming.len(),
            non_conforming = non_conforming.len(),
            "selected season reference"
        );

        for &i in &non_conforming {
            self.align_pair(profiles, fingerprints, reference, i, Side::Second);
            profiles[i].status = ProfileStatus::NonConforming;
        }

        if !non_conforming.is_empty() {
            let pool = self.pool(profiles, |s| {
                matches!(s, ProfileStatus::Conforming | ProfileStatus::NonConforming)
            });
            let rebuilt = PoolStats::compute(&pool, trim).unwrap_or(stats);

            for &i in &non_conforming {
                let tolerance = self.tolerance(&profiles[i]);
                let p = &mut profiles[i];
                let d = p.intro_frames();
                if d > 0 && (rebuilt.retains(d) || rebuilt.within(d, tolerance)) {
                    p.status = ProfileStatus::Repaired;
                    tracing::info!(path = %p.path().display(), start = p.start_frame, end = p.end_frame, "repaired intro");
                } else if let Some(start) = fallback_start(p.end_frame, reference_frames, rebuilt.average, tolerance) {
                    p.start_frame = start;
                    p.status = ProfileStatus::Repaired;
                    tracing::info!(path = %p.path().display(), start, end = p.end_frame, "repaired intro from its end");
                } else {
                    tracing::info!(path = %p.path().display(), start = p.start_frame, end = p.end_frame, "rejected intro");
                    p.reject();
                }
            }
        }

        for p in profiles.iter_mut() {
            if p.status != ProfileStatus::Rejected && p.intro_frames() < p.frames_in(min_intro) {
                tracing::debug!(path = %p.path().display(), frames = p.intro_frames(), "intro below minimum length");
                p.reject();
            }
        }

        Some(Consensus {
            reference,
            average_frames: stats.average.round() as u64,
            sample_size: stats.sample_size,
        })
    }
}
