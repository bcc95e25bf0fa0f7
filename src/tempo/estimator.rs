use std::collections::VecDeque;

use rayon::prelude::*;

use crate::analyzers::BeatTracker;
use crate::config::TempoConfig;
use crate::tempo::autocorr;
use crate::tempo::cluster::{cluster_candidates, BpmCandidate, TempoEstimate, TempoSource};

/// Whole-buffer segment weight
pub const WHOLE_WEIGHT: f32 = 1.0;
/// Weight of each windowed slice
pub const SLICE_WEIGHT: f32 = 0.7;
/// Candidate weight multiplier for the external tracker
pub const TRACKER_WEIGHT: f32 = 1.0;
/// Candidate weight multiplier for the native estimator
pub const NATIVE_WEIGHT: f32 = 0.6;
/// Buffers at least this long also get windowed slices (seconds)
pub const SLICE_MIN_DURATION: f64 = 30.0;
/// Shortest live buffer worth recalculating (seconds)
pub const MIN_RECALC_SECONDS: f64 = 4.0;

/// Sample range of a buffer analysed on its own
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisSegment {
    pub start: usize,
    pub end: usize,
    pub weight: f32,
}

impl AnalysisSegment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// The whole buffer, plus up to three slices of clamp(duration / 4, 10, 24)
/// seconds centered at 25%, 50% and 75% for buffers of 30 s or more.
pub fn analysis_segments(len: usize, sample_rate: u32) -> Vec<AnalysisSegment> {
    if len == 0 || sample_rate == 0 {
        return Vec::new();
    }
    let mut segments = vec![AnalysisSegment { start: 0, end: len, weight: WHOLE_WEIGHT }];

    let duration = len as f64 / sample_rate as f64;
    if duration < SLICE_MIN_DURATION {
        return segments;
    }

    let slice = ((duration / 4.0).clamp(10.0, 24.0) * sample_rate as f64) as usize;
    for center in [0.25, 0.5, 0.75] {
        let mid = (len as f64 * center) as usize;
        let start = mid.saturating_sub(slice / 2).min(len - slice.min(len));
        let end = (start + slice).min(len);
        if segments.iter().any(|s| s.start == start && s.end == end) {
            continue;
        }
        segments.push(AnalysisSegment { start, end, weight: SLICE_WEIGHT });
    }
    segments
}

/// Collect weighted candidates from every segment and algorithm
pub fn collect_candidates(
    samples: &[f32],
    sample_rate: u32,
    tracker: Option<&dyn BeatTracker>,
) -> Vec<BpmCandidate> {
    let segments = analysis_segments(samples.len(), sample_rate);

    let mut candidates: Vec<BpmCandidate> = segments
        .par_iter()
        .filter_map(|segment| {
            let peak = autocorr::estimate_bpm(&samples[segment.start..segment.end], sample_rate)?;
            Some(BpmCandidate::new(peak.bpm, TempoSource::Native, segment.weight * NATIVE_WEIGHT))
        })
        .collect();

    if let Some(tracker) = tracker {
        for segment in &segments {
            match tracker.estimate_bpm(&samples[segment.start..segment.end], sample_rate) {
                Ok(bpm) if bpm.is_finite() && bpm > 0.0 => candidates.push(BpmCandidate::new(
                    bpm,
                    TempoSource::Tracker,
                    segment.weight * TRACKER_WEIGHT,
                )),
                Ok(bpm) => {
                    tracing::debug!("{} returned no usable tempo ({})", tracker.name(), bpm);
                }
                Err(e) => {
                    tracing::warn!("{} failed on segment {}..{}: {}", tracker.name(), segment.start, segment.end, e);
                }
            }
        }
    }

    tracing::debug!(
        "Collected {} tempo candidates from {} segments",
        candidates.len(), segments.len()
    );
    candidates
}

/// Rolling mono buffer kept for on-demand recalculation of live sources
#[derive(Debug, Clone)]
pub struct LiveBuffer {
    samples: VecDeque<f32>,
    capacity: usize,
    sample_rate: u32,
}

impl LiveBuffer {
    pub fn new(seconds: f64, sample_rate: u32) -> Self {
        let capacity = Self::capacity_for(seconds, sample_rate);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            sample_rate,
        }
    }

    fn capacity_for(seconds: f64, sample_rate: u32) -> usize {
        (seconds.max(0.0) * sample_rate as f64) as usize
    }

    pub fn push(&mut self, samples: &[f32]) {
        if self.capacity == 0 {
            return;
        }
        if samples.len() >= self.capacity {
            self.samples.clear();
            self.samples.extend(&samples[samples.len() - self.capacity..]);
            return;
        }
        let overflow = (self.samples.len() + samples.len()).saturating_sub(self.capacity);
        self.samples.drain(..overflow);
        self.samples.extend(samples);
    }

    /// Change length or rate; a new rate discards buffered audio
    pub fn configure(&mut self, seconds: f64, sample_rate: u32) {
        if sample_rate != self.sample_rate {
            self.samples.clear();
            self.sample_rate = sample_rate;
        }
        self.capacity = Self::capacity_for(seconds, sample_rate);
        let excess = self.samples.len().saturating_sub(self.capacity);
        self.samples.drain(..excess);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.samples.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Authoritative tempo: offline estimates, the live analyzer feed and the
/// rolling buffer used to recalculate live sources
#[derive(Debug, Clone)]
pub struct TempoEstimator {
    offline: Option<TempoEstimate>,
    live: Option<(f32, f32)>,
    live_buffer: LiveBuffer,
}

impl TempoEstimator {
    pub fn new(config: &TempoConfig, sample_rate: u32) -> Self {
        Self {
            offline: None,
            live: None,
            live_buffer: LiveBuffer::new(config.live_buffer_seconds, sample_rate),
        }
    }

    /// Estimate the tempo of a whole buffer and keep it as the offline estimate.
    /// A failed estimate leaves the previous one in place.
    pub fn estimate_offline(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        tracker: Option<&dyn BeatTracker>,
        config: &TempoConfig,
    ) -> Option<TempoEstimate> {
        let candidates = collect_candidates(samples, sample_rate, tracker);
        let estimate = cluster_candidates(
            &candidates,
            config.cluster_tolerance_bpm,
            config.cluster_prior_weight,
        );

        match estimate {
            Some(estimate) => {
                tracing::info!(
                    "Tempo estimate: {:.2} BPM from {} ({:.0}% confidence)",
                    estimate.bpm, estimate.source, estimate.confidence * 100.0
                );
                self.offline = Some(estimate);
            }
            None => {
                tracing::warn!(
                    "No tempo found in {:.1}s of audio",
                    samples.len() as f64 / sample_rate.max(1) as f64
                );
            }
        }
        estimate
    }

    /// Run the offline estimator over the rolling live buffer
    pub fn recalculate(
        &mut self,
        tracker: Option<&dyn BeatTracker>,
        config: &TempoConfig,
    ) -> Option<TempoEstimate> {
        let duration = self.live_buffer.duration();
        if duration < MIN_RECALC_SECONDS {
            tracing::warn!(
                "Live buffer holds {:.1}s, need {:.0}s to recalculate tempo",
                duration, MIN_RECALC_SECONDS
            );
            return None;
        }
        let samples = self.live_buffer.to_vec();
        let sample_rate = self.live_buffer.sample_rate();
        self.estimate_offline(&samples, sample_rate, tracker, config)
    }

    /// Latest tempo/confidence pair from the onset analyzer
    pub fn update_live(&mut self, bpm: f32, confidence: f32) {
        self.live = (bpm.is_finite() && bpm > 0.0).then(|| (bpm, confidence.clamp(0.0, 1.0)));
    }

    pub fn live(&self) -> Option<(f32, f32)> {
        self.live
    }

    pub fn offline(&self) -> Option<TempoEstimate> {
        self.offline
    }

    /// Live tempo when assist is on and it clears the confidence floor,
    /// otherwise the last offline estimate
    pub fn current(&self, config: &TempoConfig) -> Option<TempoEstimate> {
        if config.assist_enabled {
            if let Some((bpm, confidence)) = self.live {
                if confidence >= config.live_confidence_floor {
                    return Some(TempoEstimate { bpm, confidence, source: TempoSource::Live });
                }
            }
        }
        self.offline
    }

    pub fn live_buffer(&self) -> &LiveBuffer {
        &self.live_buffer
    }

    pub fn live_buffer_mut(&mut self) -> &mut LiveBuffer {
        &mut self.live_buffer
    }

    /// Forget everything tied to the previous source
    pub fn reset_source(&mut self) {
        self.offline = None;
        self.live = None;
        self.live_buffer.clear();
    }
}
