use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::analyzers::{
    AnalyzerLoader, BeatTracker, NativeGridAnalyzer, NativeOnsetAnalyzer, NativeTimbre,
    OfflineAnalysisClient, OnsetAnalyzer, OnsetFrame, TimbreAnalyzer, TimbreFeatures,
};
use crate::audio::AudioData;
use crate::capture::{CaptureSource, FilePlayback, Pacing};
use crate::config::{Config, ConfigUpdate};
use crate::detection::{BeatDetector, DownbeatSource, DropBuildDetector, DropInput};
use crate::dsp::{FluxRing, SpectrumAnalyser};
use crate::engine::FeatureSnapshot;
use crate::error::{AnalyzerError, CaptureError};
use crate::features::FeatureAggregator;
use crate::realtime::{frame_link, FrameMessage, MainEndpoint, ProcessorStats, SpectralFrameProcessor, FRAME_SIZE};
use crate::tempo::{BeatGrid, GridPosition, QuantizationGrid, TapTempo, TempoEstimate, TempoEstimator, TempoSource};

/// Frames that may queue between ticks before the processor starts dropping
pub const LINK_CAPACITY: usize = 256;

pub type OnsetLoader = AnalyzerLoader<Box<dyn OnsetAnalyzer>>;
pub type TimbreLoader = AnalyzerLoader<Box<dyn TimbreAnalyzer>>;
pub type TrackerLoader = AnalyzerLoader<Box<dyn BeatTracker>>;
pub type GridWorkerLoader = AnalyzerLoader<OfflineAnalysisClient>;

/// Flux statistics and level of the newest frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct FrameStats {
    rms: f32,
    flux: f32,
    flux_mean: f32,
    flux_std: f32,
}

/// Main-context feature engine
///
/// Owns every piece of beat, drop and tempo state and advances it once per
/// [`tick`](Self::tick). Audio reaches it either through a capture source
/// driving a [`SpectralFrameProcessor`] on another thread, or through
/// [`feed_samples`](Self::feed_samples) when no real-time link exists. In the
/// second case flux comes from the polling analyser instead.
pub struct ReactiveEngine {
    config: Config,
    sample_rate: u32,

    analyser: SpectrumAnalyser,
    aggregator: FeatureAggregator,
    beat: BeatDetector,
    drops: DropBuildDetector,
    tempo: TempoEstimator,
    tap: TapTempo,
    quantize: QuantizationGrid,
    grid: BeatGrid,

    onset: OnsetLoader,
    onset_rate: Option<u32>,
    timbre: TimbreLoader,
    tracker: TrackerLoader,
    grid_worker: GridWorkerLoader,

    source: Option<Box<dyn CaptureSource>>,
    link: Option<MainEndpoint>,
    stats: Option<Arc<ProcessorStats>>,
    inbox: Vec<FrameMessage>,
    frame_id: Option<u64>,
    last_frame: FrameStats,

    // Polling fallback
    fallback_flux: FluxRing,
    fallback_fresh: bool,
    fed_samples: u64,
    onset_block: Vec<f32>,
    onset_blocks: u64,

    onset_frame: OnsetFrame,
    onset_pulse: bool,
    timbre_features: TimbreFeatures,
    last_tick: Option<f64>,
    snapshot: FeatureSnapshot,
}

impl ReactiveEngine {
    /// Engine with the native analyzers registered and no external beat tracker
    pub fn new(config: Config) -> Self {
        let config = config.sanitized();
        let sample_rate = config.engine.sample_rate;

        let onset = AnalyzerLoader::new("onset").with_source("native", move || {
            Ok(Box::new(NativeOnsetAnalyzer::new(sample_rate, FRAME_SIZE)) as Box<dyn OnsetAnalyzer>)
        });
        let timbre = AnalyzerLoader::new("timbre")
            .with_source("native", || Ok(Box::new(NativeTimbre::new()) as Box<dyn TimbreAnalyzer>));
        let grid_worker = AnalyzerLoader::new("beat-grid").with_source("native", || {
            OfflineAnalysisClient::spawn(Box::new(NativeGridAnalyzer::new())).map_err(|e| {
                AnalyzerError::LoadFailed {
                    name: "beat-grid".to_string(),
                    source_name: "native".to_string(),
                    reason: e.to_string(),
                }
            })
        });

        info!(
            "Engine ready: {} Hz, analyser window {}, sensitivity {:.2}",
            sample_rate, config.engine.frame_size, config.engine.sensitivity
        );

        let mut tap = TapTempo::new();
        tap.set_multiplier(config.tap.multiplier);

        Self {
            analyser: SpectrumAnalyser::new(config.engine.frame_size, sample_rate, config.engine.smoothing),
            aggregator: FeatureAggregator::new(),
            beat: BeatDetector::new(),
            drops: DropBuildDetector::new(),
            tempo: TempoEstimator::new(&config.tempo, sample_rate),
            tap,
            quantize: QuantizationGrid::new(),
            grid: BeatGrid::empty(),
            onset,
            onset_rate: None,
            timbre,
            tracker: AnalyzerLoader::new("beat-tracker"),
            grid_worker,
            source: None,
            link: None,
            stats: None,
            inbox: Vec::with_capacity(LINK_CAPACITY),
            frame_id: None,
            last_frame: FrameStats::default(),
            fallback_flux: FluxRing::default(),
            fallback_fresh: false,
            fed_samples: 0,
            onset_block: Vec::with_capacity(FRAME_SIZE),
            onset_blocks: 0,
            onset_frame: OnsetFrame::default(),
            onset_pulse: false,
            timbre_features: TimbreFeatures::default(),
            last_tick: None,
            snapshot: FeatureSnapshot::default(),
            sample_rate,
            config,
        }
    }

    pub fn with_onset_analyzer(mut self, loader: OnsetLoader) -> Self {
        self.onset = loader;
        self.onset_rate = None;
        self
    }

    pub fn with_timbre_analyzer(mut self, loader: TimbreLoader) -> Self {
        self.timbre = loader;
        self
    }

    pub fn with_beat_tracker(mut self, loader: TrackerLoader) -> Self {
        self.tracker = loader;
        self
    }

    pub fn with_grid_analyzer(mut self, loader: GridWorkerLoader) -> Self {
        self.grid_worker = loader;
        self
    }

    // ==========================================
    // PER-TICK PIPELINE
    // ==========================================

    /// Advance every detector to `now` (seconds) and return the snapshot
    pub fn tick(&mut self, now: f64) -> FeatureSnapshot {
        self.last_tick = Some(now);

        let drained = self.drain_frames();
        let rms = match (&self.link, drained) {
            (_, Some(stats)) => stats.rms,
            (Some(_), None) => self.last_frame.rms,
            (None, None) => self.analyser.window_rms(),
        };

        let bin_hz = self.analyser.bin_hz();
        let magnitudes = self.analyser.analyse(self.config.engine.gain);
        let features = self.aggregator.update(magnitudes, bin_hz, rms, &self.config);
        if !self.timbre.is_disabled() {
            if let Ok(timbre) = self.timbre.get() {
                self.timbre_features = timbre.analyze(magnitudes, bin_hz);
            }
        }

        // Fresh flux this tick, from the processor or the polling analyser
        let fresh = match drained {
            Some(stats) => Some(stats),
            None if self.link.is_none() && self.fallback_fresh => {
                self.fallback_fresh = false;
                let flux = self.analyser.flux();
                self.fallback_flux.push(flux);
                Some(FrameStats {
                    rms,
                    flux,
                    flux_mean: self.fallback_flux.mean(),
                    flux_std: self.fallback_flux.std(),
                })
            }
            None => None,
        };
        if let Some(stats) = fresh {
            self.last_frame = stats;
        }
        let stats = self.last_frame;

        let gated = self.config.noise_gate.enabled && features.bands.bass.raw < self.config.noise_gate.threshold;

        let beat = match fresh {
            Some(stats) if !gated => self.beat.process(
                now,
                stats.flux,
                features.bands.bass.env,
                &self.config.beat,
                self.config.engine.sensitivity,
            ),
            _ => false,
        };

        let estimate = self.current_tempo();
        let pulse = if self.config.quantize.enabled {
            if beat {
                self.quantize.on_real_beat(now);
                false
            } else {
                match self.tap.bpm().or(estimate.map(|e| e.bpm)) {
                    Some(bpm) if bpm > 0.0 => {
                        self.quantize.poll(now, 60.0 / bpm as f64, self.config.quantize.phase_ms)
                    }
                    _ => false,
                }
            }
        } else {
            false
        };

        let position = self.position();
        let (drop, is_building, build_level) = if self.config.drop.enabled && (beat || pulse) {
            let downbeat = match position {
                Some(position) if !self.grid.downbeats().is_empty() => DownbeatSource::Grid {
                    position,
                    grid: &self.grid,
                },
                _ => DownbeatSource::Counter,
            };
            let input = DropInput {
                now,
                flux: stats.flux,
                flux_mean: stats.flux_mean,
                flux_std: stats.flux_std,
                bass_flux: features.bass_flux,
                bass_flux_mean: features.bass_flux_mean,
                bass_flux_std: features.bass_flux_std,
                centroid_slope: features.centroid_slope,
                bass_env: features.bands.bass.env,
                downbeat,
            };
            let outcome = self.drops.on_pulse(&input, &self.config.drop);
            if outcome.drop {
                info!("Drop at {:.2}s (build level {:.2})", now, outcome.build_level);
            }
            (outcome.drop, outcome.is_building, outcome.build_level)
        } else {
            (
                false,
                self.drops.is_building(&self.config.drop),
                self.drops.state().build_level,
            )
        };

        // A lost live tempo reports 0 BPM and clears the live estimate
        self.tempo.update_live(self.onset_frame.tempo_bpm, self.onset_frame.tempo_conf);

        if let Some(worker) = self.grid_worker.loaded_mut() {
            if let Some(grid) = worker.poll() {
                self.grid = grid;
            }
        }

        let onset_pulse = std::mem::take(&mut self.onset_pulse);
        self.snapshot = FeatureSnapshot {
            rms: features.rms,
            rms_norm: features.rms_norm,
            bands: features.bands,
            centroid_hz: features.centroid_hz,
            centroid_norm: features.centroid_norm,
            flux: stats.flux,
            flux_mean: stats.flux_mean,
            flux_std: stats.flux_std,
            beat,
            pulse,
            drop,
            is_building,
            build_level,
            gated,
            bpm: estimate.map_or(0.0, |e| e.bpm),
            bpm_confidence: estimate.map_or(0.0, |e| e.confidence),
            bpm_source: estimate.map(|e| e.source),
            tap_bpm: self.tap.bpm(),
            mfcc: self.timbre_features.mfcc,
            chroma: self.timbre_features.chroma,
            flatness: self.timbre_features.flatness,
            rolloff: self.timbre_features.rolloff,
            pitch_hz: self.onset_frame.pitch_hz,
            pitch_conf: self.onset_frame.pitch_conf,
            live_tempo_bpm: self.onset_frame.tempo_bpm,
            live_tempo_conf: self.onset_frame.tempo_conf,
            onset_pulse,
            beat_grid: self.grid.clone(),
            frame_id: self.frame_id,
        };
        self.snapshot.clone()
    }

    /// Pull every queued frame into the analyser and onset analyzer
    fn drain_frames(&mut self) -> Option<FrameStats> {
        let link = self.link.as_mut()?;
        let was_connected = link.is_connected();
        self.inbox.clear();
        let inbox = &mut self.inbox;
        link.drain(|frame| inbox.push(*frame));
        if was_connected && !link.is_connected() {
            debug!("Frame processor closed after frame {:?}", link.last_frame_id());
        }
        let last = *self.inbox.last()?;

        let live = self.source.as_ref().is_some_and(|s| s.is_live());
        let frame_seconds = FRAME_SIZE as f64 / self.sample_rate as f64;
        let mut peak_flux = 0.0f32;
        for frame in &self.inbox {
            self.analyser.push_samples(&frame.samples);
            if live {
                self.tempo.live_buffer_mut().push(&frame.samples);
            }
            let t = frame.frame_id as f64 * frame_seconds;
            if let Some(onset) = Self::onset_step(&mut self.onset, &mut self.onset_rate, self.sample_rate, &frame.samples, t) {
                self.onset_pulse |= onset.onset;
                self.onset_frame = onset;
            }
            peak_flux = peak_flux.max(frame.flux);
        }
        self.frame_id = Some(last.frame_id);
        tracing::trace!("Drained {} frames up to {}", self.inbox.len(), last.frame_id);

        // A spike in any frame of the tick counts
        Some(FrameStats {
            rms: last.rms,
            flux: peak_flux,
            flux_mean: last.flux_mean,
            flux_std: last.flux_std,
        })
    }

    fn onset_step(
        loader: &mut OnsetLoader,
        configured_rate: &mut Option<u32>,
        sample_rate: u32,
        block: &[f32],
        t: f64,
    ) -> Option<OnsetFrame> {
        if loader.is_disabled() {
            return None;
        }
        let analyzer = loader.get().ok()?;
        if *configured_rate != Some(sample_rate) {
            analyzer.configure(sample_rate, FRAME_SIZE);
            *configured_rate = Some(sample_rate);
        }
        Some(analyzer.process(block, t))
    }

    /// Live estimate or offline estimate, falling back to the beat grid tempo
    fn current_tempo(&self) -> Option<TempoEstimate> {
        self.tempo.current(&self.config.tempo).or_else(|| {
            (!self.grid.is_empty() && self.grid.bpm > 0.0).then(|| TempoEstimate {
                bpm: self.grid.bpm,
                confidence: self.grid.confidence,
                source: TempoSource::Grid,
            })
        })
    }

    // ==========================================
    // SOURCES
    // ==========================================

    /// Start `source` on a fresh processor link and make it current.
    ///
    /// A start failure is returned unchanged and leaves the engine on its
    /// previous source.
    pub fn attach_source(&mut self, mut source: Box<dyn CaptureSource>) -> Result<(), CaptureError> {
        let (rt, main) = frame_link(LINK_CAPACITY);
        let processor = SpectralFrameProcessor::new(rt);
        let stats = processor.stats();

        if let Err(e) = source.start(processor) {
            warn!("Could not start {}: {}", source.name(), e);
            return Err(e);
        }

        if let Some(mut previous) = self.source.take() {
            previous.stop();
        }
        info!(
            "Attached {} source {} at {} Hz",
            if source.is_live() { "live" } else { "file" },
            source.name(),
            source.sample_rate()
        );

        self.link = Some(main);
        self.stats = Some(stats);
        self.frame_id = None;
        self.set_sample_rate(source.sample_rate());
        self.source = Some(source);
        self.reset_for_new_source();
        Ok(())
    }

    /// Stop the current source; the engine falls back to polling analysis
    pub fn detach_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.stop();
            info!("Detached {}", source.name());
        }
        self.link = None;
        self.stats = None;
    }

    /// Attach file playback and analyse the whole buffer for tempo and grid
    pub fn play_file(&mut self, audio: &AudioData, pacing: Pacing) -> Result<Option<TempoEstimate>, CaptureError> {
        self.attach_source(Box::new(FilePlayback::new(audio, pacing)))?;
        Ok(self.load_buffer(audio))
    }

    /// Offline tempo for a whole buffer plus an asynchronous beat-grid job.
    /// The current grid stays until the job reports a new one.
    pub fn load_buffer(&mut self, audio: &AudioData) -> Option<TempoEstimate> {
        let mono = audio.mono_samples();
        let tracker = self.tracker.get().ok().map(|t| &**t as &dyn BeatTracker);
        let estimate = self
            .tempo
            .estimate_offline(&mono, audio.sample_rate, tracker, &self.config.tempo);

        match self.grid_worker.get() {
            Ok(worker) => {
                let job_id = worker.submit(audio.to_payload());
                debug!("Submitted beat grid job {} for {:.1}s", job_id, audio.duration);
            }
            Err(e) => debug!("Beat grid unavailable: {}", e),
        }
        estimate
    }

    /// Fallback input path: mono samples at the engine sample rate
    pub fn feed_samples(&mut self, samples: &[f32]) {
        self.analyser.push_samples(samples);
        self.tempo.live_buffer_mut().push(samples);
        self.fed_samples += samples.len() as u64;
        self.fallback_fresh = true;

        let block_seconds = FRAME_SIZE as f64 / self.sample_rate as f64;
        let mut rest = samples;
        while !rest.is_empty() {
            let take = (FRAME_SIZE - self.onset_block.len()).min(rest.len());
            self.onset_block.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.onset_block.len() == FRAME_SIZE {
                let t = self.onset_blocks as f64 * block_seconds;
                self.onset_blocks += 1;
                if let Some(onset) = Self::onset_step(&mut self.onset, &mut self.onset_rate, self.sample_rate, &self.onset_block, t) {
                    self.onset_pulse |= onset.onset;
                    self.onset_frame = onset;
                }
                self.onset_block.clear();
            }
        }
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        if sample_rate == 0 || sample_rate == self.sample_rate {
            return;
        }
        debug!("Sample rate {} -> {} Hz", self.sample_rate, sample_rate);
        self.sample_rate = sample_rate;
        self.rebuild_analyser();
        self.tempo
            .live_buffer_mut()
            .configure(self.config.tempo.live_buffer_seconds, sample_rate);
    }

    fn rebuild_analyser(&mut self) {
        self.analyser = SpectrumAnalyser::new(
            self.config.engine.frame_size,
            self.sample_rate,
            self.config.engine.smoothing,
        );
    }

    /// Clear everything tied to the previous source. Tap tempo survives.
    fn reset_for_new_source(&mut self) {
        self.analyser.reset_baseline();
        self.aggregator.reset_baselines();
        self.beat.reset();
        self.drops.reset();
        self.quantize.reset();
        self.tempo.reset_source();
        self.grid = BeatGrid::empty();
        self.fallback_flux.clear();
        self.last_frame = FrameStats::default();
        self.onset_block.clear();
        self.onset_frame = OnsetFrame::default();
        if let Some(onset) = self.onset.loaded_mut() {
            onset.reset();
        }
    }

    /// Ask the processor to drop its flux history and clear local baselines
    pub fn reset_baselines(&mut self) {
        if let Some(link) = &self.link {
            link.request_reset();
        }
        self.analyser.reset_baseline();
        self.aggregator.reset_baselines();
        self.fallback_flux.clear();
    }

    // ==========================================
    // TEMPO CONTROLS
    // ==========================================

    /// Re-run offline estimation over the rolling live buffer
    pub fn recalculate_tempo(&mut self) -> Option<TempoEstimate> {
        let tracker = self.tracker.get().ok().map(|t| &**t as &dyn BeatTracker);
        self.tempo.recalculate(tracker, &self.config.tempo)
    }

    /// Register a tap at `now` (seconds); returns the tapped BPM once known
    pub fn tap(&mut self, now: f64) -> Option<f32> {
        self.tap.tap(now)
    }

    pub fn reset_tap(&mut self) {
        self.tap.reset();
    }

    /// Shift the quantized pulse phase
    pub fn nudge(&mut self, ms: f64) {
        self.quantize.nudge(ms);
    }

    // ==========================================
    // CONFIGURATION
    // ==========================================

    /// Apply one clamped configuration change
    pub fn update_config(&mut self, update: ConfigUpdate) {
        debug!("Config update: {:?}", update);
        let previous = self.config.engine.clone();
        let previous_buffer = self.config.tempo.live_buffer_seconds;
        self.config.apply(update);

        if self.config.engine.frame_size != previous.frame_size {
            self.rebuild_analyser();
        } else if self.config.engine.smoothing != previous.smoothing {
            self.analyser.set_smoothing(self.config.engine.smoothing);
        }
        if self.config.tempo.live_buffer_seconds != previous_buffer {
            self.tempo
                .live_buffer_mut()
                .configure(self.config.tempo.live_buffer_seconds, self.sample_rate);
        }
        self.tap.set_multiplier(self.config.tap.multiplier);
    }

    // ==========================================
    // ACCESSORS
    // ==========================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Snapshot returned by the last tick
    pub fn snapshot(&self) -> &FeatureSnapshot {
        &self.snapshot
    }

    pub fn last_tick(&self) -> Option<f64> {
        self.last_tick
    }

    pub fn beat_grid(&self) -> &BeatGrid {
        &self.grid
    }

    /// Current position located on the beat grid
    pub fn grid_position(&self) -> Option<GridPosition> {
        self.position().and_then(|t| self.grid.quantize(t))
    }

    pub fn tempo(&self) -> &TempoEstimator {
        &self.tempo
    }

    pub fn source(&self) -> Option<&dyn CaptureSource> {
        self.source.as_deref()
    }

    /// True while a frame processor is still attached and delivering frames
    pub fn has_link(&self) -> bool {
        self.link.as_ref().is_some_and(|link| link.is_connected())
    }

    /// Playback position of the source, or of the samples fed directly
    pub fn position(&self) -> Option<f64> {
        match &self.source {
            Some(source) => source.position(),
            None if self.fed_samples > 0 => Some(self.fed_samples as f64 / self.sample_rate as f64),
            None => None,
        }
    }

    /// Frames the processor had to drop because ticks fell behind
    pub fn dropped_frames(&self) -> u64 {
        self.stats.as_ref().map_or(0, |s| s.dropped())
    }
}

impl Drop for ReactiveEngine {
    fn drop(&mut self) {
        self.detach_source();
    }
}
