use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Main configuration for Spectral-Pulse
///
/// Every numeric field is a tunable, not an invariant. Values loaded from a
/// file or changed through [`ConfigUpdate`] are clamped into their legal range
/// rather than rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Input gain, sensitivity and analyser settings
    pub engine: EngineConfig,

    /// Band crossover frequencies
    pub bands: BandConfig,

    /// Beat detection
    pub beat: BeatConfig,

    /// Ambient noise gate
    pub noise_gate: NoiseGateConfig,

    /// Band envelope smoothing
    pub envelope: EnvelopeConfig,

    /// Adaptive gain control
    pub agc: AgcConfig,

    /// Build/drop detection
    pub drop: DropConfig,

    /// Tempo estimation
    pub tempo: TempoConfig,

    /// Manual tap tempo
    pub tap: TapConfig,

    /// Quantized pulse grid
    pub quantize: QuantizeConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config.sanitized())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Return a copy with every field clamped into its legal range
    pub fn sanitized(mut self) -> Self {
        self.engine.sanitize();
        self.bands.sanitize();
        self.beat.sanitize();
        self.noise_gate.sanitize();
        self.envelope.sanitize();
        self.agc.sanitize();
        self.drop.sanitize();
        self.tempo.sanitize();
        self.tap.sanitize();
        self.quantize.sanitize();
        self
    }

    /// Apply a single update, clamping the new value
    pub fn apply(&mut self, update: ConfigUpdate) {
        match update {
            ConfigUpdate::Gain(v) => self.engine.gain = v,
            ConfigUpdate::Sensitivity(v) => self.engine.sensitivity = v,
            ConfigUpdate::Smoothing(v) => self.engine.smoothing = v,
            ConfigUpdate::FrameSize(v) => self.engine.frame_size = v,
            ConfigUpdate::Crossovers { sub_hz, bass_hz, mid_hz } => {
                self.bands.sub_hz = sub_hz;
                self.bands.bass_hz = bass_hz;
                self.bands.mid_hz = mid_hz;
            }
            ConfigUpdate::BeatRefractoryMs(v) => self.beat.refractory_ms = v,
            ConfigUpdate::EnergyFloor(v) => self.beat.energy_floor = v,
            ConfigUpdate::NoiseGate { enabled, threshold } => {
                self.noise_gate.enabled = enabled;
                self.noise_gate.threshold = threshold;
            }
            ConfigUpdate::Envelope { attack, release } => {
                self.envelope.attack = attack;
                self.envelope.release = release;
            }
            ConfigUpdate::Agc { enabled, decay } => {
                self.agc.enabled = enabled;
                self.agc.decay = decay;
            }
            ConfigUpdate::Drop(drop) => self.drop = drop,
            ConfigUpdate::TempoAssist(v) => self.tempo.assist_enabled = v,
            ConfigUpdate::TapMultiplier(v) => self.tap.multiplier = v,
            ConfigUpdate::Quantize { enabled, phase_ms } => {
                self.quantize.enabled = enabled;
                self.quantize.phase_ms = phase_ms;
            }
        }
        *self = std::mem::take(self).sanitized();
    }
}

/// A single change to the configuration surface
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigUpdate {
    Gain(f32),
    Sensitivity(f32),
    Smoothing(f32),
    FrameSize(usize),
    Crossovers { sub_hz: f32, bass_hz: f32, mid_hz: f32 },
    BeatRefractoryMs(f64),
    EnergyFloor(f32),
    NoiseGate { enabled: bool, threshold: f32 },
    Envelope { attack: f32, release: f32 },
    Agc { enabled: bool, decay: f32 },
    Drop(DropConfig),
    TempoAssist(bool),
    TapMultiplier(f32),
    Quantize { enabled: bool, phase_ms: f64 },
}

fn clamp_finite(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() { value.clamp(min, max) } else { fallback }
}

fn clamp_finite_f64(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_finite() { value.clamp(min, max) } else { fallback }
}

/// Input and analyser configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate assumed until a source reports its own (Hz)
    pub sample_rate: u32,

    /// Linear input gain applied before analysis
    pub gain: f32,

    /// Beat sensitivity (nominal 0..2, higher fires more easily)
    pub sensitivity: f32,

    /// Analyser time smoothing (0 = none, 0.99 = very slow)
    pub smoothing: f32,

    /// Main-context analyser window length (power of two)
    pub frame_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            gain: 1.0,
            sensitivity: 1.0,
            smoothing: 0.8,
            frame_size: 2048,
        }
    }
}

impl EngineConfig {
    fn sanitize(&mut self) {
        self.sample_rate = self.sample_rate.clamp(8000, 192_000);
        self.gain = clamp_finite(self.gain, 0.0, 8.0, 1.0);
        self.sensitivity = clamp_finite(self.sensitivity, 0.0, 2.0, 1.0);
        self.smoothing = clamp_finite(self.smoothing, 0.0, 0.99, 0.8);
        self.frame_size = self.frame_size.clamp(256, 8192).next_power_of_two().min(8192);
    }
}

/// Band crossover frequencies. Treble covers everything above `mid_hz`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandConfig {
    pub sub_hz: f32,
    pub bass_hz: f32,
    pub mid_hz: f32,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            sub_hz: 60.0,
            bass_hz: 250.0,
            mid_hz: 4000.0,
        }
    }
}

impl BandConfig {
    /// Minimum distance between adjacent crossovers (Hz)
    pub const MIN_GAP_HZ: f32 = 5.0;

    fn sanitize(&mut self) {
        self.bass_hz = clamp_finite(self.bass_hz, 40.0, 2000.0, 250.0);
        self.sub_hz = clamp_finite(self.sub_hz, 10.0, 2000.0, 60.0)
            .min(self.bass_hz - Self::MIN_GAP_HZ);
        self.mid_hz = clamp_finite(self.mid_hz, 500.0, 16_000.0, 4000.0)
            .max(self.bass_hz + Self::MIN_GAP_HZ);
    }
}

/// Beat detection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatConfig {
    /// Minimum time between two accepted beats (ms)
    pub refractory_ms: f64,

    /// Minimum bass envelope for a beat to be accepted
    pub energy_floor: f32,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            refractory_ms: 350.0,
            energy_floor: 0.28,
        }
    }
}

impl BeatConfig {
    fn sanitize(&mut self) {
        self.refractory_ms = clamp_finite_f64(self.refractory_ms, 50.0, 2000.0, 350.0);
        self.energy_floor = clamp_finite(self.energy_floor, 0.0, 1.0, 0.28);
    }
}

/// Ambient noise gate on raw bass energy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseGateConfig {
    pub enabled: bool,
    pub threshold: f32,
    /// Default calibration window (seconds)
    pub calibration_seconds: f64,
}

impl Default for NoiseGateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 0.02,
            calibration_seconds: 5.0,
        }
    }
}

impl NoiseGateConfig {
    fn sanitize(&mut self) {
        self.threshold = clamp_finite(self.threshold, 0.0, 1.0, 0.02);
        self.calibration_seconds = clamp_finite_f64(self.calibration_seconds, 0.5, 60.0, 5.0);
    }
}

/// Attack/release coefficients per tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    pub attack: f32,
    pub release: f32,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            attack: 0.7,
            release: 0.12,
        }
    }
}

impl EnvelopeConfig {
    fn sanitize(&mut self) {
        self.attack = clamp_finite(self.attack, 0.001, 1.0, 0.7);
        self.release = clamp_finite(self.release, 0.001, 1.0, 0.12);
    }
}

/// Adaptive gain control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgcConfig {
    pub enabled: bool,
    /// Per-tick decay of the rolling peak
    pub decay: f32,
}

impl Default for AgcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            decay: 0.995,
        }
    }
}

impl AgcConfig {
    fn sanitize(&mut self) {
        self.decay = clamp_finite(self.decay, 0.9, 0.99999, 0.995);
    }
}

/// Build/drop detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DropConfig {
    pub enabled: bool,

    /// Flux z-score above which a pulse counts as building
    pub build_flux_threshold: f32,

    /// Bass envelope the drop pulse must exceed
    pub bass_threshold: f32,

    /// Centroid slope EMA must fall to or below the negative of this
    pub centroid_slope_threshold: f32,

    /// Building pulses required before a drop may fire
    pub min_build_beats: u32,

    /// Minimum time between drops (ms)
    pub cooldown_ms: f64,

    /// Only fire on a downbeat
    pub bar_gating: bool,

    /// Distance to the nearest downbeat still counted as aligned (ms)
    pub downbeat_tolerance_ms: f64,

    /// Beats per bar for the internal bar counter
    pub beats_per_bar: u32,

    /// Use the bass-band flux instead of full-band flux for the build z-score
    pub use_bass_flux: bool,

    /// EMA coefficient for the build level
    pub build_level_alpha: f32,

    /// One-shot threshold calibration during the warm-up window
    pub auto_calibrate: bool,

    /// Warm-up window for auto-calibration (seconds)
    pub calibration_window_s: f64,
}

impl Default for DropConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            build_flux_threshold: 0.6,
            bass_threshold: 0.55,
            centroid_slope_threshold: 0.01,
            min_build_beats: 4,
            cooldown_ms: 8000.0,
            bar_gating: false,
            downbeat_tolerance_ms: 120.0,
            beats_per_bar: 4,
            use_bass_flux: false,
            build_level_alpha: 0.3,
            auto_calibrate: false,
            calibration_window_s: 25.0,
        }
    }
}

impl DropConfig {
    fn sanitize(&mut self) {
        self.build_flux_threshold = clamp_finite(self.build_flux_threshold, 0.0, 10.0, 0.6);
        self.bass_threshold = clamp_finite(self.bass_threshold, 0.0, 1.0, 0.55);
        self.centroid_slope_threshold = clamp_finite(self.centroid_slope_threshold, 0.0, 1.0, 0.01);
        self.min_build_beats = self.min_build_beats.clamp(1, 64);
        self.cooldown_ms = clamp_finite_f64(self.cooldown_ms, 0.0, 120_000.0, 8000.0);
        self.downbeat_tolerance_ms = clamp_finite_f64(self.downbeat_tolerance_ms, 0.0, 1000.0, 120.0);
        self.beats_per_bar = self.beats_per_bar.clamp(1, 16);
        self.build_level_alpha = clamp_finite(self.build_level_alpha, 0.01, 1.0, 0.3);
        self.calibration_window_s = clamp_finite_f64(self.calibration_window_s, 1.0, 300.0, 25.0);
    }
}

/// Tempo estimation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    /// Let the live tempo analyzer override the offline estimate
    pub assist_enabled: bool,

    /// Live confidence required before the live tempo wins
    pub live_confidence_floor: f32,

    /// Length of the rolling buffer kept for recalculation (seconds)
    pub live_buffer_seconds: f64,

    /// Bucket width used when clustering candidates (BPM)
    pub cluster_tolerance_bpm: f32,

    /// Uncommitted weight added to the total when computing confidence
    pub cluster_prior_weight: f32,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            assist_enabled: true,
            live_confidence_floor: 0.5,
            live_buffer_seconds: 20.0,
            cluster_tolerance_bpm: 1.25,
            cluster_prior_weight: 1.0,
        }
    }
}

impl TempoConfig {
    fn sanitize(&mut self) {
        self.live_confidence_floor = clamp_finite(self.live_confidence_floor, 0.0, 1.0, 0.5);
        self.live_buffer_seconds = clamp_finite_f64(self.live_buffer_seconds, 5.0, 120.0, 20.0);
        self.cluster_tolerance_bpm = clamp_finite(self.cluster_tolerance_bpm, 0.1, 10.0, 1.25);
        self.cluster_prior_weight = clamp_finite(self.cluster_prior_weight, 0.0, 100.0, 1.0);
    }
}

/// Manual tap tempo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    /// Power-of-two multiplier applied to the tapped BPM
    pub multiplier: f32,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self { multiplier: 1.0 }
    }
}

impl TapConfig {
    fn sanitize(&mut self) {
        self.multiplier = crate::tempo::tap::snap_multiplier(self.multiplier);
    }
}

/// Quantized pulse grid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizeConfig {
    pub enabled: bool,
    /// Constant phase offset (ms), positive delays the pulse
    pub phase_ms: f64,
}

impl QuantizeConfig {
    fn sanitize(&mut self) {
        self.phase_ms = clamp_finite_f64(self.phase_ms, -1000.0, 1000.0, 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_already_sanitized() {
        let config = Config::default();
        assert_eq!(config.clone().sanitized(), config);
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("pulse.toml");

        let mut original = Config::default();
        original.apply(ConfigUpdate::Sensitivity(1.5));
        original.save_to_file(&file_path).unwrap();
        let loaded = Config::from_file(&file_path).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(&file_path, "[beat]\nrefractory_ms = 20.0\n").unwrap();

        let loaded = Config::from_file(&file_path).unwrap();
        // Out of range values are clamped, not rejected
        assert_eq!(loaded.beat.refractory_ms, 50.0);
        assert_eq!(loaded.engine, EngineConfig::default());
    }

    #[test]
    fn test_missing_file_is_reported() {
        let result = Config::from_file("/definitely/not/here.toml");
        assert!(matches!(
            result,
            Err(crate::error::PulseError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_sub_crossover_stays_below_bass() {
        let mut config = Config::default();
        config.apply(ConfigUpdate::Crossovers { sub_hz: 300.0, bass_hz: 200.0, mid_hz: 100.0 });
        assert!(config.bands.sub_hz <= config.bands.bass_hz - BandConfig::MIN_GAP_HZ);
        assert!(config.bands.mid_hz >= config.bands.bass_hz + BandConfig::MIN_GAP_HZ);
    }

    #[test]
    fn test_updates_are_clamped() {
        let mut config = Config::default();
        config.apply(ConfigUpdate::Gain(f32::NAN));
        assert_eq!(config.engine.gain, 1.0);
        config.apply(ConfigUpdate::Sensitivity(9.0));
        assert_eq!(config.engine.sensitivity, 2.0);
        config.apply(ConfigUpdate::FrameSize(3000));
        assert_eq!(config.engine.frame_size, 4096);
        config.apply(ConfigUpdate::TapMultiplier(3.0));
        assert_eq!(config.tap.multiplier, 4.0);
    }
}
