use crate::config::DropConfig;
use crate::dsp::stats::percentile;
use crate::tempo::BeatGrid;

/// Where the detector should look for downbeats when bar-gating
#[derive(Debug, Clone, Copy)]
pub enum DownbeatSource<'a> {
    /// Offline beat grid plus the current playback position (seconds)
    Grid { position: f64, grid: &'a BeatGrid },
    /// Internal beat-within-bar counter
    Counter,
}

/// Everything the detector reads on one qualifying pulse
#[derive(Debug, Clone, Copy)]
pub struct DropInput<'a> {
    pub now: f64,
    pub flux: f32,
    pub flux_mean: f32,
    pub flux_std: f32,
    pub bass_flux: f32,
    pub bass_flux_mean: f32,
    pub bass_flux_std: f32,
    pub centroid_slope: f32,
    pub bass_env: f32,
    pub downbeat: DownbeatSource<'a>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DropOutcome {
    pub drop: bool,
    pub is_building: bool,
    pub build_level: f32,
}

/// Mutable build/drop state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DropBuildState {
    pub build_beat_count: u32,
    /// EMA of the positive flux z-score
    pub build_level: f32,
    /// Centroid slope seen on the latest pulse
    pub centroid_slope_ema: f32,
    pub last_drop_at: Option<f64>,
    pub bar_phase_index: u32,
}

#[derive(Debug, Clone, Default)]
struct AutoCalibration {
    started_at: Option<f64>,
    bass: Vec<f32>,
    falling_slope: Vec<f32>,
    done: bool,
}

/// Build/drop state machine evaluated on beats and grid pulses
#[derive(Debug, Clone, Default)]
pub struct DropBuildDetector {
    state: DropBuildState,
    calibration: AutoCalibration,
    calibrated: Option<(f32, f32)>,
}

impl DropBuildDetector {
    const BASS_PERCENTILE: f32 = 70.0;
    const SLOPE_PERCENTILE: f32 = 60.0;
    const MIN_SLOPE_THRESHOLD: f32 = 1e-4;

    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one qualifying pulse
    pub fn on_pulse(&mut self, input: &DropInput<'_>, config: &DropConfig) -> DropOutcome {
        if !config.enabled {
            return DropOutcome::default();
        }

        let z = if config.use_bass_flux {
            z_score(input.bass_flux, input.bass_flux_mean, input.bass_flux_std)
        } else {
            z_score(input.flux, input.flux_mean, input.flux_std)
        };
        self.state.build_level += (z - self.state.build_level) * config.build_level_alpha;
        self.state.centroid_slope_ema = input.centroid_slope;

        if config.auto_calibrate {
            self.calibrate(input, config);
        }

        let (bass_threshold, slope_threshold) = self.thresholds(config);
        let cooldown_over = self
            .state
            .last_drop_at
            .map_or(true, |last| (input.now - last) * 1000.0 >= config.cooldown_ms);
        let on_downbeat = !config.bar_gating || self.on_downbeat(input, config);

        let fired = cooldown_over
            && self.state.build_beat_count >= config.min_build_beats
            && input.centroid_slope <= -slope_threshold
            && input.bass_env > bass_threshold
            && on_downbeat;

        if fired {
            tracing::debug!(
                "Drop at {:.2}s after {} build beats (slope {:.4}, bass {:.2})",
                input.now, self.state.build_beat_count, input.centroid_slope, input.bass_env
            );
            self.state.build_beat_count = 0;
            self.state.last_drop_at = Some(input.now);
        } else if z > config.build_flux_threshold {
            self.state.build_beat_count += 1;
        } else {
            self.state.build_beat_count = self.state.build_beat_count.saturating_sub(1);
        }

        self.state.bar_phase_index = (self.state.bar_phase_index + 1) % config.beats_per_bar.max(1);

        DropOutcome {
            drop: fired,
            is_building: self.is_building(config),
            build_level: self.state.build_level,
        }
    }

    pub fn is_building(&self, config: &DropConfig) -> bool {
        config.enabled && self.state.build_beat_count >= (config.min_build_beats / 2).max(1)
    }

    pub fn state(&self) -> &DropBuildState {
        &self.state
    }

    /// Thresholds substituted by auto-calibration, once it has run
    pub fn calibrated_thresholds(&self) -> Option<(f32, f32)> {
        self.calibrated
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn thresholds(&self, config: &DropConfig) -> (f32, f32) {
        self.calibrated
            .unwrap_or((config.bass_threshold, config.centroid_slope_threshold))
    }

    fn on_downbeat(&self, input: &DropInput<'_>, config: &DropConfig) -> bool {
        match input.downbeat {
            DownbeatSource::Grid { position, grid } if !grid.downbeats().is_empty() => {
                grid.is_near_downbeat(position, config.downbeat_tolerance_ms / 1000.0)
            }
            _ => self.state.bar_phase_index == 0,
        }
    }

    fn calibrate(&mut self, input: &DropInput<'_>, config: &DropConfig) {
        let cal = &mut self.calibration;
        if cal.done {
            return;
        }
        let started = *cal.started_at.get_or_insert(input.now);
        if input.now - started < config.calibration_window_s {
            cal.bass.push(input.bass_env);
            cal.falling_slope.push(-input.centroid_slope);
            return;
        }

        cal.done = true;
        let bass = percentile(&cal.bass, Self::BASS_PERCENTILE);
        let slope = percentile(&cal.falling_slope, Self::SLOPE_PERCENTILE);
        if let (Some(bass), Some(slope)) = (bass, slope) {
            let calibrated = (bass.clamp(0.0, 1.0), slope.max(Self::MIN_SLOPE_THRESHOLD));
            tracing::info!(
                "Drop thresholds calibrated from {} pulses: bass {:.3}, slope {:.4}",
                cal.bass.len(), calibrated.0, calibrated.1
            );
            self.calibrated = Some(calibrated);
        } else {
            tracing::warn!("Drop auto-calibration saw no pulses; keeping configured thresholds");
        }
        cal.bass = Vec::new();
        cal.falling_slope = Vec::new();
    }
}

fn z_score(value: f32, mean: f32, std: f32) -> f32 {
    if std <= 1e-9 {
        return 0.0;
    }
    ((value - mean) / std).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse(now: f64, flux: f32, slope: f32, bass: f32) -> DropInput<'static> {
        DropInput {
            now,
            flux,
            flux_mean: 1.0,
            flux_std: 0.5,
            bass_flux: 0.0,
            bass_flux_mean: 0.0,
            bass_flux_std: 0.0,
            centroid_slope: slope,
            bass_env: bass,
            downbeat: DownbeatSource::Counter,
        }
    }

    #[test]
    fn test_drop_fires_on_fifth_beat_after_build() {
        let config = DropConfig::default();
        let mut detector = DropBuildDetector::new();

        for i in 0..4 {
            let out = detector.on_pulse(&pulse(i as f64 * 0.5, 2.0, 0.0, 0.8), &config);
            assert!(!out.drop);
        }
        assert_eq!(detector.state().build_beat_count, 4);
        assert!(detector.is_building(&config));

        let threshold = config.centroid_slope_threshold;
        let out = detector.on_pulse(&pulse(2.0, 1.0, -threshold * 2.0, 0.9), &config);
        assert!(out.drop);
        assert_eq!(detector.state().build_beat_count, 0);
        assert_eq!(detector.state().last_drop_at, Some(2.0));
    }

    #[test]
    fn test_build_count_decrements_instead_of_resetting() {
        let config = DropConfig::default();
        let mut detector = DropBuildDetector::new();
        for i in 0..3 {
            detector.on_pulse(&pulse(i as f64, 2.0, 0.0, 0.8), &config);
        }
        detector.on_pulse(&pulse(3.0, 1.0, 0.0, 0.8), &config);
        assert_eq!(detector.state().build_beat_count, 2);
        for i in 0..5 {
            detector.on_pulse(&pulse(4.0 + i as f64, 0.5, 0.0, 0.8), &config);
        }
        assert_eq!(detector.state().build_beat_count, 0);
    }

    #[test]
    fn test_cooldown_blocks_second_drop() {
        let config = DropConfig::default();
        let mut detector = DropBuildDetector::new();
        let mut drops = 0;
        let mut t = 0.0;
        for _ in 0..3 {
            for _ in 0..4 {
                detector.on_pulse(&pulse(t, 2.0, 0.0, 0.8), &config);
                t += 0.5;
            }
            if detector.on_pulse(&pulse(t, 2.0, -0.5, 0.9), &config).drop {
                drops += 1;
            }
            t += 0.5;
        }
        // Three build/drop cycles in 7.5 s, cooldown is 8 s
        assert_eq!(drops, 1);
    }

    #[test]
    fn test_bar_gating_uses_grid_downbeats() {
        let config = DropConfig {
            bar_gating: true,
            ..DropConfig::default()
        };
        let beats: Vec<f64> = (0..16).map(|i| i as f64 * 0.5).collect();
        let grid = BeatGrid::new(120.0, 0.8, beats, vec![0.0, 2.0, 4.0, 6.0], "test");
        let mut detector = DropBuildDetector::new();
        for i in 0..4 {
            detector.on_pulse(&pulse(i as f64 * 0.5, 2.0, 0.0, 0.8), &config);
        }

        let mut off_bar = pulse(2.5, 2.0, -0.5, 0.9);
        off_bar.downbeat = DownbeatSource::Grid { position: 2.5, grid: &grid };
        assert!(!detector.on_pulse(&off_bar, &config).drop);

        let mut on_bar = pulse(4.05, 2.0, -0.5, 0.9);
        on_bar.downbeat = DownbeatSource::Grid { position: 4.05, grid: &grid };
        assert!(detector.on_pulse(&on_bar, &config).drop);
    }

    #[test]
    fn test_auto_calibration_substitutes_thresholds_once() {
        let config = DropConfig {
            auto_calibrate: true,
            calibration_window_s: 10.0,
            ..DropConfig::default()
        };
        let mut detector = DropBuildDetector::new();
        for i in 0..20 {
            let bass = 0.3 + 0.01 * i as f32;
            detector.on_pulse(&pulse(i as f64 * 0.5, 0.0, -0.001 * i as f32, bass), &config);
        }
        assert!(detector.calibrated_thresholds().is_none());
        detector.on_pulse(&pulse(10.5, 0.0, 0.0, 0.5), &config);
        let (bass, slope) = detector.calibrated_thresholds().unwrap();
        assert!((bass - 0.433).abs() < 1e-3, "bass {}", bass);
        assert!((slope - 0.0114).abs() < 1e-4, "slope {}", slope);

        // Later pulses never recalibrate
        detector.on_pulse(&pulse(40.0, 0.0, 0.0, 1.0), &config);
        assert_eq!(detector.calibrated_thresholds(), Some((bass, slope)));
    }
}
