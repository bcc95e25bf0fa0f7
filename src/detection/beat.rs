use crate::config::BeatConfig;
use crate::dsp::FluxRing;

/// Adaptive-threshold beat detector
///
/// A beat is accepted when the refractory interval has passed, the bass
/// envelope clears the energy floor, and the current flux exceeds
/// `mean + std * (0.8 + 0.8 * sensitivity)` of the preceding flux history.
#[derive(Debug, Clone)]
pub struct BeatDetector {
    history: FluxRing,
    last_beat: Option<f64>,
    last_threshold: f32,
}

impl BeatDetector {
    /// Flux samples required before any beat can fire
    pub const MIN_HISTORY: usize = 5;

    pub fn new() -> Self {
        Self {
            history: FluxRing::new(FluxRing::DEFAULT_CAPACITY),
            last_beat: None,
            last_threshold: 0.0,
        }
    }

    /// Feed one flux observation at `now` (seconds) and report whether it is a beat
    pub fn process(
        &mut self,
        now: f64,
        flux: f32,
        bass_env: f32,
        config: &BeatConfig,
        sensitivity: f32,
    ) -> bool {
        let observed = self.history.len();
        let multiplier = 0.8 + 0.8 * sensitivity.clamp(0.0, 2.0);
        self.last_threshold = self.history.mean() + self.history.std() * multiplier;
        self.history.push(flux.max(0.0));

        if observed < Self::MIN_HISTORY {
            return false;
        }

        let refractory = config.refractory_ms / 1000.0;
        if let Some(last) = self.last_beat {
            if now - last <= refractory {
                return false;
            }
        }

        if bass_env < config.energy_floor {
            return false;
        }

        if flux > self.last_threshold {
            tracing::trace!(
                "Beat at {:.3}s: flux {:.5} > threshold {:.5}",
                now, flux, self.last_threshold
            );
            self.last_beat = Some(now);
            return true;
        }
        false
    }

    /// Threshold computed for the most recent observation
    pub fn last_threshold(&self) -> f32 {
        self.last_threshold
    }

    pub fn last_beat(&self) -> Option<f64> {
        self.last_beat
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for BeatDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    #[test]
    fn test_cold_start_never_fires() {
        let mut detector = BeatDetector::new();
        let config = BeatConfig::default();
        for i in 0..BeatDetector::MIN_HISTORY {
            // Huge flux and full bass, still below the history requirement
            assert!(!detector.process(i as f64, 100.0, 1.0, &config, 2.0));
        }
    }

    #[test]
    fn test_spike_after_steady_history_fires() {
        let mut detector = BeatDetector::new();
        let config = BeatConfig::default();
        for i in 0..20 {
            detector.process(i as f64 * 0.016, 0.01 + (i % 3) as f32 * 0.001, 0.5, &config, 1.0);
        }
        assert!(detector.process(1.0, 0.2, 0.5, &config, 1.0));
    }

    #[test]
    fn test_energy_floor_suppresses_quiet_passages() {
        let mut detector = BeatDetector::new();
        let config = BeatConfig::default();
        for i in 0..20 {
            detector.process(i as f64 * 0.016, 0.01, 0.1, &config, 1.0);
        }
        assert!(!detector.process(1.0, 0.5, 0.1, &config, 1.0));
    }

    #[test]
    fn test_beats_respect_refractory_interval() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut detector = BeatDetector::new();
        let config = BeatConfig::default();
        let refractory = config.refractory_ms / 1000.0;

        let mut beats = Vec::new();
        let mut now = 0.0;
        for _ in 0..5000 {
            now += rng.gen_range(0.001..0.03);
            let flux = if rng.gen_bool(0.2) { rng.gen_range(0.5..2.0) } else { rng.gen_range(0.0..0.1) };
            if detector.process(now, flux, rng.gen_range(0.0..1.0), &config, rng.gen_range(0.0..2.0)) {
                beats.push(now);
            }
        }
        assert!(beats.len() > 10);
        for pair in beats.windows(2) {
            assert!(pair[1] - pair[0] > refractory);
        }
    }
}
