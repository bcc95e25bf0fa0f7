use crate::dsp::stats::{mean_std, percentile};

/// Progress of a calibration run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationStatus {
    Collecting { elapsed: f64, samples: usize },
    Complete { threshold: f32 },
}

/// Derives a noise-gate threshold from ambient raw bass energy
#[derive(Debug, Clone)]
pub struct NoiseGateCalibrator {
    window: f64,
    started_at: Option<f64>,
    samples: Vec<f32>,
    result: Option<f32>,
}

impl NoiseGateCalibrator {
    pub fn new(window_seconds: f64) -> Self {
        Self {
            window: window_seconds.max(0.0),
            started_at: None,
            samples: Vec::new(),
            result: None,
        }
    }

    /// Record one raw bass energy sample. The first sample at or past the
    /// window end completes the run.
    pub fn sample(&mut self, now: f64, bass_raw: f32) -> CalibrationStatus {
        if let Some(threshold) = self.result {
            return CalibrationStatus::Complete { threshold };
        }

        let started = *self.started_at.get_or_insert(now);
        let elapsed = now - started;
        if bass_raw.is_finite() {
            self.samples.push(bass_raw.max(0.0));
        }

        if elapsed >= self.window {
            let threshold = derive_threshold(&self.samples);
            tracing::info!(
                "Noise gate calibrated from {} samples over {:.1}s: threshold {:.4}",
                self.samples.len(), elapsed, threshold
            );
            self.result = Some(threshold);
            return CalibrationStatus::Complete { threshold };
        }

        CalibrationStatus::Collecting { elapsed, samples: self.samples.len() }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn result(&self) -> Option<f32> {
        self.result
    }
}

/// `max(p90 * 1.25, mean + 2 * std)`, clamped to [0, 1]
pub fn derive_threshold(samples: &[f32]) -> f32 {
    let Some(p90) = percentile(samples, 90.0) else {
        return 0.0;
    };
    let (mean, std) = mean_std(samples);
    (p90 * 1.25).max(mean + 2.0 * std).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    #[test]
    fn test_threshold_covers_ambient_noise() {
        let mut rng = SmallRng::seed_from_u64(5);
        let mut calibrator = NoiseGateCalibrator::new(5.0);
        let mut now = 0.0;
        let threshold = loop {
            let ambient = 0.01 + rng.gen_range(0.0f32..0.004);
            match calibrator.sample(now, ambient) {
                CalibrationStatus::Complete { threshold } => break threshold,
                CalibrationStatus::Collecting { .. } => now += 1.0 / 60.0,
            }
        };

        let p90 = percentile(calibrator.samples(), 90.0).unwrap();
        assert!(threshold >= p90);
        assert!(threshold <= 1.0);
        assert!(now >= 5.0);
    }

    #[test]
    fn test_no_samples_gives_zero() {
        assert_eq!(derive_threshold(&[]), 0.0);
    }

    #[test]
    fn test_loud_ambience_is_clamped() {
        assert_eq!(derive_threshold(&[2.0, 3.0, 4.0]), 1.0);
    }

    #[test]
    fn test_completed_run_is_sticky() {
        let mut calibrator = NoiseGateCalibrator::new(1.0);
        calibrator.sample(0.0, 0.1);
        let done = calibrator.sample(1.0, 0.1);
        assert!(matches!(done, CalibrationStatus::Complete { .. }));
        assert_eq!(calibrator.sample(9.0, 0.9), done);
    }
}
