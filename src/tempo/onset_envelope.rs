//! Log-energy-difference onset envelope for offline tempo estimation.

/// Analysis frame length (samples)
pub const FRAME: usize = 1024;

/// Hop between frames (samples)
pub const HOP: usize = 512;

const ENERGY_FLOOR: f32 = 1e-10;

/// Normalized onset strength sampled once per hop
#[derive(Debug, Clone, PartialEq)]
pub struct OnsetEnvelope {
    pub values: Vec<f32>,
    /// Envelope frames per second (`sample_rate / HOP`)
    pub fps: f32,
}

impl OnsetEnvelope {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn duration(&self) -> f32 {
        if self.fps > 0.0 {
            self.values.len() as f32 / self.fps
        } else {
            0.0
        }
    }
}

/// Build the envelope: per-frame log energy, half-wave rectified first
/// difference, mean removed and scaled to unit peak magnitude.
pub fn onset_envelope(samples: &[f32], sample_rate: u32) -> OnsetEnvelope {
    let fps = sample_rate as f32 / HOP as f32;
    if samples.len() < FRAME {
        return OnsetEnvelope { values: Vec::new(), fps };
    }

    let frames = (samples.len() - FRAME) / HOP + 1;
    let mut previous: Option<f32> = None;
    let mut values = Vec::with_capacity(frames);

    for frame in 0..frames {
        let start = frame * HOP;
        let energy = samples[start..start + FRAME]
            .iter()
            .map(|&s| if s.is_finite() { s * s } else { 0.0 })
            .sum::<f32>()
            / FRAME as f32;
        let log_energy = (energy + ENERGY_FLOOR).ln();
        let rise = previous.map_or(0.0, |p| (log_energy - p).max(0.0));
        values.push(rise);
        previous = Some(log_energy);
    }

    normalize(&mut values);
    OnsetEnvelope { values, fps }
}

/// Remove the mean and scale so the largest magnitude is 1
pub fn normalize(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    values.iter_mut().for_each(|v| *v -= mean);
    let peak = values.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
    if peak > 1e-12 {
        values.iter_mut().for_each(|v| *v /= peak);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_input_is_empty() {
        let env = onset_envelope(&[0.5; FRAME - 1], 44100);
        assert!(env.is_empty());
        assert!((env.fps - 44100.0 / 512.0).abs() < 1e-3);
    }

    #[test]
    fn test_envelope_peaks_at_click() {
        let mut samples = vec![0.001f32; 44100];
        for s in &mut samples[22050..22050 + 441] {
            *s = 0.8;
        }
        let env = onset_envelope(&samples, 44100);
        let (peak_idx, peak) = env
            .values
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
        assert!((peak - 1.0).abs() < 1e-6);
        let peak_time = peak_idx as f32 / env.fps;
        assert!((peak_time - 0.5).abs() < 0.03, "peak at {}", peak_time);
    }
}
