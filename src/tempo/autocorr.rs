//! Dependency-free autocorrelation tempo estimator.

use crate::tempo::onset_envelope::onset_envelope;

/// Lowest tempo searched by autocorrelation
pub const MIN_BPM: f32 = 60.0;

/// Highest tempo searched by autocorrelation
pub const MAX_BPM: f32 = 200.0;

/// Range native estimates are folded into
pub const MUSICAL_RANGE: (f32, f32) = (80.0, 180.0);

/// Winning lag of the autocorrelation search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutocorrPeak {
    /// Tempo folded into [`MUSICAL_RANGE`]
    pub bpm: f32,
    /// Tempo at the refined lag before folding
    pub raw_bpm: f32,
    /// Refined lag in envelope frames
    pub lag: f32,
    /// Normalized autocorrelation at the winning lag, in [0, 1]
    pub strength: f32,
}

/// Double or halve until `bpm` falls inside `[lo, hi]`
pub fn fold_bpm(bpm: f32, lo: f32, hi: f32) -> f32 {
    if !bpm.is_finite() || bpm <= 0.0 || lo <= 0.0 || hi < lo * 2.0 {
        return bpm;
    }
    let mut bpm = bpm;
    while bpm < lo {
        bpm *= 2.0;
    }
    while bpm > hi {
        bpm /= 2.0;
    }
    bpm
}

/// Estimate tempo from raw mono samples
pub fn estimate_bpm(samples: &[f32], sample_rate: u32) -> Option<AutocorrPeak> {
    let envelope = onset_envelope(samples, sample_rate);
    estimate_from_envelope(&envelope.values, envelope.fps)
}

/// Estimate tempo from an onset envelope sampled at `fps` frames per second.
///
/// Scores each lag in the 60..=200 BPM range as
/// `ac(l) - 0.5 * ac(l / 2) - 0.5 * ac(l / 3)` over the unbiased
/// autocorrelation, so a lag whose half or third is itself periodic loses to
/// that shorter lag. The winner is refined with a parabola through its
/// neighbours when it is not at the edge of the range.
pub fn estimate_from_envelope(envelope: &[f32], fps: f32) -> Option<AutocorrPeak> {
    if !(fps > 0.0) {
        return None;
    }
    let min_lag = ((60.0 * fps / MAX_BPM).ceil() as usize).max(1);
    let max_lag = (60.0 * fps / MIN_BPM).floor() as usize;
    if max_lag <= min_lag || envelope.len() < max_lag * 2 {
        return None;
    }

    let ac = autocorrelation(envelope, max_lag);
    if ac[0] <= 1e-12 {
        return None;
    }

    let scores: Vec<f32> = (min_lag..=max_lag)
        .map(|lag| ac[lag] - 0.5 * ac[lag / 2] - 0.5 * ac[lag / 3])
        .collect();

    let mut best = 0;
    for (i, &score) in scores.iter().enumerate() {
        if score > scores[best] {
            best = i;
        }
    }
    if !(scores[best] > 0.0) {
        return None;
    }

    let mut lag = (min_lag + best) as f32;
    if best > 0 && best + 1 < scores.len() {
        let (y0, y1, y2) = (scores[best - 1], scores[best], scores[best + 1]);
        let denom = y0 - 2.0 * y1 + y2;
        if denom < 0.0 {
            lag += (0.5 * (y0 - y2) / denom).clamp(-0.5, 0.5);
        }
    }

    let raw_bpm = 60.0 * fps / lag;
    let strength = (ac[min_lag + best] / ac[0]).clamp(0.0, 1.0);
    Some(AutocorrPeak {
        bpm: fold_bpm(raw_bpm, MUSICAL_RANGE.0, MUSICAL_RANGE.1),
        raw_bpm,
        lag,
        strength,
    })
}

/// Unbiased autocorrelation for lags `0..=max_lag`
fn autocorrelation(values: &[f32], max_lag: usize) -> Vec<f32> {
    let n = values.len();
    (0..=max_lag)
        .map(|lag| {
            if lag >= n {
                return 0.0;
            }
            let sum: f64 = values[..n - lag]
                .iter()
                .zip(&values[lag..])
                .map(|(&a, &b)| a as f64 * b as f64)
                .sum();
            (sum / (n - lag) as f64) as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tempo::onset_envelope::normalize;
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    fn pulse_train(period: usize, len: usize) -> Vec<f32> {
        let mut values: Vec<f32> = (0..len).map(|i| if i % period == 0 { 1.0 } else { 0.0 }).collect();
        normalize(&mut values);
        values
    }

    #[test]
    fn test_periodic_envelope_matches_expected_bpm() {
        let fps = 44100.0 / 512.0;
        for period in [30, 40, 43, 55, 70] {
            let envelope = pulse_train(period, 3000);
            let peak = estimate_from_envelope(&envelope, fps).unwrap();
            let expected = fold_bpm(60.0 * fps / period as f32, 80.0, 180.0);
            assert!(
                (peak.bpm - expected).abs() < 1.0,
                "period {}: got {} expected {}",
                period, peak.bpm, expected
            );
        }
    }

    #[test]
    fn test_fold_into_musical_range() {
        assert_eq!(fold_bpm(60.0, 80.0, 180.0), 120.0);
        assert_eq!(fold_bpm(240.0, 80.0, 180.0), 120.0);
        assert_eq!(fold_bpm(180.0, 80.0, 180.0), 180.0);
        assert_eq!(fold_bpm(250.0, 60.0, 200.0), 125.0);
    }

    #[test]
    fn test_flat_envelope_has_no_tempo() {
        assert!(estimate_from_envelope(&vec![0.0; 2000], 86.0).is_none());
        assert!(estimate_from_envelope(&[1.0, 0.0, 1.0], 86.0).is_none());
    }

    #[test]
    fn test_click_track_from_samples() {
        let sample_rate = 44100;
        let mut rng = SmallRng::seed_from_u64(11);
        let mut samples: Vec<f32> = (0..sample_rate as usize * 12)
            .map(|_| rng.gen_range(-0.002f32..0.002))
            .collect();
        let beat = (sample_rate as f32 * 60.0 / 124.0) as usize;
        for start in (0..samples.len()).step_by(beat) {
            for (i, s) in samples[start..].iter_mut().take(600).enumerate() {
                *s += (i as f32 * 0.3).sin() * 0.8 * (-(i as f32) / 150.0).exp();
            }
        }

        let peak = estimate_bpm(&samples, sample_rate).unwrap();
        assert!((peak.bpm - 124.0).abs() < 2.0, "bpm {}", peak.bpm);
        assert!(peak.strength > 0.0);
    }
}
