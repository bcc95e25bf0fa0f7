use std::f32::consts::PI;

use crate::analyzers::{TimbreAnalyzer, TimbreFeatures, MFCC_COEFFS};

const MEL_FILTERS: usize = 26;
const MEL_MIN_HZ: f32 = 20.0;
const MEL_MAX_HZ: f32 = 8000.0;
const CHROMA_RANGE_HZ: (f32, f32) = (27.5, 5000.0);
const ROLLOFF_FRACTION: f32 = 0.85;
const POWER_FLOOR: f32 = 1e-12;

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular filter as (first bin, weights)
#[derive(Debug, Clone)]
struct MelFilter {
    start: usize,
    weights: Vec<f32>,
}

/// Mel-cepstral, pitch-class and shape descriptors from a magnitude spectrum
///
/// Filterbank and pitch-class lookup are rebuilt only when the spectrum
/// length or bin width changes.
pub struct NativeTimbre {
    layout: Option<(usize, u32)>,
    filters: Vec<MelFilter>,
    pitch_class: Vec<Option<usize>>,
    dct: Vec<[f32; MEL_FILTERS]>,
    mel_energies: [f32; MEL_FILTERS],
}

impl NativeTimbre {
    pub fn new() -> Self {
        let dct = (0..MFCC_COEFFS)
            .map(|k| {
                let mut row = [0.0; MEL_FILTERS];
                for (n, coeff) in row.iter_mut().enumerate() {
                    *coeff = (PI * k as f32 * (n as f32 + 0.5) / MEL_FILTERS as f32).cos();
                }
                row
            })
            .collect();
        Self {
            layout: None,
            filters: Vec::new(),
            pitch_class: Vec::new(),
            dct,
            mel_energies: [0.0; MEL_FILTERS],
        }
    }

    fn rebuild(&mut self, bins: usize, bin_hz: f32) {
        let nyquist = bin_hz * bins as f32;
        let top = MEL_MAX_HZ.min(nyquist);
        let (lo, hi) = (hz_to_mel(MEL_MIN_HZ), hz_to_mel(top));
        let edges: Vec<f32> = (0..MEL_FILTERS + 2)
            .map(|i| mel_to_hz(lo + (hi - lo) * i as f32 / (MEL_FILTERS + 1) as f32) / bin_hz)
            .collect();

        self.filters = edges
            .windows(3)
            .map(|w| {
                let (left, center, right) = (w[0], w[1], w[2]);
                let start = left.floor().max(0.0) as usize;
                let end = (right.ceil() as usize).min(bins.saturating_sub(1));
                let weights = (start..=end)
                    .map(|bin| {
                        let b = bin as f32;
                        if b <= center {
                            ((b - left) / (center - left).max(1e-6)).max(0.0)
                        } else {
                            ((right - b) / (right - center).max(1e-6)).max(0.0)
                        }
                    })
                    .collect();
                MelFilter { start, weights }
            })
            .collect();

        self.pitch_class = (0..bins)
            .map(|bin| {
                let hz = bin as f32 * bin_hz;
                if hz < CHROMA_RANGE_HZ.0 || hz > CHROMA_RANGE_HZ.1 {
                    return None;
                }
                // Pitch class with C = 0
                let semitones_from_a = (12.0 * (hz / 440.0).log2()).round() as i32;
                Some((semitones_from_a + 9).rem_euclid(12) as usize)
            })
            .collect();

        self.layout = Some((bins, bin_hz.to_bits()));
        tracing::debug!("Timbre filterbank rebuilt for {} bins at {:.2} Hz/bin", bins, bin_hz);
    }
}

impl Default for NativeTimbre {
    fn default() -> Self {
        Self::new()
    }
}

impl TimbreAnalyzer for NativeTimbre {
    fn name(&self) -> &str {
        "native-timbre"
    }

    fn analyze(&mut self, magnitudes: &[f32], bin_hz: f32) -> TimbreFeatures {
        if magnitudes.len() < 4 || !(bin_hz > 0.0) {
            return TimbreFeatures::default();
        }
        if self.layout != Some((magnitudes.len(), bin_hz.to_bits())) {
            self.rebuild(magnitudes.len(), bin_hz);
        }

        let clean = |m: f32| if m.is_finite() { m.max(0.0) } else { 0.0 };
        let mut features = TimbreFeatures::default();

        // MFCC
        for (energy, filter) in self.mel_energies.iter_mut().zip(&self.filters) {
            let sum: f32 = filter
                .weights
                .iter()
                .enumerate()
                .filter_map(|(i, w)| magnitudes.get(filter.start + i).map(|&m| clean(m).powi(2) * w))
                .sum();
            *energy = (sum + POWER_FLOOR).ln();
        }
        for (coeff, row) in features.mfcc.iter_mut().zip(&self.dct) {
            *coeff = row.iter().zip(&self.mel_energies).map(|(c, e)| c * e).sum();
        }

        // Chroma, normalized to the strongest class
        for (bin, class) in self.pitch_class.iter().enumerate() {
            if let Some(class) = class {
                features.chroma[*class] += clean(magnitudes[bin]).powi(2);
            }
        }
        let peak = features.chroma.iter().fold(0.0f32, |a, &b| a.max(b));
        if peak > POWER_FLOOR {
            features.chroma.iter_mut().for_each(|c| *c /= peak);
        }

        // Flatness and rolloff skip the DC bin
        let power: Vec<f32> = magnitudes[1..].iter().map(|&m| clean(m).powi(2) + POWER_FLOOR).collect();
        let log_mean = power.iter().map(|p| p.ln()).sum::<f32>() / power.len() as f32;
        let mean = power.iter().sum::<f32>() / power.len() as f32;
        features.flatness = (log_mean.exp() / mean).clamp(0.0, 1.0);

        let total: f32 = magnitudes[1..].iter().map(|&m| clean(m)).sum();
        if total > 0.0 {
            let target = total * ROLLOFF_FRACTION;
            let mut cumulative = 0.0;
            for (i, &m) in magnitudes.iter().enumerate().skip(1) {
                cumulative += clean(m);
                if cumulative >= target {
                    features.rolloff = i as f32 * bin_hz;
                    break;
                }
            }
        }

        features
    }
}
