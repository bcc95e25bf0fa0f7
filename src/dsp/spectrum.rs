use std::sync::Arc;

use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

use crate::dsp::window::{hann, rms};

/// Main-context polling analyser
///
/// Keeps the most recent `frame_size` mono samples and produces a
/// time-smoothed magnitude spectrum on demand, the way a browser analyser
/// node does. It also keeps an unsmoothed copy so it can derive spectral flux
/// itself when no real-time processor is attached.
pub struct SpectrumAnalyser {
    frame_size: usize,
    sample_rate: u32,
    smoothing: f32,
    fft: Arc<dyn RealToComplex<f32>>,
    history: Vec<f32>,
    write: usize,
    filled: usize,
    window: Vec<f32>,
    input: Vec<f32>,
    output: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    raw: Vec<f32>,
    previous_raw: Vec<f32>,
    smoothed: Vec<f32>,
    flux: f32,
    has_baseline: bool,
}

impl SpectrumAnalyser {
    pub fn new(frame_size: usize, sample_rate: u32, smoothing: f32) -> Self {
        let frame_size = frame_size.max(4).next_power_of_two();
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(frame_size);
        let input = fft.make_input_vec();
        let output = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();
        let bins = frame_size / 2;

        tracing::debug!(
            "SpectrumAnalyser created: frame_size={}, sample_rate={}, smoothing={}",
            frame_size, sample_rate, smoothing
        );

        Self {
            frame_size,
            sample_rate,
            smoothing: smoothing.clamp(0.0, 0.99),
            fft,
            history: vec![0.0; frame_size],
            write: 0,
            filled: 0,
            window: hann(frame_size),
            input,
            output,
            scratch,
            raw: vec![0.0; bins],
            previous_raw: vec![0.0; bins],
            smoothed: vec![0.0; bins],
            flux: 0.0,
            has_baseline: false,
        }
    }

    /// Append mono samples to the analysis history
    pub fn push_samples(&mut self, samples: &[f32]) {
        for &s in samples {
            self.history[self.write] = if s.is_finite() { s } else { 0.0 };
            self.write = (self.write + 1) % self.frame_size;
        }
        self.filled = (self.filled + samples.len()).min(self.frame_size);
    }

    /// Recompute the spectrum over the current history. Returns the smoothed
    /// magnitudes (`frame_size / 2` bins).
    pub fn analyse(&mut self, gain: f32) -> &[f32] {
        for i in 0..self.frame_size {
            let idx = (self.write + i) % self.frame_size;
            self.input[i] = self.history[idx] * gain * self.window[i];
        }

        if self
            .fft
            .process_with_scratch(&mut self.input, &mut self.output, &mut self.scratch)
            .is_err()
        {
            tracing::warn!("Analyser FFT rejected its buffers; keeping previous spectrum");
            return &self.smoothed;
        }

        // A full-scale sine lands close to 1.0 in its peak bin
        let norm = 4.0 / self.frame_size as f32;
        let bins = self.raw.len();
        let mut flux_sum = 0.0f32;
        for i in 0..bins {
            let mag = self.output[i].norm() * norm;
            self.raw[i] = mag;
            if self.has_baseline {
                flux_sum += (mag - self.previous_raw[i]).max(0.0);
            }
            self.previous_raw[i] = mag;
            self.smoothed[i] = self.smoothed[i] * self.smoothing + mag * (1.0 - self.smoothing);
        }
        self.flux = flux_sum / bins as f32;
        self.has_baseline = true;

        &self.smoothed
    }

    /// Flux between the last two `analyse` calls (always >= 0)
    pub fn flux(&self) -> f32 {
        self.flux
    }

    /// RMS of the current history window
    pub fn window_rms(&self) -> f32 {
        rms(&self.history[..])
    }

    pub fn is_primed(&self) -> bool {
        self.filled >= self.frame_size
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Width of one bin in Hz
    pub fn bin_hz(&self) -> f32 {
        self.sample_rate as f32 / self.frame_size as f32
    }

    pub fn set_smoothing(&mut self, smoothing: f32) {
        self.smoothing = smoothing.clamp(0.0, 0.99);
    }

    /// Forget the flux baseline, used when the source changes
    pub fn reset_baseline(&mut self) {
        self.previous_raw.iter_mut().for_each(|v| *v = 0.0);
        self.has_baseline = false;
        self.flux = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: u32, len: usize, amp: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin() * amp)
            .collect()
    }

    #[test]
    fn test_sine_peak_lands_in_expected_bin() {
        let mut analyser = SpectrumAnalyser::new(2048, 44100, 0.0);
        analyser.push_samples(&sine(1000.0, 44100, 2048, 1.0));
        let mags = analyser.analyse(1.0).to_vec();

        let (peak_bin, peak) = mags
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |acc, (i, &m)| if m > acc.1 { (i, m) } else { acc });
        let expected = (1000.0 / analyser.bin_hz()).round() as usize;
        assert!((peak_bin as i64 - expected as i64).abs() <= 1);
        assert!(peak > 0.5 && peak < 1.2, "peak {}", peak);
    }

    #[test]
    fn test_flux_is_never_negative() {
        let mut analyser = SpectrumAnalyser::new(512, 44100, 0.5);
        for amp in [1.0, 0.0, 0.5, 0.0, 1.0] {
            analyser.push_samples(&sine(440.0, 44100, 512, amp));
            analyser.analyse(1.0);
            assert!(analyser.flux() >= 0.0);
        }
    }

    #[test]
    fn test_not_primed_until_full() {
        let mut analyser = SpectrumAnalyser::new(1024, 48000, 0.8);
        analyser.push_samples(&[0.0; 512]);
        assert!(!analyser.is_primed());
        analyser.push_samples(&[0.0; 512]);
        assert!(analyser.is_primed());
    }
}
