use std::collections::VecDeque;

use crate::analyzers::{OnsetAnalyzer, OnsetFrame};
use crate::dsp::window::rms;
use crate::dsp::FluxRing;
use crate::tempo::autocorr::estimate_from_envelope;
use crate::tempo::onset_envelope::normalize;

/// Onset picking, live tempo and monophonic pitch from raw sample blocks
///
/// Onset strength is the positive change in log energy between blocks.
/// An onset fires when it clears both an absolute floor and
/// `mean + 1.5 std` of recent strengths, outside a short refractory window.
/// Tempo is re-estimated once a second by autocorrelating the last 8 s of
/// onset strength. Pitch uses the YIN difference function over the most
/// recent 1024 samples.
pub struct NativeOnsetAnalyzer {
    sample_rate: u32,
    block_rate: f32,
    previous_log_energy: Option<f32>,
    strengths: FluxRing,
    history: VecDeque<f32>,
    history_len: usize,
    blocks_since_tempo: usize,
    last_onset: Option<f64>,
    pitch_window: VecDeque<f32>,
    yin: Vec<f32>,
    tempo: (f32, f32),
    pitch: (f32, f32),
}

impl NativeOnsetAnalyzer {
    const TEMPO_WINDOW_SECONDS: f32 = 8.0;
    const ONSET_REFRACTORY: f64 = 0.1;
    /// Smallest log-energy rise that can count as an onset
    const MIN_STRENGTH: f32 = 0.2;
    const PITCH_WINDOW: usize = 1024;
    const PITCH_RANGE_HZ: (f32, f32) = (70.0, 1000.0);
    const YIN_THRESHOLD: f32 = 0.15;
    const SILENCE_RMS: f32 = 1e-3;

    /// `block_size` is the length of the blocks passed to `process`
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        let block_rate = sample_rate as f32 / block_size.max(1) as f32;
        let history_len = (block_rate * Self::TEMPO_WINDOW_SECONDS) as usize;
        Self {
            sample_rate,
            block_rate,
            previous_log_energy: None,
            strengths: FluxRing::default(),
            history: VecDeque::with_capacity(history_len),
            history_len,
            blocks_since_tempo: 0,
            last_onset: None,
            pitch_window: VecDeque::with_capacity(Self::PITCH_WINDOW),
            yin: vec![0.0; Self::PITCH_WINDOW / 2],
            tempo: (0.0, 0.0),
            pitch: (0.0, 0.0),
        }
    }

    fn onset_strength(&mut self, samples: &[f32]) -> f32 {
        let level = rms(samples);
        let log_energy = (level * level + 1e-10).ln();
        let strength = self
            .previous_log_energy
            .map_or(0.0, |prev| (log_energy - prev).max(0.0));
        self.previous_log_energy = Some(log_energy);
        strength
    }

    fn update_tempo(&mut self) {
        self.blocks_since_tempo += 1;
        if self.blocks_since_tempo < self.block_rate as usize || self.history.len() < self.history_len {
            return;
        }
        self.blocks_since_tempo = 0;

        let mut envelope: Vec<f32> = self.history.iter().copied().collect();
        normalize(&mut envelope);
        self.tempo = match estimate_from_envelope(&envelope, self.block_rate) {
            Some(peak) => (peak.bpm, peak.strength),
            None => (0.0, 0.0),
        };
        tracing::trace!("Live tempo {:.1} BPM ({:.2})", self.tempo.0, self.tempo.1);
    }

    fn update_pitch(&mut self, samples: &[f32]) {
        for &s in samples {
            if self.pitch_window.len() == Self::PITCH_WINDOW {
                self.pitch_window.pop_front();
            }
            self.pitch_window.push_back(s);
        }
        if self.pitch_window.len() < Self::PITCH_WINDOW {
            return;
        }
        let window = self.pitch_window.make_contiguous();
        if rms(window) < Self::SILENCE_RMS {
            self.pitch = (0.0, 0.0);
            return;
        }

        let sr = self.sample_rate as f32;
        let min_tau = (sr / Self::PITCH_RANGE_HZ.1).floor().max(2.0) as usize;
        let max_tau = ((sr / Self::PITCH_RANGE_HZ.0).ceil() as usize).min(self.yin.len() - 1);
        if max_tau <= min_tau {
            self.pitch = (0.0, 0.0);
            return;
        }

        // Cumulative mean normalized difference
        let half = Self::PITCH_WINDOW / 2;
        self.yin[0] = 1.0;
        let mut running = 0.0f32;
        for tau in 1..=max_tau {
            let diff: f32 = (0..half)
                .map(|i| {
                    let d = window[i] - window[i + tau];
                    d * d
                })
                .sum();
            running += diff;
            self.yin[tau] = if running > 0.0 { diff * tau as f32 / running } else { 1.0 };
        }

        let mut tau = min_tau;
        let found = loop {
            if tau > max_tau {
                break None;
            }
            if self.yin[tau] < Self::YIN_THRESHOLD {
                while tau < max_tau && self.yin[tau + 1] < self.yin[tau] {
                    tau += 1;
                }
                break Some(tau);
            }
            tau += 1;
        };

        self.pitch = match found {
            Some(tau) => {
                let refined = if tau > 1 && tau < max_tau {
                    let (y0, y1, y2) = (self.yin[tau - 1], self.yin[tau], self.yin[tau + 1]);
                    let denom = y0 - 2.0 * y1 + y2;
                    if denom.abs() > 1e-9 {
                        tau as f32 + (0.5 * (y0 - y2) / denom).clamp(-0.5, 0.5)
                    } else {
                        tau as f32
                    }
                } else {
                    tau as f32
                };
                (sr / refined, (1.0 - self.yin[tau]).clamp(0.0, 1.0))
            }
            None => (0.0, 0.0),
        };
    }
}

impl OnsetAnalyzer for NativeOnsetAnalyzer {
    fn name(&self) -> &str {
        "native-onset"
    }

    fn process(&mut self, samples: &[f32], now: f64) -> OnsetFrame {
        let strength = self.onset_strength(samples);
        let threshold = self.strengths.mean() + 1.5 * self.strengths.std();
        let warmed_up = self.strengths.len() >= 8;
        self.strengths.push(strength);

        let clear = self
            .last_onset
            .map_or(true, |last| now - last > Self::ONSET_REFRACTORY);
        let onset = warmed_up && clear && strength > threshold && strength > Self::MIN_STRENGTH;
        if onset {
            self.last_onset = Some(now);
        }

        if self.history.len() == self.history_len {
            self.history.pop_front();
        }
        self.history.push_back(strength);
        self.update_tempo();
        self.update_pitch(samples);

        OnsetFrame {
            pitch_hz: self.pitch.0,
            pitch_conf: self.pitch.1,
            tempo_bpm: self.tempo.0,
            tempo_conf: self.tempo.1,
            onset,
        }
    }

    fn configure(&mut self, sample_rate: u32, block_size: usize) {
        *self = Self::new(sample_rate, block_size);
    }

    fn reset(&mut self) {
        self.previous_log_energy = None;
        self.strengths.clear();
        self.history.clear();
        self.blocks_since_tempo = 0;
        self.last_onset = None;
        self.pitch_window.clear();
        self.tempo = (0.0, 0.0);
        self.pitch = (0.0, 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{beat_track, tone};

    #[test]
    fn test_pitch_of_sine() {
        let mut analyzer = NativeOnsetAnalyzer::new(44100, 512);
        let signal = tone(220.0, 0.2, 44100, 0.5);
        let mut last = OnsetFrame::default();
        for (i, block) in signal.chunks(512).enumerate() {
            last = analyzer.process(block, i as f64 * 512.0 / 44100.0);
        }
        assert!((last.pitch_hz - 220.0).abs() < 3.0, "pitch {}", last.pitch_hz);
        assert!(last.pitch_conf > 0.8);
    }

    #[test]
    fn test_live_tempo_and_onsets_from_beat_track() {
        let mut analyzer = NativeOnsetAnalyzer::new(44100, 512);
        let signal = beat_track(120.0, 10.0, 44100, 9);
        let mut onsets = 0;
        let mut last = OnsetFrame::default();
        for (i, block) in signal.chunks_exact(512).enumerate() {
            last = analyzer.process(block, i as f64 * 512.0 / 44100.0);
            if last.onset {
                onsets += 1;
            }
        }
        // 20 beats in 10 s, the first few fall inside the warm-up
        assert!((12..=22).contains(&onsets), "onsets {}", onsets);
        assert!((last.tempo_bpm - 120.0).abs() < 3.0, "tempo {}", last.tempo_bpm);
        assert!(last.tempo_conf > 0.0);
    }

    #[test]
    fn test_silence_reports_nothing() {
        let mut analyzer = NativeOnsetAnalyzer::new(44100, 512);
        let silence = [0.0f32; 512];
        for i in 0..100 {
            let frame = analyzer.process(&silence, i as f64 * 0.0116);
            assert!(!frame.onset);
            assert_eq!(frame.pitch_hz, 0.0);
        }
        analyzer.reset();
        assert_eq!(analyzer.process(&silence, 0.0), OnsetFrame::default());
        analyzer.configure(22050, 256);
        assert_eq!(analyzer.process(&silence[..256], 0.0), OnsetFrame::default());
    }
}
