use std::collections::VecDeque;

use crate::dsp::stats::{median, median_abs_deviation};

/// Round a tap multiplier to the nearest power of two in [0.25, 4].
/// Non-finite or non-positive input resets it to 1.
pub fn snap_multiplier(multiplier: f32) -> f32 {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return 1.0;
    }
    2f32.powi(multiplier.log2().round().clamp(-2.0, 2.0) as i32)
}

/// Manual tempo from user taps
#[derive(Debug, Clone)]
pub struct TapTempo {
    taps: VecDeque<f64>,
    multiplier: f32,
    bpm: Option<f32>,
}

impl TapTempo {
    /// Taps closer than this to the previous one are ignored (seconds)
    pub const DEBOUNCE: f64 = 0.120;
    /// A longer gap starts a new sequence (seconds)
    pub const RESET_GAP: f64 = 2.0;
    pub const MAX_TAPS: usize = 8;

    pub fn new() -> Self {
        Self {
            taps: VecDeque::with_capacity(Self::MAX_TAPS),
            multiplier: 1.0,
            bpm: None,
        }
    }

    /// Register a tap at `now` (seconds) and return the current tap tempo
    pub fn tap(&mut self, now: f64) -> Option<f32> {
        if let Some(&last) = self.taps.back() {
            let gap = now - last;
            if gap < Self::DEBOUNCE {
                return self.bpm();
            }
            if gap > Self::RESET_GAP {
                tracing::debug!("Tap sequence restarted after {:.2}s gap", gap);
                self.taps.clear();
                self.bpm = None;
            }
        }

        if self.taps.len() == Self::MAX_TAPS {
            self.taps.pop_front();
        }
        self.taps.push_back(now);
        self.bpm = self.base_bpm();
        self.bpm()
    }

    /// Tap tempo with the multiplier applied
    pub fn bpm(&self) -> Option<f32> {
        self.bpm.map(|bpm| bpm * self.multiplier)
    }

    pub fn multiplier(&self) -> f32 {
        self.multiplier
    }

    pub fn set_multiplier(&mut self, multiplier: f32) {
        self.multiplier = snap_multiplier(multiplier);
    }

    pub fn tap_count(&self) -> usize {
        self.taps.len()
    }

    /// Explicit user reset
    pub fn reset(&mut self) {
        self.taps.clear();
        self.bpm = None;
    }

    fn base_bpm(&self) -> Option<f32> {
        let intervals: Vec<f32> = self
            .taps
            .iter()
            .zip(self.taps.iter().skip(1))
            .map(|(a, b)| (b - a) as f32)
            .collect();
        let med = median(&intervals)?;
        let mad = median_abs_deviation(&intervals)?;
        let limit = 3.0 * mad.max(med * 0.01);

        let kept: Vec<f32> = intervals
            .iter()
            .copied()
            .filter(|i| (i - med).abs() <= limit)
            .collect();
        if kept.is_empty() {
            return None;
        }
        let mean = kept.iter().sum::<f32>() / kept.len() as f32;
        (mean > 0.0).then(|| 60.0 / mean)
    }
}

impl Default for TapTempo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steady_taps() {
        let mut tap = TapTempo::new();
        assert_eq!(tap.tap(10.0), None);
        let mut bpm = None;
        for i in 1..6 {
            bpm = tap.tap(10.0 + i as f64 * 0.5);
        }
        assert!((bpm.unwrap() - 120.0).abs() < 0.01);
    }

    #[test]
    fn test_outlier_interval_is_ignored() {
        let mut tap = TapTempo::new();
        let times = [0.0, 0.5, 1.0, 1.5, 2.4, 2.9, 3.4];
        let mut bpm = None;
        for t in times {
            bpm = tap.tap(t);
        }
        assert!((bpm.unwrap() - 120.0).abs() < 0.5, "bpm {:?}", bpm);
    }

    #[test]
    fn test_debounce_and_reset_gap() {
        let mut tap = TapTempo::new();
        tap.tap(0.0);
        tap.tap(0.05);
        assert_eq!(tap.tap_count(), 1);
        tap.tap(0.5);
        assert_eq!(tap.tap_count(), 2);
        tap.tap(3.0);
        assert_eq!(tap.tap_count(), 1);
        assert_eq!(tap.bpm(), None);
    }

    #[test]
    fn test_keeps_at_most_eight_taps() {
        let mut tap = TapTempo::new();
        for i in 0..20 {
            tap.tap(i as f64 * 0.4);
        }
        assert_eq!(tap.tap_count(), TapTempo::MAX_TAPS);
    }

    #[test]
    fn test_multiplier_snaps_to_power_of_two() {
        assert_eq!(snap_multiplier(1.0), 1.0);
        assert_eq!(snap_multiplier(1.9), 2.0);
        assert_eq!(snap_multiplier(0.3), 0.25);
        assert_eq!(snap_multiplier(100.0), 4.0);
        assert_eq!(snap_multiplier(-1.0), 1.0);

        let mut tap = TapTempo::new();
        tap.set_multiplier(2.0);
        tap.tap(0.0);
        let bpm = tap.tap(0.5).unwrap();
        assert!((bpm - 240.0).abs() < 0.01);
    }
}
