use serde::Serialize;

use crate::config::{AgcConfig, BandConfig, EnvelopeConfig};

/// Rolling-peak automatic gain control
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoGain {
    peak: f32,
}

impl AutoGain {
    const PEAK_FLOOR: f32 = 1e-6;

    pub fn new() -> Self {
        Self { peak: 0.0 }
    }

    /// Track `energy` and return it normalized to [0, 1] against the
    /// decaying peak. A near-zero peak passes the clamped raw value through.
    pub fn normalize(&mut self, energy: f32, decay: f32) -> f32 {
        let energy = if energy.is_finite() { energy.max(0.0) } else { 0.0 };
        self.peak = (self.peak * decay).max(energy);
        if self.peak > Self::PEAK_FLOOR {
            (energy / self.peak).clamp(0.0, 1.0)
        } else {
            energy.clamp(0.0, 1.0)
        }
    }

    pub fn peak(&self) -> f32 {
        self.peak
    }

    pub fn reset(&mut self) {
        self.peak = 0.0;
    }
}

impl Default for AutoGain {
    fn default() -> Self {
        Self::new()
    }
}

/// Attack/release follower
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Envelope {
    value: f32,
}

impl Envelope {
    pub fn update(&mut self, target: f32, attack: f32, release: f32) -> f32 {
        let coeff = if target > self.value { attack } else { release };
        self.value += (target - self.value) * coeff;
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

/// The four analysis bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    Sub,
    Bass,
    Mid,
    Treble,
}

impl Band {
    pub const ALL: [Band; 4] = [Band::Sub, Band::Bass, Band::Mid, Band::Treble];

    fn index(self) -> usize {
        match self {
            Band::Sub => 0,
            Band::Bass => 1,
            Band::Mid => 2,
            Band::Treble => 3,
        }
    }
}

/// Per-band output: raw mean magnitude, AGC-normalized value and envelope
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BandValues {
    pub raw: f32,
    pub norm: f32,
    pub env: f32,
}

/// All four bands, keyed the way downstream consumers expect
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BandSnapshot {
    pub sub: BandValues,
    pub bass: BandValues,
    pub mid: BandValues,
    pub treble: BandValues,
}

impl BandSnapshot {
    pub fn get(&self, band: Band) -> &BandValues {
        match band {
            Band::Sub => &self.sub,
            Band::Bass => &self.bass,
            Band::Mid => &self.mid,
            Band::Treble => &self.treble,
        }
    }

    fn get_mut(&mut self, band: Band) -> &mut BandValues {
        match band {
            Band::Sub => &mut self.sub,
            Band::Bass => &mut self.bass,
            Band::Mid => &mut self.mid,
            Band::Treble => &mut self.treble,
        }
    }
}

/// Inclusive-exclusive bin ranges for each band at a given resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandLayout {
    ranges: [(usize, usize); 4],
}

impl BandLayout {
    /// Map crossovers onto `bins` magnitude bins of width `bin_hz`. Every band
    /// gets at least one bin; bin 0 (DC) is never used.
    pub fn new(config: &BandConfig, bin_hz: f32, bins: usize) -> Self {
        let bins = bins.max(5);
        let to_bin = |hz: f32| ((hz / bin_hz).round() as usize).clamp(1, bins - 1);

        let sub_end = to_bin(config.sub_hz).max(2);
        let bass_end = to_bin(config.bass_hz).max(sub_end + 1);
        let mid_end = to_bin(config.mid_hz).max(bass_end + 1).min(bins - 1);
        let bass_end = bass_end.min(mid_end - 1);
        let sub_end = sub_end.min(bass_end - 1);

        Self {
            ranges: [(1, sub_end), (sub_end, bass_end), (bass_end, mid_end), (mid_end, bins)],
        }
    }

    pub fn range(&self, band: Band) -> (usize, usize) {
        self.ranges[band.index()]
    }
}

/// Band energies with their AGC and envelope state, persisted for the session
#[derive(Debug, Clone, Default)]
pub struct BandEnergySet {
    gains: [AutoGain; 4],
    envelopes: [Envelope; 4],
    current: BandSnapshot,
}

impl BandEnergySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update from a magnitude spectrum and return the new snapshot
    pub fn update(
        &mut self,
        magnitudes: &[f32],
        layout: &BandLayout,
        agc: &AgcConfig,
        envelope: &EnvelopeConfig,
    ) -> BandSnapshot {
        for band in Band::ALL {
            let (start, end) = layout.range(band);
            let end = end.min(magnitudes.len());
            let raw = if end > start {
                magnitudes[start..end].iter().sum::<f32>() / (end - start) as f32
            } else {
                0.0
            };
            let raw = if raw.is_finite() { raw.max(0.0) } else { 0.0 };

            let idx = band.index();
            let norm = if agc.enabled {
                self.gains[idx].normalize(raw, agc.decay)
            } else {
                // Fixed reference: band means of loud material sit around 0.25
                (raw * 4.0).clamp(0.0, 1.0)
            };
            let env = self.envelopes[idx]
                .update(norm, envelope.attack, envelope.release)
                .clamp(0.0, 1.0);

            *self.current.get_mut(band) = BandValues { raw, norm, env };
        }
        self.current
    }

    pub fn current(&self) -> &BandSnapshot {
        &self.current
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
