use crate::config::Config;
use crate::dsp::FluxRing;
use crate::features::bands::{AutoGain, Band, BandEnergySet, BandLayout, BandSnapshot};

/// Ceiling used to normalize the spectral centroid
pub const CENTROID_CEILING_HZ: f32 = 8000.0;

/// Merged scalar features for one tick, consumed by every detector
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregatedFeatures {
    pub rms: f32,
    pub rms_norm: f32,
    pub bands: BandSnapshot,
    pub centroid_hz: f32,
    pub centroid_norm: f32,
    /// EMA of the frame-to-frame change of `centroid_norm`
    pub centroid_slope: f32,
    /// Positive magnitude change restricted to the sub and bass bins
    pub bass_flux: f32,
    pub bass_flux_mean: f32,
    pub bass_flux_std: f32,
}

/// Band decomposition, adaptive gain, envelopes and spectral centroid
pub struct FeatureAggregator {
    layout: BandLayout,
    layout_key: (usize, u32, [u32; 3]),
    bands: BandEnergySet,
    rms_gain: AutoGain,
    previous_centroid: Option<f32>,
    centroid_slope: f32,
    slope_alpha: f32,
    previous_bass: Vec<f32>,
    bass_flux_ring: FluxRing,
    latest: AggregatedFeatures,
}

impl FeatureAggregator {
    /// EMA coefficient for the centroid slope
    pub const DEFAULT_SLOPE_ALPHA: f32 = 0.2;

    pub fn new() -> Self {
        Self {
            layout: BandLayout::new(&Default::default(), 44100.0 / 2048.0, 1024),
            layout_key: (0, 0, [0; 3]),
            bands: BandEnergySet::new(),
            rms_gain: AutoGain::new(),
            previous_centroid: None,
            centroid_slope: 0.0,
            slope_alpha: Self::DEFAULT_SLOPE_ALPHA,
            previous_bass: Vec::new(),
            bass_flux_ring: FluxRing::default(),
            latest: AggregatedFeatures::default(),
        }
    }

    /// Fold one magnitude spectrum and the current RMS into the feature set
    pub fn update(
        &mut self,
        magnitudes: &[f32],
        bin_hz: f32,
        rms: f32,
        config: &Config,
    ) -> AggregatedFeatures {
        self.refresh_layout(config, bin_hz, magnitudes.len());

        let bands = self
            .bands
            .update(magnitudes, &self.layout, &config.agc, &config.envelope);

        let rms = if rms.is_finite() { rms.max(0.0) } else { 0.0 };
        let rms_norm = if config.agc.enabled {
            self.rms_gain.normalize(rms, config.agc.decay)
        } else {
            rms.clamp(0.0, 1.0)
        };

        let centroid_hz = spectral_centroid(magnitudes, bin_hz);
        let centroid_norm = (centroid_hz / CENTROID_CEILING_HZ).clamp(0.0, 1.0);
        if let Some(prev) = self.previous_centroid {
            let delta = centroid_norm - prev;
            self.centroid_slope += (delta - self.centroid_slope) * self.slope_alpha;
        }
        self.previous_centroid = Some(centroid_norm);

        let bass_flux = self.bass_flux(magnitudes);

        self.latest = AggregatedFeatures {
            rms,
            rms_norm,
            bands,
            centroid_hz,
            centroid_norm,
            centroid_slope: self.centroid_slope,
            bass_flux,
            bass_flux_mean: self.bass_flux_ring.mean(),
            bass_flux_std: self.bass_flux_ring.std(),
        };
        self.latest
    }

    pub fn latest(&self) -> &AggregatedFeatures {
        &self.latest
    }

    /// Forget centroid and bass-flux baselines, e.g. on a source change.
    /// Gains and envelopes persist for the session.
    pub fn reset_baselines(&mut self) {
        self.previous_centroid = None;
        self.centroid_slope = 0.0;
        self.previous_bass.clear();
        self.bass_flux_ring.clear();
    }

    fn refresh_layout(&mut self, config: &Config, bin_hz: f32, bins: usize) {
        let key = (
            bins,
            bin_hz.to_bits(),
            [
                config.bands.sub_hz.to_bits(),
                config.bands.bass_hz.to_bits(),
                config.bands.mid_hz.to_bits(),
            ],
        );
        if key != self.layout_key {
            self.layout = BandLayout::new(&config.bands, bin_hz, bins);
            self.layout_key = key;
            self.previous_bass.clear();
            tracing::debug!("Band layout rebuilt for {} bins at {:.2} Hz/bin", bins, bin_hz);
        }
    }

    fn bass_flux(&mut self, magnitudes: &[f32]) -> f32 {
        let (start, _) = self.layout.range(Band::Sub);
        let (_, end) = self.layout.range(Band::Bass);
        let end = end.min(magnitudes.len());
        if end <= start {
            return 0.0;
        }
        let current = &magnitudes[start..end];

        let flux = if self.previous_bass.len() == current.len() {
            let sum: f32 = current
                .iter()
                .zip(self.previous_bass.iter())
                .map(|(&c, &p)| (c - p).max(0.0))
                .sum();
            let flux = sum / current.len() as f32;
            self.bass_flux_ring.push(flux);
            flux
        } else {
            0.0
        };
        self.previous_bass.clear();
        self.previous_bass.extend_from_slice(current);
        flux
    }
}

impl Default for FeatureAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Magnitude-weighted mean frequency, 0 for a silent spectrum
pub fn spectral_centroid(magnitudes: &[f32], bin_hz: f32) -> f32 {
    let (weighted, total) = magnitudes
        .iter()
        .enumerate()
        .fold((0.0f64, 0.0f64), |(w, t), (i, &m)| {
            let m = if m.is_finite() { m.max(0.0) as f64 } else { 0.0 };
            (w + m * i as f64 * bin_hz as f64, t + m)
        });
    if total > 1e-12 {
        (weighted / total) as f32
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spike_at(bin: usize, bins: usize) -> Vec<f32> {
        let mut mags = vec![0.0; bins];
        mags[bin] = 1.0;
        mags
    }

    #[test]
    fn test_centroid_of_single_bin() {
        let bin_hz = 44100.0 / 2048.0;
        let mags = spike_at(100, 1024);
        assert!((spectral_centroid(&mags, bin_hz) - 100.0 * bin_hz).abs() < 1e-2);
        assert_eq!(spectral_centroid(&vec![0.0; 1024], bin_hz), 0.0);
    }

    #[test]
    fn test_centroid_slope_goes_negative_when_brightness_falls() {
        let config = Config::default();
        let bin_hz = 44100.0 / 2048.0;
        let mut agg = FeatureAggregator::new();
        agg.update(&spike_at(300, 1024), bin_hz, 0.1, &config);
        let mut features = AggregatedFeatures::default();
        for bin in (20..300).rev().step_by(20) {
            features = agg.update(&spike_at(bin, 1024), bin_hz, 0.1, &config);
        }
        assert!(features.centroid_slope < 0.0);
        assert!(features.centroid_norm <= 1.0);
    }

    #[test]
    fn test_bass_flux_reacts_to_low_end_only() {
        let config = Config::default();
        let bin_hz = 44100.0 / 2048.0;
        let mut agg = FeatureAggregator::new();
        agg.update(&vec![0.0; 1024], bin_hz, 0.0, &config);
        let treble_only = agg.update(&spike_at(600, 1024), bin_hz, 0.0, &config);
        assert_eq!(treble_only.bass_flux, 0.0);
        let kick = agg.update(&spike_at(5, 1024), bin_hz, 0.0, &config);
        assert!(kick.bass_flux > 0.0);
    }

    #[test]
    fn test_rms_norm_in_unit_range() {
        let config = Config::default();
        let mut agg = FeatureAggregator::new();
        for rms in [0.0, 0.9, f32::NAN, 0.1, 5.0] {
            let f = agg.update(&vec![0.01; 256], 100.0, rms, &config);
            assert!((0.0..=1.0).contains(&f.rms_norm));
        }
    }
}
