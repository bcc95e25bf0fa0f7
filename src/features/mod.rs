//! # Feature aggregation
//!
//! Turns a magnitude spectrum into the scalar features every detector reads:
//! four band energies (raw, auto-gained and enveloped), RMS, spectral
//! centroid and its slope, and a bass-restricted flux.

pub mod aggregator;
pub mod bands;

pub use aggregator::{spectral_centroid, AggregatedFeatures, FeatureAggregator};
pub use bands::{AutoGain, Band, BandEnergySet, BandLayout, BandSnapshot, BandValues, Envelope};
