//! # Tempo
//!
//! Offline and live BPM estimation, manual tap tempo, the synthetic pulse
//! grid and the precomputed beat grid.
//!
//! Offline estimation splits a buffer into weighted segments, runs the
//! native autocorrelation estimator on each (in parallel) alongside any
//! external [`BeatTracker`](crate::analyzers::BeatTracker), and clusters the
//! octave-folded candidates into one BPM with a confidence.

pub mod autocorr;
pub mod cluster;
pub mod estimator;
pub mod grid;
pub mod onset_envelope;
pub mod quantize;
pub mod tap;

pub use cluster::{cluster_candidates, BpmCandidate, TempoEstimate, TempoSource};
pub use estimator::{analysis_segments, AnalysisSegment, LiveBuffer, TempoEstimator};
pub use grid::{BeatGrid, GridPosition};
pub use quantize::QuantizationGrid;
pub use tap::TapTempo;
