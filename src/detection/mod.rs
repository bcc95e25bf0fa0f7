//! Event detectors fed by the aggregated feature stream.

pub mod beat;
pub mod drop;
pub mod noise_gate;

pub use beat::BeatDetector;
pub use drop::{DownbeatSource, DropBuildDetector, DropBuildState, DropInput, DropOutcome};
pub use noise_gate::{derive_threshold, CalibrationStatus, NoiseGateCalibrator};
