//! # Spectral-Pulse
//!
//! Real-time audio feature extraction for audio-reactive visuals.
//!
//! A capture source (file playback or a live input device) drives a
//! [`SpectralFrameProcessor`](realtime::SpectralFrameProcessor) on its own
//! thread. The processor emits fixed-size frames with spectral flux to the
//! main context, where the [`ReactiveEngine`] turns them into band energies,
//! beats, quantized pulses, build/drop events and a confident BPM.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spectral_pulse::{audio::AudioLoader, capture::Pacing, Config, ReactiveEngine};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let audio = AudioLoader::load("track.flac").await?;
//! let mut engine = ReactiveEngine::new(Config::default());
//! let tempo = engine.play_file(&audio, Pacing::RealTime)?;
//! println!("offline tempo: {:?}", tempo.map(|t| t.bpm));
//!
//! let mut ticker = tokio::time::interval(std::time::Duration::from_millis(16));
//! let start = std::time::Instant::now();
//! loop {
//!     ticker.tick().await;
//!     let snapshot = engine.tick(start.elapsed().as_secs_f64());
//!     if snapshot.drop {
//!         println!("drop!");
//!     }
//! }
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`realtime`] - allocation-free frame processor and its channel link
//! - [`capture`] - file playback and live device sources
//! - [`dsp`] - windowing, FFT analyser, flux statistics
//! - [`features`] - band energies, adaptive gain, envelopes, centroid
//! - [`detection`] - beats, build/drop, noise gate calibration
//! - [`tempo`] - offline and live BPM, tap tempo, quantization, beat grids
//! - [`analyzers`] - pluggable onset, timbre, beat-tracker and grid analyzers
//! - [`engine`] - the per-tick pipeline and [`FeatureSnapshot`]
//! - [`config`] - TOML configuration and runtime updates

pub mod analyzers;
pub mod audio;
pub mod capture;
pub mod config;
pub mod detection;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod features;
pub mod realtime;
pub mod synth;
pub mod tempo;

// Re-export commonly used types for convenience
pub use crate::{
    config::{Config, ConfigUpdate},
    engine::{FeatureSnapshot, ReactiveEngine},
    error::{PulseError, Result},
};
