//! # Feature engine
//!
//! [`ReactiveEngine`] is the main-context half of the pipeline. Every tick it
//! drains frames from the real-time processor, runs the polling analyser and
//! feature aggregation, then the beat, quantization, drop and tempo stages,
//! and hands back a [`FeatureSnapshot`].
//!
//! ```rust,no_run
//! use spectral_pulse::{Config, ReactiveEngine};
//! use spectral_pulse::audio::AudioLoader;
//! use spectral_pulse::capture::Pacing;
//!
//! # async fn run() -> spectral_pulse::Result<()> {
//! let audio = AudioLoader::load("set.wav").await?;
//! let mut engine = ReactiveEngine::new(Config::default());
//! engine.play_file(&audio, Pacing::RealTime)?;
//!
//! let start = std::time::Instant::now();
//! loop {
//!     let snapshot = engine.tick(start.elapsed().as_secs_f64());
//!     if snapshot.beat {
//!         println!("beat at {:.0} BPM", snapshot.bpm);
//!     }
//!     tokio::time::sleep(std::time::Duration::from_millis(16)).await;
//! }
//! # }
//! ```

pub mod calibrate;
pub mod engine;
pub mod snapshot;

pub use calibrate::{calibrate_noise_gate, CancelToken};
pub use engine::{ReactiveEngine, LINK_CAPACITY};
pub use snapshot::FeatureSnapshot;
