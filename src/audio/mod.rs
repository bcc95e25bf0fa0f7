//! # Audio Files
//!
//! Decoding of whole files into memory for offline tempo estimation, beat
//! grid analysis and file playback.
//!
//! WAV goes through `hound`; MP3, FLAC, OGG and AAC through Symphonia.
//! Samples are normalized to `f32` in `[-1, 1]` and kept interleaved.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use spectral_pulse::audio::AudioLoader;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let audio = AudioLoader::load("song.wav").await?;
//! println!("{} Hz, {} channels, {:.1}s", audio.sample_rate, audio.channels, audio.duration);
//! # Ok(())
//! # }
//! ```

pub mod loader;
pub mod types;

pub use loader::AudioLoader;
pub use types::{AudioData, AudioFormat};
