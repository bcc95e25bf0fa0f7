//! # Real-time frame processing
//!
//! The [`SpectralFrameProcessor`] runs inside the host's audio callback. It
//! DC-blocks and mixes the input to mono, windows every 512-sample frame,
//! runs the FFT and derives spectral flux, then hands a [`FrameMessage`] to
//! the main context through a bounded, non-blocking channel.
//!
//! ```rust
//! use spectral_pulse::realtime::{frame_link, SpectralFrameProcessor, FRAME_SIZE};
//!
//! let (rt_side, mut main_side) = frame_link(32);
//! let mut processor = SpectralFrameProcessor::new(rt_side);
//! processor.process_mono(&vec![0.0; FRAME_SIZE]);
//! assert_eq!(main_side.drain(|_| {}), 1);
//! ```

pub mod link;
pub mod processor;

pub use link::{frame_link, FrameMessage, MainEndpoint, ProcessorCommand, RealtimeEndpoint, FRAME_SIZE};
pub use processor::{BaselineState, ProcessorStats, SpectralFrameProcessor};
