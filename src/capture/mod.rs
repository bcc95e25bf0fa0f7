//! # Capture sources
//!
//! A capture source owns the [`SpectralFrameProcessor`] once started and
//! drives it from its own thread: decoded file audio for [`FilePlayback`],
//! the host input callback for `DeviceCapture` (cargo feature `device`).
//!
//! Start failures come back as [`CaptureError`] so the caller can keep
//! whatever source it had before.

pub mod file;

#[cfg(feature = "device")]
pub mod device;

use crate::error::CaptureError;
use crate::realtime::SpectralFrameProcessor;

pub use file::{FilePlayback, Pacing, HOST_BLOCK_FRAMES};

#[cfg(feature = "device")]
pub use device::DeviceCapture;

pub trait CaptureSource: Send {
    fn name(&self) -> &str;

    /// Begin feeding `processor`. On error nothing is left running.
    fn start(&mut self, processor: SpectralFrameProcessor) -> Result<(), CaptureError>;

    /// Stop feeding and release the processor. Idempotent.
    fn stop(&mut self);

    /// True for microphones and line inputs, false for file playback
    fn is_live(&self) -> bool;

    fn is_running(&self) -> bool;

    /// Sample rate the processor is being fed at
    fn sample_rate(&self) -> u32;

    /// Playback position in seconds, for sources that have one
    fn position(&self) -> Option<f64> {
        None
    }
}
