//! # DSP building blocks
//!
//! Small allocation-free primitives shared by the real-time frame processor
//! and the main-context analysis path.

pub mod dc_blocker;
pub mod flux_ring;
pub mod spectrum;
pub mod stats;
pub mod window;

pub use dc_blocker::DcBlocker;
pub use flux_ring::FluxRing;
pub use spectrum::SpectrumAnalyser;
