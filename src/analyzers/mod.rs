//! # External analyzer adapters
//!
//! Narrow interfaces for the collaborators that enrich the feature stream,
//! plus native implementations of each so the pipeline is complete on its
//! own:
//!
//! - [`OnsetAnalyzer`]: pitch, live tempo and an onset pulse per frame
//! - [`TimbreAnalyzer`]: MFCC, chroma, flatness and rolloff per spectrum
//! - [`BeatTracker`]: one BPM figure for a buffer segment
//! - [`GridAnalyzer`]: a full beat grid for a buffer, run off-thread by
//!   [`offline::OfflineAnalysisClient`]
//!
//! Acquisition goes through [`AnalyzerLoader`]: an ordered list of named
//! sources where the first success is cached for the session and an
//! exhausted list disables that analyzer.

pub mod loader;
pub mod offline;
pub mod onset;
pub mod timbre;

use serde::Serialize;

use crate::error::AnalyzerError;

pub use loader::AnalyzerLoader;
pub use offline::{NativeGridAnalyzer, OfflineAnalysisClient, WorkerRequest, WorkerResponse};
pub use onset::NativeOnsetAnalyzer;
pub use timbre::NativeTimbre;

/// Result of one onset-analyzer step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OnsetFrame {
    pub pitch_hz: f32,
    pub pitch_conf: f32,
    pub tempo_bpm: f32,
    pub tempo_conf: f32,
    pub onset: bool,
}

pub trait OnsetAnalyzer: Send {
    fn name(&self) -> &str;

    /// Consume one block of mono samples captured at `now` (seconds)
    fn process(&mut self, samples: &[f32], now: f64) -> OnsetFrame;

    /// Adapt to a new source format; clears all state
    fn configure(&mut self, sample_rate: u32, block_size: usize);

    fn reset(&mut self);
}

pub const MFCC_COEFFS: usize = 13;
pub const CHROMA_BINS: usize = 12;

/// Spectral timbre descriptors
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimbreFeatures {
    pub mfcc: [f32; MFCC_COEFFS],
    pub chroma: [f32; CHROMA_BINS],
    /// Spectral flatness in [0, 1]
    pub flatness: f32,
    /// 85% energy rolloff frequency (Hz)
    pub rolloff: f32,
}

impl Default for TimbreFeatures {
    fn default() -> Self {
        Self {
            mfcc: [0.0; MFCC_COEFFS],
            chroma: [0.0; CHROMA_BINS],
            flatness: 0.0,
            rolloff: 0.0,
        }
    }
}

pub trait TimbreAnalyzer: Send {
    fn name(&self) -> &str;

    fn analyze(&mut self, magnitudes: &[f32], bin_hz: f32) -> TimbreFeatures;
}

/// Tempo for a buffer segment
pub trait BeatTracker: Send + Sync {
    fn name(&self) -> &str;

    fn estimate_bpm(&self, samples: &[f32], sample_rate: u32) -> Result<f32, AnalyzerError>;
}

/// Audio handed to an offline grid analysis
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisPayload {
    pub sample_rate: u32,
    pub duration: f64,
    /// One buffer per channel
    pub channel_data: Vec<Vec<f32>>,
}

impl AnalysisPayload {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        let duration = samples.len() as f64 / sample_rate.max(1) as f64;
        Self {
            sample_rate,
            duration,
            channel_data: vec![samples],
        }
    }

    /// Average of all channels
    pub fn mixdown(&self) -> Vec<f32> {
        match self.channel_data.as_slice() {
            [] => Vec::new(),
            [only] => only.clone(),
            channels => {
                let len = channels.iter().map(Vec::len).min().unwrap_or(0);
                let scale = 1.0 / channels.len() as f32;
                (0..len)
                    .map(|i| channels.iter().map(|c| c[i]).sum::<f32>() * scale)
                    .collect()
            }
        }
    }
}

/// Beat grid produced by a [`GridAnalyzer`]
#[derive(Debug, Clone, PartialEq)]
pub struct GridResult {
    pub bpm: f32,
    pub confidence: f32,
    pub beat_times: Vec<f64>,
    pub downbeats: Vec<f64>,
    /// Integrated loudness estimate (dBFS)
    pub loudness: f32,
}

pub trait GridAnalyzer: Send {
    fn name(&self) -> &str;

    fn analyze(&mut self, payload: &AnalysisPayload) -> Result<GridResult, AnalyzerError>;
}
