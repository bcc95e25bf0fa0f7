use serde::Serialize;

use crate::analyzers::{CHROMA_BINS, MFCC_COEFFS};
use crate::features::BandSnapshot;
use crate::tempo::{BeatGrid, TempoSource};

/// Everything downstream consumers read for one tick
///
/// Serializes with camelCase keys so a bridge can publish it as JSON
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSnapshot {
    pub rms: f32,
    pub rms_norm: f32,
    pub bands: BandSnapshot,
    pub centroid_hz: f32,
    pub centroid_norm: f32,
    pub flux: f32,
    pub flux_mean: f32,
    pub flux_std: f32,

    pub beat: bool,
    /// Synthetic quantization pulse
    pub pulse: bool,
    pub drop: bool,
    pub is_building: bool,
    pub build_level: f32,
    /// Raw bass below the noise gate threshold this tick
    pub gated: bool,

    /// 0 when no tempo is known
    pub bpm: f32,
    pub bpm_confidence: f32,
    pub bpm_source: Option<TempoSource>,
    pub tap_bpm: Option<f32>,

    pub mfcc: [f32; MFCC_COEFFS],
    pub chroma: [f32; CHROMA_BINS],
    pub flatness: f32,
    pub rolloff: f32,

    pub pitch_hz: f32,
    pub pitch_conf: f32,
    pub live_tempo_bpm: f32,
    pub live_tempo_conf: f32,
    pub onset_pulse: bool,

    pub beat_grid: BeatGrid,
    /// Id of the newest real-time frame folded into this snapshot
    pub frame_id: Option<u64>,
}

impl Default for FeatureSnapshot {
    fn default() -> Self {
        Self {
            rms: 0.0,
            rms_norm: 0.0,
            bands: BandSnapshot::default(),
            centroid_hz: 0.0,
            centroid_norm: 0.0,
            flux: 0.0,
            flux_mean: 0.0,
            flux_std: 0.0,
            beat: false,
            pulse: false,
            drop: false,
            is_building: false,
            build_level: 0.0,
            gated: false,
            bpm: 0.0,
            bpm_confidence: 0.0,
            bpm_source: None,
            tap_bpm: None,
            mfcc: [0.0; MFCC_COEFFS],
            chroma: [0.0; CHROMA_BINS],
            flatness: 0.0,
            rolloff: 0.0,
            pitch_hz: 0.0,
            pitch_conf: 0.0,
            live_tempo_bpm: 0.0,
            live_tempo_conf: 0.0,
            onset_pulse: false,
            beat_grid: BeatGrid::empty(),
            frame_id: None,
        }
    }
}
