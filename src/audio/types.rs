use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::analyzers::AnalysisPayload;

/// Decoded audio buffer with metadata
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Audio samples (interleaved for stereo, mono for single channel)
    pub samples: Vec<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Duration in seconds
    pub duration: f64,

    /// Original file path
    pub file_path: PathBuf,

    /// Audio format information
    pub format: AudioFormat,
}

impl AudioData {
    /// Samples for one channel (0-based)
    pub fn channel_samples(&self, channel: usize) -> Vec<f32> {
        if self.channels <= 1 || channel >= self.channels as usize {
            return self.samples.clone();
        }

        self.samples
            .iter()
            .skip(channel)
            .step_by(self.channels as usize)
            .copied()
            .collect()
    }

    /// Mono mix of all channels
    pub fn mono_samples(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }

        self.samples
            .chunks_exact(self.channels as usize)
            .map(|frame| frame.iter().sum::<f32>() / self.channels as f32)
            .collect()
    }

    /// Number of sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Split into per-channel buffers for an offline grid job
    pub fn to_payload(&self) -> AnalysisPayload {
        let channel_data = (0..self.channels.max(1) as usize)
            .map(|ch| self.channel_samples(ch))
            .collect();
        AnalysisPayload {
            sample_rate: self.sample_rate,
            duration: self.duration,
            channel_data,
        }
    }
}

/// Audio file format information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFormat {
    /// File extension (wav, mp3, flac, etc.)
    pub extension: String,

    /// Bit depth (16, 24, 32, etc.)
    pub bit_depth: Option<u16>,

    /// Compression type (if any)
    pub compression: Option<String>,

    /// Bitrate for compressed formats
    pub bitrate: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo(samples: Vec<f32>) -> AudioData {
        AudioData {
            duration: samples.len() as f64 / 2.0 / 44100.0,
            samples,
            sample_rate: 44100,
            channels: 2,
            file_path: PathBuf::from("test.wav"),
            format: AudioFormat {
                extension: "wav".to_string(),
                bit_depth: Some(16),
                compression: None,
                bitrate: None,
            },
        }
    }

    #[test]
    fn test_audio_data_mono_conversion() {
        let audio_data = stereo(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]); // L, R, L, R, L, R
        assert_eq!(audio_data.mono_samples(), vec![1.5, 3.5, 5.5]);
        assert_eq!(audio_data.frames(), 3);
    }

    #[test]
    fn test_payload_splits_channels() {
        let payload = stereo(vec![1.0, -1.0, 0.5, -0.5]).to_payload();
        assert_eq!(payload.channel_data, vec![vec![1.0, 0.5], vec![-1.0, -0.5]]);
        assert_eq!(payload.sample_rate, 44100);
        assert_eq!(payload.mixdown(), vec![0.0, 0.0]);
    }
}
