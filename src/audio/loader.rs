use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::types::{AudioData, AudioFormat};
use crate::error::{AudioError, PulseError, Result};

/// Audio file loader supporting multiple formats
pub struct AudioLoader;

impl AudioLoader {
    /// Decode a file on the blocking pool
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<AudioData> {
        let path = path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || Self::load_sync(&path))
            .await
            .map_err(|e| PulseError::generic(format!("decoder task failed: {}", e)))?
    }

    /// Decode a file on the calling thread
    pub fn load_sync<P: AsRef<Path>>(path: P) -> Result<AudioData> {
        let path = path.as_ref();
        let extension = Self::detect_format(path).unwrap_or_default();

        let audio = match extension.as_str() {
            "wav" => Self::load_wav(path)?,
            "mp3" | "flac" | "ogg" | "m4a" | "aac" => Self::load_with_symphonia(path)?,
            _ => return Err(AudioError::UnsupportedFormat { format: extension }.into()),
        };

        tracing::info!(
            "Loaded {}: {} Hz, {} ch, {:.2}s",
            path.display(),
            audio.sample_rate,
            audio.channels,
            audio.duration
        );
        Ok(audio)
    }

    /// WAV through hound
    fn load_wav(path: &Path) -> Result<AudioData> {
        let failed = || AudioError::LoadFailed { path: path.display().to_string() };
        let reader = hound::WavReader::open(path).map_err(|_| failed())?;

        let spec = reader.spec();
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(AudioError::InvalidParameters {
                details: format!("{} channels at {} Hz", spec.channels, spec.sample_rate),
            }
            .into());
        }

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|_| failed())?,
            hound::SampleFormat::Int => {
                let bit_depth = spec.bits_per_sample;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|s| Self::int_to_float(s, bit_depth)))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|_| failed())?
            }
        };

        Ok(Self::assemble(
            samples,
            spec.sample_rate,
            spec.channels,
            path,
            AudioFormat {
                extension: "wav".to_string(),
                bit_depth: Some(spec.bits_per_sample),
                compression: None,
                bitrate: None,
            },
        ))
    }

    /// Compressed formats through Symphonia
    fn load_with_symphonia(path: &Path) -> Result<AudioData> {
        let failed = || AudioError::LoadFailed { path: path.display().to_string() };
        let file = File::open(path).map_err(|_| failed())?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|_| failed())?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(failed)?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params.sample_rate.ok_or_else(|| AudioError::InvalidParameters {
            details: "No sample rate found".to_string(),
        })?;
        let channels = codec_params
            .channels
            .ok_or_else(|| AudioError::InvalidParameters {
                details: "No channel information found".to_string(),
            })?
            .count() as u16;

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|_| failed())?;

        let mut samples = Vec::new();
        let mut buffer: Option<SampleBuffer<f32>> = None;
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                // End of stream
                Err(_) => break,
            };
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let needed = decoded.capacity() * decoded.spec().channels.count();
                    if buffer.as_ref().map_or(true, |b| b.capacity() < needed) {
                        buffer = Some(SampleBuffer::new(decoded.capacity() as u64, *decoded.spec()));
                    }
                    if let Some(buf) = buffer.as_mut() {
                        buf.copy_interleaved_ref(decoded);
                        samples.extend_from_slice(buf.samples());
                    }
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::debug!("Skipping undecodable packet: {}", e);
                }
                Err(_) => break,
            }
        }

        Ok(Self::assemble(
            samples,
            sample_rate,
            channels,
            path,
            AudioFormat {
                extension: Self::detect_format(path).unwrap_or_else(|| "unknown".to_string()),
                bit_depth: codec_params.bits_per_sample.map(|b| b as u16),
                compression: Some(format!("{:?}", codec_params.codec)),
                bitrate: None,
            },
        ))
    }

    fn assemble(samples: Vec<f32>, sample_rate: u32, channels: u16, path: &Path, format: AudioFormat) -> AudioData {
        let duration = samples.len() as f64 / (sample_rate as f64 * channels.max(1) as f64);
        AudioData {
            samples,
            sample_rate,
            channels,
            duration,
            file_path: PathBuf::from(path),
            format,
        }
    }

    /// Integer sample to float in [-1, 1]
    fn int_to_float(sample: i32, bit_depth: u16) -> f32 {
        match bit_depth {
            8 => (sample as f32 - 128.0) / 128.0,
            16 => sample as f32 / 32768.0,
            24 => sample as f32 / 8388608.0,
            32 => sample as f32 / 2147483648.0,
            _ => sample as f32 / 32768.0,
        }
    }

    /// Write mono or interleaved samples as 32-bit float WAV
    pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32, channels: u16) -> Result<()> {
        let path = path.as_ref();
        let failed = |_| AudioError::LoadFailed { path: path.display().to_string() };
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec).map_err(failed)?;
        for &s in samples {
            writer.write_sample(s).map_err(failed)?;
        }
        writer.finalize().map_err(failed)?;
        Ok(())
    }

    /// Lower-cased file extension
    pub fn detect_format<P: AsRef<Path>>(path: P) -> Option<String> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
    }

    pub fn is_format_supported(extension: &str) -> bool {
        matches!(
            extension.to_lowercase().as_str(),
            "wav" | "mp3" | "flac" | "ogg" | "m4a" | "aac"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_format_detection() {
        assert_eq!(AudioLoader::detect_format("test.wav"), Some("wav".to_string()));
        assert_eq!(AudioLoader::detect_format("test.MP3"), Some("mp3".to_string()));
        assert_eq!(AudioLoader::detect_format("test"), None);
        assert!(AudioLoader::is_format_supported("FLAC"));
        assert!(!AudioLoader::is_format_supported("xyz"));
    }

    #[test]
    fn test_int_to_float_conversion() {
        assert_eq!(AudioLoader::int_to_float(0, 16), 0.0);
        assert_eq!(AudioLoader::int_to_float(-32768, 16), -1.0);
        assert_eq!(AudioLoader::int_to_float(128, 8), 0.0);
        assert_eq!(AudioLoader::int_to_float(0, 8), -1.0);
    }

    #[tokio::test]
    async fn test_wav_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let samples = [0.5f32, -0.5, 0.25, -0.25];
        AudioLoader::write_wav(&path, &samples, 8000, 2).unwrap();

        let audio = AudioLoader::load(&path).await.unwrap();
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.samples, samples.to_vec());
        assert_eq!(audio.mono_samples(), vec![0.0, 0.0]);
        assert!((audio.duration - 2.0 / 8000.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_unsupported_format() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.xyz");
        let mut file = File::create(&file_path).unwrap();
        file.write_all(b"dummy content").unwrap();

        match AudioLoader::load(&file_path).await {
            Err(PulseError::Audio(AudioError::UnsupportedFormat { format })) => assert_eq!(format, "xyz"),
            other => panic!("Expected UnsupportedFormat error, got {:?}", other.map(|a| a.duration)),
        }
    }
}
