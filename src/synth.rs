//! Synthetic test signals shared by the tests, benches and `synth_check`.

use std::f32::consts::PI;
use std::path::PathBuf;

use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::audio::types::{AudioData, AudioFormat};

/// A pad with a pronounced kick and click on every beat.
///
/// Each beat starts with a short attack mixing an 80 Hz punch and a 2 kHz
/// click, followed by a brief low sustain. A quiet seeded noise floor is
/// added throughout.
pub fn beat_track(bpm: f32, seconds: f32, sample_rate: u32, seed: u64) -> Vec<f32> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let beat_interval = 60.0 / bpm.max(1.0) as f64;
    let num_samples = (sample_rate as f64 * seconds.max(0.0) as f64) as usize;

    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let pad = (2.0 * PI * 220.0 * t).sin() * 0.1 + (2.0 * PI * 440.0 * t).sin() * 0.05;

            let beat_phase = (i as f64 / sample_rate as f64 % beat_interval) / beat_interval;
            let beat = if beat_phase < 0.05 {
                let attack = 1.0 - beat_phase as f32 * 20.0;
                let punch = (2.0 * PI * 80.0 * t).sin() * 0.6;
                let click = (2.0 * PI * 2000.0 * t).sin() * 0.3 * attack;
                punch * attack + click
            } else if beat_phase < 0.1 {
                let sustain = 0.3 * (1.0 - (beat_phase as f32 - 0.05) * 20.0);
                (2.0 * PI * 80.0 * t).sin() * sustain
            } else {
                0.0
            };

            let noise = rng.gen_range(-0.01f32..0.01);
            (pad + beat + noise).clamp(-1.0, 1.0)
        })
        .collect()
}

/// Uniform noise in `[-amplitude, amplitude]`
pub fn noise(seconds: f32, sample_rate: u32, amplitude: f32, seed: u64) -> Vec<f32> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let amplitude = amplitude.abs().max(f32::MIN_POSITIVE);
    let num_samples = (sample_rate as f64 * seconds.max(0.0) as f64) as usize;
    (0..num_samples).map(|_| rng.gen_range(-amplitude..amplitude)).collect()
}

/// Pure sine
pub fn tone(freq: f32, seconds: f32, sample_rate: u32, amplitude: f32) -> Vec<f32> {
    let num_samples = (sample_rate as f64 * seconds.max(0.0) as f64) as usize;
    (0..num_samples)
        .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin() * amplitude)
        .collect()
}

/// Wrap mono samples as in-memory [`AudioData`]
pub fn to_audio_data(samples: Vec<f32>, sample_rate: u32, name: &str) -> AudioData {
    let duration = samples.len() as f64 / sample_rate.max(1) as f64;
    AudioData {
        samples,
        sample_rate,
        channels: 1,
        duration,
        file_path: PathBuf::from(name),
        format: AudioFormat {
            extension: "wav".to_string(),
            bit_depth: Some(32),
            compression: None,
            bitrate: None,
        },
    }
}
