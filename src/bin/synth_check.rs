// Sanity check of the whole pipeline on synthetic beat tracks

use std::time::{Duration, Instant};

use spectral_pulse::{
    capture::Pacing,
    synth::{beat_track, noise, to_audio_data},
    Config, ReactiveEngine,
};

const SAMPLE_RATE: u32 = 44100;
const TICK: f64 = 1.0 / 60.0;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    println!("🎵 Spectral-Pulse synthetic pipeline check");

    // 1. Offline tempo and polling-path beats
    println!("\n1. Offline tempo and beats on the polling path...");
    for bpm in [90.0f32, 120.0, 128.0, 174.0] {
        let samples = beat_track(bpm, 12.0, SAMPLE_RATE, bpm as u64);
        let audio = to_audio_data(samples.clone(), SAMPLE_RATE, "synthetic.wav");
        let mut engine = ReactiveEngine::new(Config::default());

        let estimate = engine.load_buffer(&audio);
        let per_tick = (SAMPLE_RATE as f64 * TICK) as usize;
        let mut beats = 0;
        for (i, chunk) in samples.chunks(per_tick).enumerate() {
            engine.feed_samples(chunk);
            if engine.tick((i + 1) as f64 * TICK).beat {
                beats += 1;
            }
        }
        let expected = (12.0 * bpm / 60.0).round() as usize;
        match estimate {
            Some(e) => println!(
                "   {:>5.1} BPM track: estimated {:.1} BPM ({}, {:.0}%), {} of {} beats",
                bpm, e.bpm, e.source, e.confidence * 100.0, beats, expected
            ),
            None => println!("   {:>5.1} BPM track: no estimate, {} of {} beats", bpm, beats, expected),
        }
    }

    // 2. Real-time link with unpaced file playback
    println!("\n2. File playback through the frame processor...");
    let audio = to_audio_data(beat_track(120.0, 8.0, SAMPLE_RATE, 7), SAMPLE_RATE, "link.wav");
    let mut engine = ReactiveEngine::new(Config::default());
    engine.play_file(&audio, Pacing::RealTime)?;
    let started = Instant::now();
    let mut beats = 0;
    let mut last = None;
    while engine.source().is_some_and(|s| s.is_running()) {
        tokio::time::sleep(Duration::from_secs_f64(TICK)).await;
        let snapshot = engine.tick(started.elapsed().as_secs_f64());
        if snapshot.beat {
            beats += 1;
        }
        last = Some(snapshot);
    }
    if let Some(snapshot) = last {
        println!(
            "   ✅ {} beats, last frame {:?}, {:.1} BPM from {:?}, {} dropped frames",
            beats,
            snapshot.frame_id,
            snapshot.bpm,
            snapshot.bpm_source,
            engine.dropped_frames()
        );
    }
    let grid = engine.beat_grid();
    if grid.is_empty() {
        println!("   Beat grid still pending");
    } else {
        println!(
            "   Beat grid: {:.1} BPM, {} beats, {} downbeats",
            grid.bpm,
            grid.beat_times().len(),
            grid.downbeats().len()
        );
    }

    // 3. Noise must not produce a steady stream of beats
    println!("\n3. Beats on plain noise...");
    let mut engine = ReactiveEngine::new(Config::default());
    let samples = noise(8.0, SAMPLE_RATE, 0.05, 3);
    let per_tick = (SAMPLE_RATE as f64 * TICK) as usize;
    let beats = samples
        .chunks(per_tick)
        .enumerate()
        .filter(|(i, chunk)| {
            engine.feed_samples(chunk);
            engine.tick((i + 1) as f64 * TICK).beat
        })
        .count();
    println!("   {} beats in 8s of noise", beats);

    println!("\n🎉 Synthetic check complete");
    Ok(())
}
