use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use spectral_pulse::{
    audio::{AudioData, AudioLoader},
    capture::Pacing,
    engine::{calibrate_noise_gate, CancelToken},
    tempo::{GridPosition, TempoSource},
    Config, FeatureSnapshot, ReactiveEngine,
};

/// Ticks per second of the main-context loop
const TICK_RATE_HZ: f64 = 60.0;

#[derive(Parser)]
#[command(
    name = "spectral-pulse",
    version,
    about = "Real-time beat, drop and tempo extraction for audio-reactive visuals",
    long_about = "Spectral-Pulse analyses a track or a live input and reports band energies, beats, quantized pulses, build/drop events and a confident BPM at display rate."
)]
struct Cli {
    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyse a whole file as fast as possible and print a JSON summary
    Analyze {
        /// Audio file path (WAV, MP3, FLAC, OGG, M4A)
        audio: PathBuf,

        /// Seconds to wait for the beat grid worker
        #[arg(long, default_value_t = 30.0)]
        grid_timeout: f64,
    },

    /// Play a file (or capture the default input) and report events live
    Run {
        /// Audio file to play; omit with --device to capture live input
        audio: Option<PathBuf>,

        /// Capture from the default input device
        #[arg(long)]
        device: bool,

        /// Calibrate the noise gate for this many seconds before reporting
        #[arg(long)]
        calibrate: Option<f64>,

        /// Print every snapshot as one JSON line on stdout
        #[arg(long)]
        json: bool,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<f64>,
    },

    /// Write the default configuration as TOML
    InitConfig {
        /// Output path
        #[arg(default_value = "spectral-pulse.toml")]
        path: PathBuf,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisSummary {
    file: String,
    duration: f64,
    sample_rate: u32,
    bpm: Option<f32>,
    bpm_confidence: Option<f32>,
    bpm_source: Option<TempoSource>,
    beats: usize,
    drops: Vec<f64>,
    grid_bpm: Option<f32>,
    grid_beats: usize,
    downbeats: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    info!("Starting Spectral-Pulse v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            debug!("Using default configuration");
            Config::default()
        }
    };

    match cli.command {
        Command::Analyze { audio, grid_timeout } => analyze(config, &audio, grid_timeout).await,
        Command::Run { audio, device, calibrate, json, duration } => {
            run(config, audio.as_deref(), device, calibrate, json, duration).await
        }
        Command::InitConfig { path } => {
            Config::default().save_to_file(&path)?;
            info!("Default configuration written to {:?}", path);
            Ok(())
        }
    }
}

/// Feed the whole file through the polling path at signal time
async fn analyze(mut config: Config, path: &Path, grid_timeout: f64) -> Result<()> {
    let audio = AudioLoader::load(path)
        .await
        .with_context(|| format!("loading {}", path.display()))?;

    config.engine.sample_rate = audio.sample_rate;
    let mut engine = ReactiveEngine::new(config);
    let estimate = engine.load_buffer(&audio);

    let mono = audio.mono_samples();
    let per_tick = (audio.sample_rate as f64 / TICK_RATE_HZ).round().max(1.0) as usize;
    let mut beats = 0;
    let mut drops = Vec::new();
    for (i, chunk) in mono.chunks(per_tick).enumerate() {
        engine.feed_samples(chunk);
        let now = ((i + 1) * per_tick) as f64 / audio.sample_rate as f64;
        let snapshot = engine.tick(now);
        if snapshot.beat {
            beats += 1;
        }
        if snapshot.drop {
            drops.push(now);
        }
    }

    // The grid arrives from the worker thread; keep ticking until it lands
    let deadline = Instant::now() + Duration::from_secs_f64(grid_timeout.max(0.0));
    let end = audio.duration;
    while engine.beat_grid().is_empty() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.tick(end);
    }
    if engine.beat_grid().is_empty() {
        warn!("Beat grid not ready after {:.0}s", grid_timeout);
    }

    let grid = engine.beat_grid();
    let summary = AnalysisSummary {
        file: path.display().to_string(),
        duration: audio.duration,
        sample_rate: audio.sample_rate,
        bpm: estimate.map(|e| e.bpm),
        bpm_confidence: estimate.map(|e| e.confidence),
        bpm_source: estimate.map(|e| e.source),
        beats,
        drops,
        grid_bpm: (!grid.is_empty()).then_some(grid.bpm),
        grid_beats: grid.beat_times().len(),
        downbeats: grid.downbeats().len(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run(
    config: Config,
    audio: Option<&Path>,
    device: bool,
    calibrate: Option<f64>,
    json: bool,
    duration: Option<f64>,
) -> Result<()> {
    let mut engine = ReactiveEngine::new(config);

    let audio: Option<AudioData> = match audio {
        Some(path) => Some(
            AudioLoader::load(path)
                .await
                .with_context(|| format!("loading {}", path.display()))?,
        ),
        None => None,
    };

    match (&audio, device) {
        (Some(audio), false) => {
            if let Some(estimate) = engine.play_file(audio, Pacing::RealTime)? {
                info!("🎵 Offline tempo {:.1} BPM ({})", estimate.bpm, estimate.source);
            }
        }
        (None, true) => attach_device(&mut engine)?,
        (Some(_), true) => anyhow::bail!("pass either an audio file or --device, not both"),
        (None, false) => anyhow::bail!("nothing to play: pass an audio file or --device"),
    }

    let cancel = CancelToken::new();
    if let Some(seconds) = calibrate {
        let threshold = calibrate_noise_gate(&mut engine, seconds, &cancel).await?;
        info!("Noise gate threshold {:.4}", threshold);
    }

    let started = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / TICK_RATE_HZ));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut beats = 0u64;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }

        let now = started.elapsed().as_secs_f64();
        let snapshot = engine.tick(now);
        if json {
            println!("{}", serde_json::to_string(&snapshot)?);
        }
        report(&snapshot, engine.grid_position(), now, &mut beats);

        let finished = engine.source().map_or(true, |s| !s.is_running());
        if finished || duration.is_some_and(|limit| now >= limit) {
            break;
        }
    }

    engine.detach_source();
    info!(
        "Done: {} beats, {} dropped frames, final tempo {:.1} BPM",
        beats,
        engine.dropped_frames(),
        engine.snapshot().bpm
    );
    Ok(())
}

fn report(snapshot: &FeatureSnapshot, grid: Option<GridPosition>, now: f64, beats: &mut u64) {
    if snapshot.beat {
        *beats += 1;
        debug!(
            "Beat {} at {:.2}s (bass {:.2}, {:.1} BPM)",
            beats, now, snapshot.bands.bass.env, snapshot.bpm
        );
        if let Some(grid) = grid {
            debug!("Grid beat {} drift {:+.1} ms", grid.beat_index, grid.drift_ms);
        }
    }
    if snapshot.drop {
        info!("💥 Drop at {:.2}s", now);
    }
    if snapshot.beat && *beats % 16 == 0 {
        info!(
            "{:.1} BPM ({:.0}%), building {}, build level {:.2}",
            snapshot.bpm,
            snapshot.bpm_confidence * 100.0,
            snapshot.is_building,
            snapshot.build_level
        );
    }
}

#[cfg(feature = "device")]
fn attach_device(engine: &mut ReactiveEngine) -> Result<()> {
    let capture = spectral_pulse::capture::DeviceCapture::open_default()?;
    engine.attach_source(Box::new(capture))?;
    Ok(())
}

#[cfg(not(feature = "device"))]
fn attach_device(_engine: &mut ReactiveEngine) -> Result<()> {
    anyhow::bail!("live capture needs the `device` feature")
}
