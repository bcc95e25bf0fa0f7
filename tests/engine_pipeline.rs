use std::time::{Duration, Instant};

use spectral_pulse::analyzers::{AnalyzerLoader, BeatTracker};
use spectral_pulse::capture::Pacing;
use spectral_pulse::error::AnalyzerError;
use spectral_pulse::synth::{beat_track, to_audio_data};
use spectral_pulse::{Config, ConfigUpdate, ReactiveEngine};
use tempfile::tempdir;

const SR: u32 = 44100;

struct FixedTracker(f32);

impl BeatTracker for FixedTracker {
    fn name(&self) -> &str {
        "fixed"
    }

    fn estimate_bpm(&self, _samples: &[f32], _sample_rate: u32) -> Result<f32, AnalyzerError> {
        Ok(self.0)
    }
}

/// Tick until `done` holds or 30 s pass
fn tick_until(engine: &mut ReactiveEngine, mut done: impl FnMut(&ReactiveEngine) -> bool) {
    let started = Instant::now();
    while !done(engine) {
        assert!(started.elapsed() < Duration::from_secs(30), "timed out");
        std::thread::sleep(Duration::from_millis(10));
        engine.tick(started.elapsed().as_secs_f64());
    }
}

#[test]
fn test_file_playback_yields_tempo_and_grid() {
    let audio = to_audio_data(beat_track(120.0, 12.0, SR, 42), SR, "set.wav");
    // Unpaced playback outruns the ticks, so keep the live tempo out of it
    let mut config = Config::default();
    config.tempo.assist_enabled = false;
    let mut engine = ReactiveEngine::new(config);

    let estimate = engine.play_file(&audio, Pacing::Unpaced).unwrap().unwrap();
    assert!((estimate.bpm - 120.0).abs() < 2.0, "offline bpm {}", estimate.bpm);

    tick_until(&mut engine, |e| !e.beat_grid().is_empty());
    let grid = engine.beat_grid();
    assert!((grid.bpm - 120.0).abs() < 2.0, "grid bpm {}", grid.bpm);
    assert!(!grid.downbeats().is_empty());

    let snapshot = engine.tick(31.0);
    assert!(snapshot.frame_id.is_some());
    assert!((snapshot.bpm - 120.0).abs() < 2.0);
    assert!(snapshot.bpm_source.is_some());
}

#[test]
fn test_new_source_replaces_link() {
    let first = to_audio_data(beat_track(120.0, 4.0, SR, 1), SR, "first.wav");
    let second = to_audio_data(beat_track(100.0, 0.5, SR, 2), SR, "second.wav");
    let mut engine = ReactiveEngine::new(Config::default());

    engine.play_file(&first, Pacing::Unpaced).unwrap();
    tick_until(&mut engine, |e| e.source().is_some_and(|s| !s.is_running()));
    let before = engine.tick(10.0).frame_id.unwrap_or(0);

    engine.play_file(&second, Pacing::Unpaced).unwrap();
    tick_until(&mut engine, |e| e.source().is_some_and(|s| !s.is_running()));
    let after = engine.tick(20.0).frame_id.unwrap();

    // Frame ids restart with the new processor
    assert!(after < before);
    assert_eq!(engine.source().map(|s| s.name()), Some("second.wav"));
}

#[test]
fn test_external_tracker_joins_the_estimate() {
    let audio = to_audio_data(beat_track(120.0, 12.0, SR, 5), SR, "tracked.wav");
    let tracker: Box<dyn BeatTracker> = Box::new(FixedTracker(120.0));
    let mut engine = ReactiveEngine::new(Config::default())
        .with_beat_tracker(AnalyzerLoader::ready("beat-tracker", "fixed", tracker));

    let estimate = engine.load_buffer(&audio).unwrap();
    assert!((estimate.bpm - 120.0).abs() < 2.0);
    assert!(estimate.confidence > 0.4);
}

#[test]
fn test_config_round_trip_through_toml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pulse.toml");

    let mut config = Config::default();
    config.apply(ConfigUpdate::Sensitivity(1.6));
    config.apply(ConfigUpdate::NoiseGate { enabled: true, threshold: 0.05 });
    config.save_to_file(&path).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.engine.sensitivity, 1.6);
    assert!(loaded.noise_gate.enabled);
}

#[test]
fn test_snapshot_publishes_as_json() {
    let mut engine = ReactiveEngine::new(Config::default());
    engine.feed_samples(&beat_track(120.0, 0.5, SR, 9));
    let snapshot = engine.tick(0.5);

    let json = serde_json::to_string(&snapshot).unwrap();
    assert!(json.contains("\"rmsNorm\""));
    assert!(json.contains("\"beatGrid\""));
    assert!(json.contains("\"isBuilding\""));
}
