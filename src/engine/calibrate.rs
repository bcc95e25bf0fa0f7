use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::ConfigUpdate;
use crate::detection::{CalibrationStatus, NoiseGateCalibrator};
use crate::engine::ReactiveEngine;
use crate::error::AnalyzerError;

/// Interval between calibration ticks
pub const CALIBRATION_TICK: Duration = Duration::from_millis(16);

/// Shared flag that aborts a running calibration
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Measure ambient bass for `seconds` and enable the noise gate at the
/// derived threshold.
///
/// The gate is disabled while sampling so ambient ticks are not suppressed.
/// Cancelling restores the previous gate settings and returns
/// [`AnalyzerError::Cancelled`].
pub async fn calibrate_noise_gate(
    engine: &mut ReactiveEngine,
    seconds: f64,
    cancel: &CancelToken,
) -> Result<f32, AnalyzerError> {
    let previous = engine.config().noise_gate.clone();
    engine.update_config(ConfigUpdate::NoiseGate {
        enabled: false,
        threshold: previous.threshold,
    });

    info!("🎚️ Calibrating noise gate for {:.1}s", seconds);
    let mut calibrator = NoiseGateCalibrator::new(seconds);
    let base = engine.last_tick().unwrap_or(0.0);
    let started = tokio::time::Instant::now();

    loop {
        if cancel.is_cancelled() {
            engine.update_config(ConfigUpdate::NoiseGate {
                enabled: previous.enabled,
                threshold: previous.threshold,
            });
            warn!("Noise gate calibration cancelled; previous gate restored");
            return Err(AnalyzerError::Cancelled);
        }

        let now = base + started.elapsed().as_secs_f64();
        let snapshot = engine.tick(now);
        if let CalibrationStatus::Complete { threshold } = calibrator.sample(now, snapshot.bands.bass.raw) {
            engine.update_config(ConfigUpdate::NoiseGate { enabled: true, threshold });
            info!(
                "✅ Noise gate enabled at {:.4} from {} samples",
                threshold,
                calibrator.samples().len()
            );
            return Ok(threshold);
        }

        tokio::time::sleep(CALIBRATION_TICK).await;
    }
}
