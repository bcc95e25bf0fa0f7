use serde::Serialize;

/// Precomputed beat and downbeat times for a fixed buffer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatGrid {
    pub bpm: f32,
    pub confidence: f32,
    beat_times: Vec<f64>,
    downbeats: Vec<f64>,
    pub source: String,
    /// Unix time in milliseconds
    pub updated_at: i64,
}

/// Where a time falls on the grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPosition {
    /// Index of the nearest beat
    pub beat_index: usize,
    pub beat_time: f64,
    /// Signed distance from the nearest beat (ms), positive when late
    pub drift_ms: f64,
    /// Position within the enclosing beat interval, in [0, 1)
    pub phase: f64,
}

impl BeatGrid {
    /// Build a grid; beat and downbeat times are sorted, deduplicated and
    /// stripped of non-finite values.
    pub fn new(
        bpm: f32,
        confidence: f32,
        beat_times: Vec<f64>,
        downbeats: Vec<f64>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            bpm,
            confidence: confidence.clamp(0.0, 1.0),
            beat_times: strictly_ascending(beat_times),
            downbeats: strictly_ascending(downbeats),
            source: source.into(),
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn empty() -> Self {
        Self {
            bpm: 0.0,
            confidence: 0.0,
            beat_times: Vec::new(),
            downbeats: Vec::new(),
            source: String::new(),
            updated_at: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.beat_times.is_empty()
    }

    pub fn beat_times(&self) -> &[f64] {
        &self.beat_times
    }

    pub fn downbeats(&self) -> &[f64] {
        &self.downbeats
    }

    /// Seconds per beat, from the grid tempo
    pub fn interval(&self) -> Option<f64> {
        (self.bpm > 0.0 && self.bpm.is_finite()).then(|| 60.0 / self.bpm as f64)
    }

    /// Locate `t` (seconds) relative to the nearest beat
    pub fn quantize(&self, t: f64) -> Option<GridPosition> {
        if self.beat_times.is_empty() || !t.is_finite() {
            return None;
        }
        let beats = &self.beat_times;
        let after = beats.partition_point(|&b| b <= t);

        let beat_index = match after {
            0 => 0,
            n if n == beats.len() => n - 1,
            n if t - beats[n - 1] <= beats[n] - t => n - 1,
            n => n,
        };
        let beat_time = beats[beat_index];

        // Enclosing interval [lo, hi) for the phase; no span known means phase 0
        let bounds = match after {
            0 => beats
                .get(1)
                .map(|b| b - beats[0])
                .or(self.interval())
                .map(|span| (beats[0] - span, beats[0])),
            n if n == beats.len() => self
                .interval()
                .or_else(|| (n >= 2).then(|| beats[n - 1] - beats[n - 2]))
                .map(|span| (beats[n - 1], beats[n - 1] + span)),
            n => Some((beats[n - 1], beats[n])),
        };
        let phase = match bounds {
            Some((lo, hi)) if hi > lo => ((t - lo) / (hi - lo)).rem_euclid(1.0),
            _ => 0.0,
        };

        Some(GridPosition {
            beat_index,
            beat_time,
            drift_ms: (t - beat_time) * 1000.0,
            phase,
        })
    }

    /// Downbeats located within `tolerance` seconds of `t`
    pub fn is_near_downbeat(&self, t: f64, tolerance: f64) -> bool {
        let idx = self.downbeats.partition_point(|&d| d < t);
        [idx.checked_sub(1), Some(idx)]
            .into_iter()
            .flatten()
            .filter_map(|i| self.downbeats.get(i))
            .any(|d| (d - t).abs() <= tolerance)
    }
}

impl Default for BeatGrid {
    fn default() -> Self {
        Self::empty()
    }
}

fn strictly_ascending(mut times: Vec<f64>) -> Vec<f64> {
    times.retain(|t| t.is_finite());
    times.sort_by(|a, b| a.total_cmp(b));
    times.dedup();
    times
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> BeatGrid {
        let beats: Vec<f64> = (0..16).map(|i| 0.25 + i as f64 * 0.5).collect();
        let downbeats = beats.iter().step_by(4).copied().collect();
        BeatGrid::new(120.0, 0.8, beats, downbeats, "native-grid")
    }

    #[test]
    fn test_exact_beat_has_zero_drift() {
        let grid = grid();
        for (i, &t) in grid.beat_times().iter().enumerate() {
            let pos = grid.quantize(t).unwrap();
            assert_eq!(pos.beat_index, i);
            assert_eq!(pos.drift_ms, 0.0);
            assert_eq!(pos.phase, 0.0);
        }
    }

    #[test]
    fn test_drift_and_phase_between_beats() {
        let grid = grid();
        let pos = grid.quantize(0.80).unwrap();
        assert_eq!(pos.beat_index, 1);
        assert!((pos.drift_ms - 50.0).abs() < 1e-6);
        assert!((pos.phase - 0.1).abs() < 1e-9);

        let early = grid.quantize(1.2).unwrap();
        assert_eq!(early.beat_index, 2);
        assert!((early.drift_ms + 50.0).abs() < 1e-6);

        let before = grid.quantize(0.0).unwrap();
        assert_eq!(before.beat_index, 0);
        assert!((before.phase - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_new_sorts_and_dedupes() {
        let grid = BeatGrid::new(
            100.0,
            2.0,
            vec![1.0, f64::NAN, 0.5, 1.0, 0.2],
            vec![],
            "test",
        );
        assert_eq!(grid.beat_times(), &[0.2, 0.5, 1.0]);
        assert_eq!(grid.confidence, 1.0);
        assert!(grid.updated_at > 0);
        assert!(BeatGrid::empty().quantize(1.0).is_none());
    }

    #[test]
    fn test_single_beat_without_tempo() {
        let grid = BeatGrid::new(0.0, 0.5, vec![1.0], vec![1.0], "external");
        let pos = grid.quantize(1.0).unwrap();
        assert_eq!(pos.beat_index, 0);
        assert_eq!(pos.drift_ms, 0.0);
        assert_eq!(pos.phase, 0.0);

        let late = grid.quantize(1.25).unwrap();
        assert!((late.drift_ms - 250.0).abs() < 1e-6);
        assert_eq!(late.phase, 0.0);
    }

    #[test]
    fn test_downbeat_tolerance() {
        let grid = grid();
        assert!(grid.is_near_downbeat(2.3, 0.12));
        assert!(!grid.is_near_downbeat(2.5, 0.12));
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(grid()).unwrap();
        assert!(json.get("beatTimes").is_some());
        assert!(json.get("updatedAt").is_some());
    }
}
