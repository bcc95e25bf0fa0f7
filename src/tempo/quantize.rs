/// Phase accumulator emitting synthetic pulses between real beats
#[derive(Debug, Clone, Default)]
pub struct QuantizationGrid {
    /// Zero-phase reference: the last real beat or synthetic grid point
    anchor: Option<f64>,
    /// Accumulated manual nudges (seconds)
    nudge: f64,
    pulses: u64,
}

impl QuantizationGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a pulse when a full `interval` has passed since the last grid
    /// point, shifted by `phase_ms` plus any manual nudge. The first call
    /// only sets the reference.
    pub fn poll(&mut self, now: f64, interval: f64, phase_ms: f64) -> bool {
        if !(interval > 0.0) || !interval.is_finite() {
            return false;
        }
        let Some(anchor) = self.anchor else {
            self.anchor = Some(now);
            return false;
        };

        let offset = phase_ms / 1000.0 + self.nudge;
        let mut next = anchor + interval;
        if now < next + offset {
            return false;
        }
        // Skip grid points missed during a stall and emit a single pulse
        while now >= next + interval + offset {
            next += interval;
        }
        self.anchor = Some(next);
        self.pulses += 1;
        true
    }

    /// Shift the pulse phase by `ms` (positive delays)
    pub fn nudge(&mut self, ms: f64) {
        if ms.is_finite() {
            self.nudge += ms / 1000.0;
        }
    }

    /// Re-sync to zero phase on a detected beat
    pub fn on_real_beat(&mut self, now: f64) {
        self.anchor = Some(now);
        self.nudge = 0.0;
    }

    pub fn pulse_count(&self) -> u64 {
        self.pulses
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(grid: &mut QuantizationGrid, from: f64, to: f64, interval: f64, phase_ms: f64) -> Vec<f64> {
        let mut pulses = Vec::new();
        let mut t = from;
        while t < to {
            if grid.poll(t, interval, phase_ms) {
                pulses.push(t);
            }
            t += 0.001;
        }
        pulses
    }

    #[test]
    fn test_pulses_every_interval() {
        let mut grid = QuantizationGrid::new();
        let pulses = run(&mut grid, 0.0, 2.05, 0.5, 0.0);
        assert_eq!(pulses.len(), 4);
        for (i, t) in pulses.iter().enumerate() {
            assert!((t - 0.5 * (i + 1) as f64).abs() < 0.002);
        }
    }

    #[test]
    fn test_real_beat_resyncs_phase() {
        let mut grid = QuantizationGrid::new();
        grid.poll(0.0, 0.5, 0.0);
        grid.on_real_beat(0.2);
        assert!(!grid.poll(0.5, 0.5, 0.0));
        assert!(grid.poll(0.71, 0.5, 0.0));
    }

    #[test]
    fn test_nudge_and_phase_shift_pulses() {
        let mut grid = QuantizationGrid::new();
        grid.poll(0.0, 0.5, 0.0);
        grid.nudge(50.0);
        assert!(!grid.poll(0.52, 0.5, 20.0));
        assert!(grid.poll(0.571, 0.5, 20.0));
        // Grid points stay on the shifted phase, not drifting further
        assert!(!grid.poll(1.0, 0.5, 20.0));
        assert!(grid.poll(1.071, 0.5, 20.0));
    }

    #[test]
    fn test_stall_emits_one_pulse() {
        let mut grid = QuantizationGrid::new();
        grid.poll(0.0, 0.5, 0.0);
        assert!(grid.poll(2.2, 0.5, 0.0));
        assert!(!grid.poll(2.3, 0.5, 0.0));
        assert!(grid.poll(2.5, 0.5, 0.0));
        assert_eq!(grid.pulse_count(), 2);
    }

    #[test]
    fn test_invalid_interval_never_pulses() {
        let mut grid = QuantizationGrid::new();
        assert!(!grid.poll(0.0, 0.0, 0.0));
        assert!(!grid.poll(5.0, f64::NAN, 0.0));
    }
}
