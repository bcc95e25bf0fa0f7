/// One-pole DC blocking filter: `y[n] = x[n] - x[n-1] + alpha * y[n-1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DcBlocker {
    alpha: f32,
    prev_input: f32,
    prev_output: f32,
}

impl DcBlocker {
    pub const DEFAULT_ALPHA: f32 = 0.995;

    pub fn new(alpha: f32) -> Self {
        Self {
            alpha,
            prev_input: 0.0,
            prev_output: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = x - self.prev_input + self.alpha * self.prev_output;
        self.prev_input = x;
        // Flush denormals so a silent input never drags the CPU down
        self.prev_output = if y.abs() < 1e-20 { 0.0 } else { y };
        self.prev_output
    }

    pub fn reset(&mut self) {
        self.prev_input = 0.0;
        self.prev_output = 0.0;
    }
}

impl Default for DcBlocker {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ALPHA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_offset_decays() {
        let mut blocker = DcBlocker::default();
        let mut last = 1.0;
        for _ in 0..5000 {
            last = blocker.process(0.5);
        }
        assert!(last.abs() < 1e-3, "residual DC {}", last);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut blocker = DcBlocker::default();
        blocker.process(1.0);
        blocker.reset();
        assert_eq!(blocker, DcBlocker::default());
    }
}
