/// Fixed-capacity ring of flux samples with O(1) rolling mean and deviation
///
/// Storage is allocated once in [`FluxRing::new`]; `push` and the statistics
/// never allocate, so the ring is safe to use on the real-time thread.
#[derive(Debug, Clone)]
pub struct FluxRing {
    values: Vec<f32>,
    write: usize,
    len: usize,
    sum: f64,
    sum_sq: f64,
}

impl FluxRing {
    /// Capacity used by the frame processor and beat detector
    pub const DEFAULT_CAPACITY: usize = 64;

    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: vec![0.0; capacity],
            write: 0,
            len: 0,
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    pub fn push(&mut self, value: f32) {
        let value = if value.is_finite() { value } else { 0.0 };
        if self.len == self.values.len() {
            let old = self.values[self.write] as f64;
            self.sum -= old;
            self.sum_sq -= old * old;
        } else {
            self.len += 1;
        }
        self.values[self.write] = value;
        self.sum += value as f64;
        self.sum_sq += (value as f64) * (value as f64);
        self.write = (self.write + 1) % self.values.len();
    }

    pub fn mean(&self) -> f32 {
        if self.len == 0 {
            return 0.0;
        }
        (self.sum / self.len as f64) as f32
    }

    /// Population standard deviation
    pub fn std(&self) -> f32 {
        if self.len == 0 {
            return 0.0;
        }
        let n = self.len as f64;
        let mean = self.sum / n;
        (self.sum_sq / n - mean * mean).max(0.0).sqrt() as f32
    }

    /// Most recently pushed value
    pub fn last(&self) -> Option<f32> {
        if self.len == 0 {
            return None;
        }
        let idx = (self.write + self.values.len() - 1) % self.values.len();
        Some(self.values[idx])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    pub fn clear(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 0.0);
        self.write = 0;
        self.len = 0;
        self.sum = 0.0;
        self.sum_sq = 0.0;
    }
}

impl Default for FluxRing {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl PartialEq for FluxRing {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
            && self.write == other.write
            && self.len == other.len
            && self.sum == other.sum
            && self.sum_sq == other.sum_sq
    }
}
