use std::f32::consts::PI;

/// Precompute a symmetric Hann window of `len` coefficients
pub fn hann(len: usize) -> Vec<f32> {
    if len < 2 {
        return vec![1.0; len];
    }
    (0..len)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (len - 1) as f32).cos()))
        .collect()
}

/// Root mean square of a block, 0 for an empty block
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_endpoints_and_peak() {
        let w = hann(512);
        assert!(w[0].abs() < 1e-6);
        assert!(w[511].abs() < 1e-6);
        assert!(w.iter().all(|&c| (0.0..=1.0).contains(&c)));
        assert!((w[255] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_rms_of_constant() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[0.5; 64]) - 0.5).abs() < 1e-6);
    }
}
