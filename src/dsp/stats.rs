//! Order statistics used by calibration, tap tempo and clustering.

use std::cmp::Ordering;

fn sorted(values: &[f32]) -> Vec<f32> {
    let mut v: Vec<f32> = values.iter().copied().filter(|x| x.is_finite()).collect();
    v.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    v
}

/// Linear-interpolated percentile, `p` in [0, 100]. `None` for no finite input.
pub fn percentile(values: &[f32], p: f32) -> Option<f32> {
    let v = sorted(values);
    if v.is_empty() {
        return None;
    }
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (v.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f32;
    Some(v[lo] + (v[hi] - v[lo]) * frac)
}

pub fn median(values: &[f32]) -> Option<f32> {
    percentile(values, 50.0)
}

/// Median absolute deviation around the median
pub fn median_abs_deviation(values: &[f32]) -> Option<f32> {
    let med = median(values)?;
    let deviations: Vec<f32> = values.iter().map(|v| (v - med).abs()).collect();
    median(&deviations)
}

/// Mean and population standard deviation
pub fn mean_std(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
    (mean, var.max(0.0).sqrt())
}
