//! Descriptive statistics over per-voxel subject samples.
//!
//! These run once per voxel per iteration, so they work on borrowed slices
//! and never allocate.

/// Arithmetic mean. Returns 0.0 for an empty slice.
#[inline]
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Unbiased sample variance. Returns 0.0 for fewer than two samples.
///
/// Two-pass form: the mean is subtracted before squaring, which keeps
/// precision for QA-like values that sit far from zero.
pub fn sample_variance(data: &[f64]) -> f64 {
    let n = data.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(data);
    let ss: f64 = data.iter().map(|&x| (x - m) * (x - m)).sum();
    ss / (n - 1) as f64
}

/// Sample standard deviation.
#[inline]
pub fn std_dev(data: &[f64]) -> f64 {
    sample_variance(data).sqrt()
}

/// Same as [`std_dev`] for `f32` volumes, accumulated in `f64`.
pub fn std_dev_f32(data: &[f32]) -> f64 {
    let n = data.len();
    if n < 2 {
        return 0.0;
    }
    let m = data.iter().map(|&x| x as f64).sum::<f64>() / n as f64;
    let ss: f64 = data
        .iter()
        .map(|&x| {
            let d = x as f64 - m;
            d * d
        })
        .sum();
    (ss / (n - 1) as f64).sqrt()
}

/// Summary of one group at one voxel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GroupSummary {
    /// Number of samples.
    pub n: usize,
    /// Mean.
    pub mean: f64,
    /// Unbiased variance.
    pub variance: f64,
}

impl GroupSummary {
    /// Summarize a slice.
    pub fn of(data: &[f64]) -> Self {
        Self {
            n: data.len(),
            mean: mean(data),
            variance: sample_variance(data),
        }
    }
}

/// Welch two-sample t statistic of `a - b`.
///
/// Returns 0.0 when either group is empty or the pooled standard error
/// vanishes, so degenerate voxels produce an empty map entry rather than
/// an infinity.
pub fn welch_t(a: &GroupSummary, b: &GroupSummary) -> f64 {
    if a.n == 0 || b.n == 0 {
        return 0.0;
    }
    let se2 = a.variance / a.n as f64 + b.variance / b.n as f64;
    if se2 <= 0.0 {
        return 0.0;
    }
    (a.mean - b.mean) / se2.sqrt()
}

/// One-sample t statistic of the mean of `d` against zero.
pub fn one_sample_t(d: &GroupSummary) -> f64 {
    if d.n < 2 || d.variance <= 0.0 {
        return 0.0;
    }
    d.mean / (d.variance / d.n as f64).sqrt()
}

/// `numerator / denominator`, or 0.0 when the denominator is zero or the
/// result is not finite.
#[inline]
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let r = numerator / denominator;
    if r.is_finite() {
        r
    } else {
        0.0
    }
}
