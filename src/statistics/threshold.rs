//! Otsu thresholding for fiber-presence and statistic maps.

/// Otsu's method over `num_bins` histogram bins spanning `[min, max]`.
///
/// Returns the bin edge maximizing between-class variance. Empty input
/// returns 0.0; constant input returns that constant.
pub fn otsu_threshold(data: &[f32], num_bins: usize) -> f32 {
    if data.is_empty() || num_bins == 0 {
        return 0.0;
    }

    let min_val = data.iter().fold(f32::MAX, |a, &b| a.min(b));
    let max_val = data.iter().fold(f32::MIN, |a, &b| a.max(b));

    if (max_val - min_val).abs() < 1e-10 {
        return min_val;
    }

    let bin_width = (max_val - min_val) as f64 / num_bins as f64;
    let mut histogram = vec![0usize; num_bins];
    for &v in data {
        let bin = (((v - min_val) as f64) / bin_width).floor() as usize;
        histogram[bin.min(num_bins - 1)] += 1;
    }

    let total = data.len() as f64;
    let sum_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut sum_background = 0.0;
    let mut weight_background = 0.0;
    let mut max_variance = 0.0;
    let mut best_bin = 0;

    for (t, &count) in histogram.iter().enumerate() {
        weight_background += count as f64;
        if weight_background == 0.0 {
            continue;
        }
        let weight_foreground = total - weight_background;
        if weight_foreground == 0.0 {
            break;
        }
        sum_background += t as f64 * count as f64;

        let mean_background = sum_background / weight_background;
        let mean_foreground = (sum_total - sum_background) / weight_foreground;
        let variance =
            weight_background * weight_foreground * (mean_background - mean_foreground).powi(2);

        if variance > max_variance {
            max_variance = variance;
            best_bin = t;
        }
    }

    (min_val as f64 + best_bin as f64 * bin_width) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bimodal_split() {
        let mut data = Vec::new();
        for i in 0..100 {
            data.push(0.1 + 0.2 * (i as f32 / 100.0));
        }
        for i in 0..100 {
            data.push(0.7 + 0.2 * (i as f32 / 100.0));
        }
        let threshold = otsu_threshold(&data, 256);
        assert!(threshold > 0.2 && threshold < 0.8, "threshold {threshold}");
    }

    #[test]
    fn test_empty_and_constant() {
        assert_eq!(otsu_threshold(&[], 256), 0.0);
        assert_eq!(otsu_threshold(&[0.4; 10], 256), 0.4);
    }
}
