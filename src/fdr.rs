//! False discovery rate by tract length.

use serde::{Deserialize, Serialize};

use crate::histogram::{Histograms, LengthHistogram};
use crate::types::Direction;

/// FDR for "tracks at least this long", per length bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FdrCurve {
    /// Greater-map FDR per length.
    pub greater: Vec<f64>,
    /// Lesser-map FDR per length.
    pub lesser: Vec<f64>,
}

impl FdrCurve {
    /// Compute both curves from a histogram snapshot.
    pub fn compute(histograms: &Histograms) -> Self {
        Self {
            greater: curve(&histograms.greater, &histograms.null_greater),
            lesser: curve(&histograms.lesser, &histograms.null_lesser),
        }
    }

    /// Curve for one direction.
    pub fn get(&self, direction: Direction) -> &[f64] {
        match direction {
            Direction::Greater => &self.greater,
            Direction::Lesser => &self.lesser,
        }
    }

    /// FDR at `length`, 1.0 past the last bin.
    pub fn at(&self, direction: Direction, length: usize) -> f64 {
        self.get(direction).get(length).copied().unwrap_or(1.0)
    }
}

/// Walk from the longest bin down, accumulating observed and null counts.
fn curve(observed: &LengthHistogram, null: &LengthHistogram) -> Vec<f64> {
    let (observed, null) = (observed.bins(), null.bins());
    let mut fdr = vec![1.0; observed.len()];
    let (mut sum_observed, mut sum_null) = (0u64, 0u64);
    for len in (0..observed.len()).rev() {
        sum_observed += observed[len];
        sum_null += null.get(len).copied().unwrap_or(0);
        if sum_observed > 0 && sum_null > 0 {
            fdr[len] = (sum_null as f64 / sum_observed as f64).min(1.0);
        }
    }
    fdr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_TRACT_LENGTH;
    use proptest::prelude::*;

    fn histogram(entries: &[(usize, u64)]) -> LengthHistogram {
        let mut bins = vec![0; MAX_TRACT_LENGTH];
        for &(len, count) in entries {
            bins[len] = count;
        }
        LengthHistogram::from_bins(bins)
    }

    #[test]
    fn test_empty_histograms_give_one() {
        let fdr = FdrCurve::compute(&Histograms::default());
        assert!(fdr.greater.iter().chain(&fdr.lesser).all(|&v| v == 1.0));
        assert_eq!(fdr.greater.len(), MAX_TRACT_LENGTH);
    }

    #[test]
    fn test_suffix_ratio() {
        let h = Histograms {
            greater: histogram(&[(10, 8), (40, 2)]),
            null_greater: histogram(&[(10, 1), (40, 1)]),
            ..Histograms::default()
        };
        let fdr = FdrCurve::compute(&h);
        // At 40 and above: null 1, observed 2.
        assert_eq!(fdr.at(Direction::Greater, 40), 0.5);
        // At 10 and above: null 2, observed 10.
        assert!((fdr.at(Direction::Greater, 10) - 0.2).abs() < 1e-12);
        assert!((fdr.at(Direction::Greater, 0) - 0.2).abs() < 1e-12);
        // No counts above 40.
        assert_eq!(fdr.at(Direction::Greater, 41), 1.0);
        assert_eq!(fdr.at(Direction::Lesser, 10), 1.0);
        assert_eq!(fdr.at(Direction::Greater, 10_000), 1.0);
    }

    #[test]
    fn test_more_null_than_observed_caps_at_one() {
        let h = Histograms {
            lesser: histogram(&[(5, 1)]),
            null_lesser: histogram(&[(5, 9)]),
            ..Histograms::default()
        };
        assert_eq!(FdrCurve::compute(&h).at(Direction::Lesser, 5), 1.0);
    }

    proptest! {
        #[test]
        fn prop_fdr_within_unit_interval(
            observed in proptest::collection::vec(0u64..50, MAX_TRACT_LENGTH),
            null in proptest::collection::vec(0u64..50, MAX_TRACT_LENGTH),
        ) {
            let h = Histograms {
                greater: LengthHistogram::from_bins(observed.clone()),
                null_greater: LengthHistogram::from_bins(null.clone()),
                lesser: LengthHistogram::from_bins(null),
                null_lesser: LengthHistogram::from_bins(observed),
            };
            let fdr = FdrCurve::compute(&h);
            for v in fdr.greater.iter().chain(&fdr.lesser) {
                prop_assert!((0.0..=1.0).contains(v));
            }
        }
    }
}
