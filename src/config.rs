//! Configuration for a permutation run.

use serde::{Deserialize, Serialize};

use crate::tracking::Region;
use crate::types::Resampling;

/// Configuration options for `PermutationEngine`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Observed iterations per run; as many null iterations run alongside (default: 2,000).
    pub permutation_count: usize,

    /// Worker threads (default: available parallelism).
    pub threads: usize,

    /// Seeds per mm³ placed over the seed voxels (default: 10).
    pub seeding_density: f64,

    /// Statistic value a voxel must exceed to seed or continue a track (default: 2.0).
    ///
    /// Percentage and percentile statistics are fractions, so 5% is 0.05.
    pub tracking_threshold: f32,

    /// Minimum track length in mm kept in the result collections and used
    /// for the reported FDR (default: 40).
    pub length_threshold: usize,

    /// Scale each subject's field by the inverse of its standard deviation (default: false).
    pub normalize: bool,

    /// Keep the tracks of every observed draw as the result instead of
    /// tracking the unresampled maps once more (default: false).
    pub output_resampling: bool,

    /// How observed draws treat subjects (default: `Bootstrap`).
    pub resampling: Resampling,

    /// Region constraints passed to the tracker (default: none, whole brain).
    pub regions: Vec<Region>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            permutation_count: 2_000,
            threads: default_threads(),
            seeding_density: 10.0,
            tracking_threshold: 2.0,
            length_threshold: 40,
            normalize: false,
            output_resampling: false,
            resampling: Resampling::Bootstrap,
            regions: Vec::new(),
        }
    }
}

impl Config {
    /// Small run for exploration: 100 permutations.
    pub fn quick() -> Self {
        Self {
            permutation_count: 100,
            ..Self::default()
        }
    }

    /// Set the number of permutations.
    pub fn permutations(mut self, n: usize) -> Self {
        self.permutation_count = n;
        self
    }

    /// Set the worker count (at least 1).
    pub fn threads(mut self, n: usize) -> Self {
        self.threads = n.max(1);
        self
    }

    /// Set the seeding density in seeds per mm³.
    pub fn seeding_density(mut self, density: f64) -> Self {
        self.seeding_density = density;
        self
    }

    /// Set the tracking threshold.
    pub fn tracking_threshold(mut self, threshold: f32) -> Self {
        self.tracking_threshold = threshold;
        self
    }

    /// Set the length threshold in mm.
    pub fn length_threshold(mut self, mm: usize) -> Self {
        self.length_threshold = mm;
        self
    }

    /// Enable or disable per-subject normalization.
    pub fn normalize(mut self, enabled: bool) -> Self {
        self.normalize = enabled;
        self
    }

    /// Keep resampled tracks as the result.
    pub fn output_resampling(mut self, enabled: bool) -> Self {
        self.output_resampling = enabled;
        self
    }

    /// Choose how observed draws are resampled.
    pub fn resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = resampling;
        self
    }

    /// Add a tracking region.
    pub fn region(mut self, region: Region) -> Self {
        self.regions.push(region);
        self
    }

    /// Tracking threshold as the user enters it: percent for percentage and
    /// percentile statistics, the raw value otherwise.
    pub fn display_threshold(&self, percent: bool) -> f64 {
        let t = self.tracking_threshold as f64;
        if percent {
            (t * 100.0 * 1e4).round() / 1e4
        } else {
            t
        }
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quick_preset() {
        let config = Config::quick();
        assert_eq!(config.permutation_count, 100);
        assert_eq!(config.length_threshold, Config::default().length_threshold);
    }

    #[test]
    fn test_setters_chain() {
        let config = Config::default().permutations(10).threads(0).normalize(true);
        assert_eq!(config.permutation_count, 10);
        assert_eq!(config.threads, 1);
        assert!(config.normalize);
    }

    #[test]
    fn test_display_threshold() {
        let config = Config::default().tracking_threshold(0.05);
        assert_eq!(config.display_threshold(true), 5.0);
        assert!((config.display_threshold(false) - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_serde_round_trip() {
        let config = Config::quick().resampling(Resampling::Permutation);
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
