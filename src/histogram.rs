//! Tract-length histograms shared by the permutation workers.
//!
//! Workers bin their tracks into a private [`LengthHistogram`] and add it to
//! the shared one in a single locked step, so the lock covers only the
//! addition. Each of the four shared histograms has its own lock.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::constants::MAX_TRACT_LENGTH;
use crate::tracking::Streamline;
use crate::types::{Direction, Phase};

/// Track counts per length bin (1 mm per bin).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthHistogram {
    bins: Vec<u64>,
}

impl Default for LengthHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl LengthHistogram {
    /// Empty histogram with [`MAX_TRACT_LENGTH`] bins.
    pub fn new() -> Self {
        Self {
            bins: vec![0; MAX_TRACT_LENGTH],
        }
    }

    /// Histogram from explicit bin counts.
    pub fn from_bins(bins: Vec<u64>) -> Self {
        Self { bins }
    }

    /// Bin the lengths of `tracks`. Returns the number of tracks counted.
    ///
    /// Tracks with fewer than two points are skipped; lengths past the last
    /// bin land in the last bin.
    pub fn fold(&mut self, tracks: &[Streamline]) -> u64 {
        let Some(last) = self.bins.len().checked_sub(1) else {
            return 0;
        };
        let mut counted = 0;
        for track in tracks.iter().filter(|t| t.coords().len() > 3) {
            self.bins[track.length().min(last)] += 1;
            counted += 1;
        }
        counted
    }

    /// Add another histogram bin by bin.
    pub fn merge(&mut self, other: &LengthHistogram) {
        for (a, b) in self.bins.iter_mut().zip(&other.bins) {
            *a += b;
        }
    }

    /// Bin counts.
    pub fn bins(&self) -> &[u64] {
        &self.bins
    }

    /// Sum over all bins.
    pub fn total(&self) -> u64 {
        self.bins.iter().sum()
    }
}

/// Copy of the four histograms taken at one moment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Histograms {
    /// Observed tracks on the greater map.
    pub greater: LengthHistogram,
    /// Observed tracks on the lesser map.
    pub lesser: LengthHistogram,
    /// Null tracks on the greater map.
    pub null_greater: LengthHistogram,
    /// Null tracks on the lesser map.
    pub null_lesser: LengthHistogram,
}

impl Histograms {
    /// Histogram for one phase and direction.
    pub fn get(&self, phase: Phase, direction: Direction) -> &LengthHistogram {
        match (phase, direction) {
            (Phase::Observed, Direction::Greater) => &self.greater,
            (Phase::Observed, Direction::Lesser) => &self.lesser,
            (Phase::Null, Direction::Greater) => &self.null_greater,
            (Phase::Null, Direction::Lesser) => &self.null_lesser,
        }
    }
}

/// The four shared histograms, one lock each.
#[derive(Debug, Default)]
pub struct HistogramSet {
    greater: Mutex<LengthHistogram>,
    lesser: Mutex<LengthHistogram>,
    null_greater: Mutex<LengthHistogram>,
    null_lesser: Mutex<LengthHistogram>,
}

impl HistogramSet {
    /// Four empty histograms.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, phase: Phase, direction: Direction) -> &Mutex<LengthHistogram> {
        match (phase, direction) {
            (Phase::Observed, Direction::Greater) => &self.greater,
            (Phase::Observed, Direction::Lesser) => &self.lesser,
            (Phase::Null, Direction::Greater) => &self.null_greater,
            (Phase::Null, Direction::Lesser) => &self.null_lesser,
        }
    }

    /// Bin `tracks` locally, then add them to the shared histogram in one step.
    pub fn fold(&self, phase: Phase, direction: Direction, tracks: &[Streamline]) -> u64 {
        let mut local = LengthHistogram::new();
        let counted = local.fold(tracks);
        if counted > 0 {
            self.slot(phase, direction).lock().merge(&local);
        }
        counted
    }

    /// Consistent copy of all four histograms.
    ///
    /// Locks are taken in a fixed order and held together, so a snapshot
    /// never mixes bins from before and after one fold.
    pub fn snapshot(&self) -> Histograms {
        let greater = self.greater.lock();
        let lesser = self.lesser.lock();
        let null_greater = self.null_greater.lock();
        let null_lesser = self.null_lesser.lock();
        Histograms {
            greater: greater.clone(),
            lesser: lesser.clone(),
            null_greater: null_greater.clone(),
            null_lesser: null_lesser.clone(),
        }
    }
}

/// Seed counts per permutation index, by phase and direction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeedCounts {
    /// Observed draws, greater map.
    pub greater: Vec<usize>,
    /// Observed draws, lesser map.
    pub lesser: Vec<usize>,
    /// Null draws, greater map.
    pub null_greater: Vec<usize>,
    /// Null draws, lesser map.
    pub null_lesser: Vec<usize>,
}

impl SeedCounts {
    fn sized(permutations: usize) -> Self {
        Self {
            greater: vec![0; permutations],
            lesser: vec![0; permutations],
            null_greater: vec![0; permutations],
            null_lesser: vec![0; permutations],
        }
    }

    fn slot_mut(&mut self, phase: Phase, direction: Direction) -> &mut Vec<usize> {
        match (phase, direction) {
            (Phase::Observed, Direction::Greater) => &mut self.greater,
            (Phase::Observed, Direction::Lesser) => &mut self.lesser,
            (Phase::Null, Direction::Greater) => &mut self.null_greater,
            (Phase::Null, Direction::Lesser) => &mut self.null_lesser,
        }
    }
}

/// Shared seed counters. Every permutation index is written by one worker only.
#[derive(Debug, Default)]
pub struct SeedCounters {
    counts: Mutex<SeedCounts>,
}

impl SeedCounters {
    /// Resize for a run of `permutations` indices and zero every counter.
    pub fn reset(&self, permutations: usize) {
        *self.counts.lock() = SeedCounts::sized(permutations);
    }

    /// Record the seed count of permutation `index`.
    pub fn record(&self, phase: Phase, direction: Direction, index: usize, seeds: usize) {
        if let Some(slot) = self.counts.lock().slot_mut(phase, direction).get_mut(index) {
            *slot = seeds;
        }
    }

    /// Copy of the counters.
    pub fn snapshot(&self) -> SeedCounts {
        self.counts.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_skips_degenerate_and_saturates() {
        let mut h = LengthHistogram::new();
        let tracks = vec![
            Streamline::new(vec![0.0, 0.0, 0.0]),
            Streamline::straight(2),
            Streamline::straight(11),
            Streamline::straight(500),
        ];
        assert_eq!(h.fold(&tracks), 3);
        assert_eq!(h.bins()[1], 1);
        assert_eq!(h.bins()[10], 1);
        assert_eq!(h.bins()[MAX_TRACT_LENGTH - 1], 1);
        assert_eq!(h.total(), 3);
    }

    #[test]
    fn test_shared_fold_and_snapshot() {
        let set = HistogramSet::new();
        set.fold(Phase::Null, Direction::Lesser, &[Streamline::straight(6)]);
        set.fold(Phase::Observed, Direction::Greater, &[Streamline::straight(6)]);
        set.fold(Phase::Observed, Direction::Greater, &[Streamline::straight(6)]);
        let snap = set.snapshot();
        assert_eq!(snap.greater.bins()[5], 2);
        assert_eq!(snap.null_lesser.bins()[5], 1);
        assert_eq!(snap.get(Phase::Null, Direction::Greater).total(), 0);
    }

    #[test]
    fn test_concurrent_folds_are_not_lost() {
        let set = HistogramSet::new();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..100 {
                        set.fold(Phase::Observed, Direction::Greater, &[Streamline::straight(4)]);
                    }
                });
            }
        });
        assert_eq!(set.snapshot().greater.bins()[3], 400);
    }

    #[test]
    fn test_seed_counters() {
        let counters = SeedCounters::default();
        counters.reset(3);
        counters.record(Phase::Null, Direction::Greater, 2, 17);
        counters.record(Phase::Observed, Direction::Greater, 9, 1);
        let snap = counters.snapshot();
        assert_eq!(snap.null_greater, vec![0, 0, 17]);
        assert_eq!(snap.greater, vec![0, 0, 0]);
    }
}
