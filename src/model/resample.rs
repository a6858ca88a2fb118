//! Null and bootstrap draws of a validated model.
//!
//! Each draw owns its RNG, seeded from the model seed and a draw key, so the
//! sequence of resampled models does not depend on which worker produced
//! them or in what order.

use nalgebra::DMatrix;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use super::{Design, IndividualTarget, StatModel};
use crate::error::ModelError;
use crate::types::{Phase, Resampling};

/// Derive a deterministic RNG seed from a base seed and a counter.
///
/// SplitMix64 of `base_seed + counter·φ`; neighbouring counters give
/// uncorrelated seeds.
pub fn counter_rng_seed(base_seed: u64, counter: u64) -> u64 {
    let mut z = base_seed.wrapping_add(counter.wrapping_mul(0x9e3779b97f4a7c15));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

/// Draw key for one permutation index, phase and study subject.
pub fn draw_key(iteration: usize, phase: Phase, subject: usize) -> u64 {
    ((iteration as u64) << 32) ^ ((subject as u64) << 1) ^ u64::from(phase.is_null())
}

/// Build a row-major design into a matrix.
pub(crate) fn design_matrix(rows: &[f64], feature_count: usize) -> DMatrix<f64> {
    DMatrix::from_row_slice(rows.len() / feature_count, feature_count, rows)
}

impl StatModel {
    /// Draw a resampled model.
    ///
    /// With `Resampling::Bootstrap` observations are first drawn with
    /// replacement (within each group for group designs). With `null` set,
    /// the association under test is then destroyed: group labels are
    /// shuffled, pair members swapped with probability ½, the study column
    /// permuted across rows, or the patient replaced by a normative subject.
    /// An observed permutation draw returns an identical copy.
    pub fn resample(
        &self,
        null: bool,
        resampling: Resampling,
        draw: u64,
    ) -> Result<StatModel, ModelError> {
        if !self.validated {
            return Err(ModelError::Degenerate("model has not been pre-processed"));
        }
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(counter_rng_seed(self.seed, draw));
        let mut model = self.clone();
        if resampling == Resampling::Bootstrap {
            model.bootstrap(&mut rng);
        }
        if null {
            model.permute(&mut rng);
        }
        Ok(model)
    }

    fn bootstrap<R: Rng>(&mut self, rng: &mut R) {
        let n = self.samples.len();
        if n == 0 {
            return;
        }
        match &mut self.design {
            Design::GroupDifference { labels } => {
                let group0: Vec<usize> = (0..n).filter(|&k| labels[k] == 0).collect();
                let group1: Vec<usize> = (0..n).filter(|&k| labels[k] != 0).collect();
                let mut picks = Vec::with_capacity(n);
                for group in [&group0, &group1] {
                    for _ in 0..group.len() {
                        picks.push(group[rng.random_range(0..group.len())]);
                    }
                }
                let old_labels = std::mem::take(labels);
                *labels = picks.iter().map(|&k| old_labels[k]).collect();
                self.samples = picks.iter().map(|&k| self.samples[k]).collect();
            }
            Design::PairedDifference {
                partners: Some(partners),
                ..
            } => {
                let picks: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
                *partners = picks.iter().map(|&k| partners[k]).collect();
                self.samples = picks.iter().map(|&k| self.samples[k]).collect();
            }
            Design::PairedDifference { partners: None, .. } => {}
            Design::MultipleRegression {
                rows,
                feature_count,
                ..
            } => {
                let fc = *feature_count;
                let picks: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
                *rows = picks
                    .iter()
                    .flat_map(|&k| rows[k * fc..(k + 1) * fc].to_vec())
                    .collect();
                self.samples = picks.iter().map(|&k| self.samples[k]).collect();
            }
            Design::IndividualVsNormative { .. } => {
                self.samples = (0..n).map(|_| self.samples[rng.random_range(0..n)]).collect();
            }
        }
    }

    fn permute<R: Rng>(&mut self, rng: &mut R) {
        match &mut self.design {
            Design::GroupDifference { labels } => labels.shuffle(rng),
            Design::PairedDifference {
                partners: Some(partners),
                ..
            } => {
                for (a, b) in self.samples.iter_mut().zip(partners.iter_mut()) {
                    if rng.random_bool(0.5) {
                        std::mem::swap(a, b);
                    }
                }
            }
            Design::PairedDifference { partners: None, .. } => {}
            Design::MultipleRegression {
                rows,
                feature_count,
                study_feature,
            } => {
                let (fc, col) = (*feature_count, *study_feature);
                let mut column: Vec<f64> = rows.chunks(fc).map(|r| r[col]).collect();
                column.shuffle(rng);
                for (row, v) in rows.chunks_mut(fc).zip(column) {
                    row[col] = v;
                }
            }
            Design::IndividualVsNormative { target } => {
                if !self.samples.is_empty() {
                    let pick = self.samples[rng.random_range(0..self.samples.len())];
                    *target = IndividualTarget::Normative(pick);
                }
            }
        }
    }
}
