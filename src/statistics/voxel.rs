//! Per-voxel statistic maps for one model draw.
//!
//! Positive statistics go to the greater map, negative ones to the lesser
//! map as magnitudes. Voxels outside the fiber mask, and voxels whose
//! statistic is not finite, are 0 in both.

use nalgebra::DVector;
use tracing::debug;

use super::regression::RegressionSolver;
use super::summary::{mean, one_sample_t, ratio, welch_t, GroupSummary};
use super::threshold::otsu_threshold;
use crate::constants::OTSU_BINS;
use crate::database::{Database, Patients};
use crate::model::{Design, IndividualTarget, StatModel};
use crate::types::{Direction, ThresholdType};

/// Greater and lesser statistic maps over the whole volume.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticMaps {
    /// Positive statistic per voxel.
    pub greater: Vec<f32>,
    /// Magnitude of the negative statistic per voxel.
    pub lesser: Vec<f32>,
    /// Statistic the maps hold.
    pub threshold_type: ThresholdType,
}

impl StatisticMaps {
    /// All-zero maps.
    pub fn empty(voxel_count: usize, threshold_type: ThresholdType) -> Self {
        Self {
            greater: vec![0.0; voxel_count],
            lesser: vec![0.0; voxel_count],
            threshold_type,
        }
    }

    /// Map for one direction.
    pub fn get(&self, direction: Direction) -> &[f32] {
        match direction {
            Direction::Greater => &self.greater,
            Direction::Lesser => &self.lesser,
        }
    }

    /// Whether every voxel is 0 in both maps.
    pub fn is_empty(&self) -> bool {
        self.greater.iter().chain(&self.lesser).all(|&v| v == 0.0)
    }

    fn set(&mut self, voxel: usize, value: f64) {
        if !value.is_finite() {
            return;
        }
        if value > 0.0 {
            self.greater[voxel] = value as f32;
        } else if value < 0.0 {
            self.lesser[voxel] = (-value) as f32;
        }
    }

    /// Otsu threshold of the non-zero statistic magnitudes, 0.0 if there are none.
    pub fn suggest_threshold(&self) -> f32 {
        let values: Vec<f32> = self
            .greater
            .iter()
            .chain(&self.lesser)
            .copied()
            .filter(|&v| v > 0.0)
            .collect();
        otsu_threshold(&values, OTSU_BINS)
    }
}

/// Compute the statistic maps of `model` over `database`.
///
/// `patients` supplies the patient fields for an individual design aimed at
/// a study patient; it is ignored by the population designs.
pub fn calculate(
    model: &StatModel,
    database: &Database,
    patients: Option<&Patients>,
    normalize: bool,
) -> StatisticMaps {
    let voxel_count = database.geometry().voxel_count();
    let threshold_type = model.threshold_type();
    let mut maps = StatisticMaps::empty(voxel_count, threshold_type);
    let samples = model.samples();

    match &model.design {
        Design::GroupDifference { labels } => {
            let mut g0 = Vec::with_capacity(samples.len());
            let mut g1 = Vec::with_capacity(samples.len());
            for v in (0..voxel_count).filter(|&v| database.is_fiber(v)) {
                g0.clear();
                g1.clear();
                for (&s, &l) in samples.iter().zip(labels) {
                    let x = database.value(s, v, normalize);
                    if l == 0 {
                        g0.push(x);
                    } else {
                        g1.push(x);
                    }
                }
                let (a, b) = (GroupSummary::of(&g1), GroupSummary::of(&g0));
                let stat = match threshold_type {
                    ThresholdType::T => welch_t(&a, &b),
                    ThresholdType::Percentage => {
                        ratio(a.mean - b.mean, (a.mean + b.mean) / 2.0)
                    }
                    _ => a.mean - b.mean,
                };
                maps.set(v, stat);
            }
        }
        Design::PairedDifference {
            partners: Some(partners),
            ..
        } => {
            let mut d = Vec::with_capacity(samples.len());
            for v in (0..voxel_count).filter(|&v| database.is_fiber(v)) {
                d.clear();
                let (mut sum_a, mut sum_b) = (0.0, 0.0);
                for (&a, &b) in samples.iter().zip(partners) {
                    let (xa, xb) = (database.value(a, v, normalize), database.value(b, v, normalize));
                    sum_a += xa;
                    sum_b += xb;
                    d.push(xa - xb);
                }
                let summary = GroupSummary::of(&d);
                let stat = match threshold_type {
                    ThresholdType::T => one_sample_t(&summary),
                    ThresholdType::Percentage => {
                        let n = d.len().max(1) as f64;
                        ratio(summary.mean, (sum_a / n + sum_b / n) / 2.0)
                    }
                    _ => summary.mean,
                };
                maps.set(v, stat);
            }
        }
        Design::PairedDifference { partners: None, .. } => {}
        Design::MultipleRegression {
            rows,
            feature_count,
            study_feature,
        } => {
            let design = crate::model::design_matrix(rows, *feature_count);
            let solver = match RegressionSolver::new(design, *study_feature) {
                Ok(solver) => solver,
                Err(e) => {
                    debug!(error = %e, "degenerate regression draw, statistic maps left empty");
                    return maps;
                }
            };
            let mut y = DVector::zeros(solver.rows());
            for v in (0..voxel_count).filter(|&v| database.is_fiber(v)) {
                for (k, &s) in samples.iter().enumerate() {
                    y[k] = database.value(s, v, normalize);
                }
                let fit = solver.fit(&y);
                let stat = match threshold_type {
                    ThresholdType::Beta => fit.beta,
                    ThresholdType::Percentage => ratio(fit.beta, fit.mean_response),
                    _ => fit.t,
                };
                maps.set(v, stat);
            }
        }
        Design::IndividualVsNormative { target } => {
            let subject = match (*target, patients) {
                (IndividualTarget::Patient(p), Some(pt)) if p < pt.len() => Subject::Patient(pt, p),
                (IndividualTarget::Normative(s), _) => Subject::Normative(s),
                _ => return maps,
            };
            let mut population = Vec::with_capacity(samples.len());
            for v in (0..voxel_count).filter(|&v| database.is_fiber(v)) {
                population.clear();
                population.extend(samples.iter().map(|&s| database.value(s, v, normalize)));
                let x = subject.value(database, v, normalize);
                let m = mean(&population);
                let stat = match threshold_type {
                    ThresholdType::Percentile => percentile(x, m, &population),
                    ThresholdType::Percentage => ratio(x - m, m),
                    _ => x - m,
                };
                maps.set(v, stat);
            }
        }
    }
    maps
}

enum Subject<'a> {
    Patient(&'a Patients, usize),
    Normative(usize),
}

impl Subject<'_> {
    fn value(&self, database: &Database, voxel: usize, normalize: bool) -> f64 {
        match *self {
            Subject::Patient(patients, p) => patients.value(p, voxel, normalize),
            Subject::Normative(s) => database.value(s, voxel, normalize),
        }
    }
}

/// Signed rank of `x` in `population`: fraction below when `x` is at or above
/// the mean, negated fraction above otherwise.
fn percentile(x: f64, m: f64, population: &[f64]) -> f64 {
    if population.is_empty() {
        return 0.0;
    }
    let n = population.len() as f64;
    if x >= m {
        population.iter().filter(|&&p| p < x).count() as f64 / n
    } else {
        -(population.iter().filter(|&&p| p > x).count() as f64 / n)
    }
}
