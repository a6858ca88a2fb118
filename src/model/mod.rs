//! Statistical designs and their resampled variants.
//!
//! A [`StatModel`] is one of four designs. Every design keeps its
//! per-observation arrays aligned with `samples`, the database subjects whose
//! scalar fields feed each observation, so a resampled model is just another
//! `StatModel` with reordered or repeated rows.
//!
//! The lifecycle is:
//!
//! 1. build with one of the constructors,
//! 2. adjust (study feature, threshold type, missing data, removed subjects),
//! 3. [`pre_process`](StatModel::pre_process), which must succeed,
//! 4. [`resample`](StatModel::resample) as many times as needed.
//!
//! Any mutation in step 2 invalidates step 3.

mod resample;

use crate::constants::DEFAULT_SEED;
use crate::error::ModelError;
use crate::statistics::RegressionSolver;
use crate::types::{ModelKind, ThresholdType};

pub use resample::{counter_rng_seed, draw_key};
pub(crate) use resample::design_matrix;

/// Which data stands in for the patient in individual analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndividualTarget {
    /// No patient selected yet.
    Unassigned,
    /// Study patient at this index.
    Patient(usize),
    /// A normative subject drawn under the null hypothesis.
    Normative(usize),
}

/// Design-specific state, aligned with [`StatModel::samples`].
#[derive(Debug, Clone)]
pub(crate) enum Design {
    GroupDifference {
        /// Group code per observation; 0 is group 0, anything else group 1.
        labels: Vec<i32>,
    },
    PairedDifference {
        /// Signed pairing code per database subject.
        codes: Vec<i32>,
        /// Partner of each observation, resolved by `pre_process`.
        partners: Option<Vec<usize>>,
    },
    MultipleRegression {
        /// Row-major design, one row per observation, column 0 the intercept.
        rows: Vec<f64>,
        feature_count: usize,
        study_feature: usize,
    },
    IndividualVsNormative {
        target: IndividualTarget,
    },
}

/// Statistical model over a population.
#[derive(Debug, Clone)]
pub struct StatModel {
    pub(crate) design: Design,
    /// Database subject behind each observation.
    pub(crate) samples: Vec<usize>,
    population: usize,
    threshold_type: ThresholdType,
    seed: u64,
    feature_names: Vec<String>,
    validated: bool,
}

impl StatModel {
    fn with_design(design: Design, population: usize, threshold_type: ThresholdType) -> Self {
        Self {
            design,
            samples: (0..population).collect(),
            population,
            threshold_type,
            seed: DEFAULT_SEED,
            feature_names: Vec::new(),
            validated: false,
        }
    }

    /// Two-group comparison; one label per database subject.
    pub fn group_difference(labels: Vec<i32>) -> Self {
        let n = labels.len();
        Self::with_design(Design::GroupDifference { labels }, n, ThresholdType::T)
    }

    /// Paired comparison; `codes[i] = k > 0` pairs subject `i` with the subject coded `-k`.
    /// Subjects coded 0 take no part.
    pub fn paired_difference(codes: Vec<i32>) -> Self {
        let n = codes.len();
        let mut model = Self::with_design(
            Design::PairedDifference {
                codes,
                partners: None,
            },
            n,
            ThresholdType::T,
        );
        model.samples.clear();
        model
    }

    /// Multiple regression on a row-major design with an intercept in column 0.
    ///
    /// `study_feature` is the 1-based column tested.
    pub fn multiple_regression(design: Vec<f64>, feature_count: usize, study_feature: usize) -> Self {
        let population = if feature_count == 0 {
            0
        } else {
            design.len() / feature_count
        };
        Self::with_design(
            Design::MultipleRegression {
                rows: design,
                feature_count,
                study_feature,
            },
            population,
            ThresholdType::T,
        )
    }

    /// Patients compared against a normative population of `population` subjects.
    pub fn individual_vs_normative(population: usize) -> Self {
        Self::with_design(
            Design::IndividualVsNormative {
                target: IndividualTarget::Unassigned,
            },
            population,
            ThresholdType::Percentile,
        )
    }

    /// Set the threshold type.
    pub fn with_threshold_type(mut self, threshold_type: ThresholdType) -> Self {
        self.threshold_type = threshold_type;
        self.validated = false;
        self
    }

    /// Set the resampling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Name the design columns (intercept excluded) for reports.
    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = names;
        self
    }

    /// Change the tested column of a regression design.
    pub fn set_study_feature(&mut self, index: usize) {
        if let Design::MultipleRegression { study_feature, .. } = &mut self.design {
            *study_feature = index;
            self.validated = false;
        }
    }

    /// Replace the resampling seed. Runs started afterwards draw a new sequence.
    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
    }

    /// Design family.
    pub fn kind(&self) -> ModelKind {
        match self.design {
            Design::GroupDifference { .. } => ModelKind::GroupDifference,
            Design::PairedDifference { .. } => ModelKind::PairedDifference,
            Design::MultipleRegression { .. } => ModelKind::MultipleRegression,
            Design::IndividualVsNormative { .. } => ModelKind::IndividualVsNormative,
        }
    }

    /// Statistic derived per voxel.
    pub fn threshold_type(&self) -> ThresholdType {
        self.threshold_type
    }

    /// Resampling seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of database subjects the design was written for.
    pub fn population_size(&self) -> usize {
        self.population
    }

    /// Observations in the current design (pairs for a paired design).
    pub fn observation_count(&self) -> usize {
        self.samples.len()
    }

    /// Database subject behind each observation.
    pub fn samples(&self) -> &[usize] {
        &self.samples
    }

    /// Column names, intercept excluded.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Name of the tested column, if the design is a regression with named features.
    pub fn study_feature_name(&self) -> Option<&str> {
        match self.design {
            Design::MultipleRegression { study_feature, .. } => self
                .feature_names
                .get(study_feature.wrapping_sub(1))
                .map(String::as_str),
            _ => None,
        }
    }

    /// Tested column (regression only).
    pub fn study_feature(&self) -> Option<usize> {
        match self.design {
            Design::MultipleRegression { study_feature, .. } => Some(study_feature),
            _ => None,
        }
    }

    /// Patient selection for individual analysis.
    pub fn target(&self) -> Option<IndividualTarget> {
        match self.design {
            Design::IndividualVsNormative { target } => Some(target),
            _ => None,
        }
    }

    /// Copy of this model aimed at study patient `patient`.
    pub fn for_patient(&self, patient: usize) -> Self {
        let mut model = self.clone();
        if let Design::IndividualVsNormative { target } = &mut model.design {
            *target = IndividualTarget::Patient(patient);
        }
        model
    }

    /// Whether [`pre_process`](Self::pre_process) has succeeded since the last change.
    pub fn is_validated(&self) -> bool {
        self.validated
    }

    /// Validate the design and resolve pairing. Must succeed before resampling.
    ///
    /// Idempotent: calling it again on a valid model changes nothing.
    pub fn pre_process(&mut self) -> Result<(), ModelError> {
        self.check_threshold_type()?;
        let kind = self.kind();
        match &mut self.design {
            Design::GroupDifference { labels } => {
                if labels.len() != self.samples.len() {
                    return Err(ModelError::SubjectCountMismatch {
                        what: "group labels",
                        expected: self.samples.len(),
                        actual: labels.len(),
                    });
                }
                let group1 = labels.iter().filter(|&&l| l != 0).count();
                if group1 == 0 || group1 == labels.len() {
                    return Err(ModelError::Degenerate(
                        "every subject carries the same group label",
                    ));
                }
            }
            Design::PairedDifference { codes, partners } => {
                if partners.is_none() {
                    let (a, b) = resolve_pairs(codes)?;
                    self.samples = a;
                    *partners = Some(b);
                }
                if self.samples.len() < 2 {
                    return Err(ModelError::TooFewSubjects {
                        kind,
                        required: 2,
                        found: self.samples.len(),
                    });
                }
            }
            Design::MultipleRegression {
                rows,
                feature_count,
                study_feature,
            } => {
                let fc = *feature_count;
                if fc < 2 || rows.len() % fc != 0 {
                    return Err(ModelError::DesignShape {
                        len: rows.len(),
                        feature_count: fc,
                    });
                }
                if rows.len() / fc != self.samples.len() {
                    return Err(ModelError::SubjectCountMismatch {
                        what: "design matrix rows",
                        expected: self.samples.len(),
                        actual: rows.len() / fc,
                    });
                }
                if *study_feature == 0 || *study_feature >= fc {
                    return Err(ModelError::StudyFeatureOutOfRange {
                        index: *study_feature,
                        feature_count: fc,
                    });
                }
                let first = rows.get(*study_feature).copied();
                if rows.chunks_exact(fc).all(|r| Some(r[*study_feature]) == first) {
                    return Err(ModelError::Degenerate("the study feature is constant"));
                }
                RegressionSolver::new(resample::design_matrix(rows, fc), *study_feature)?;
            }
            Design::IndividualVsNormative { .. } => {
                if self.samples.len() < 2 {
                    return Err(ModelError::TooFewSubjects {
                        kind,
                        required: 2,
                        found: self.samples.len(),
                    });
                }
            }
        }
        self.validated = true;
        Ok(())
    }

    fn check_threshold_type(&self) -> Result<(), ModelError> {
        use ThresholdType::*;
        let allowed: &[ThresholdType] = match self.kind() {
            ModelKind::GroupDifference | ModelKind::PairedDifference => &[T, Percentage, MeanDif],
            ModelKind::MultipleRegression => &[T, Beta, Percentage],
            ModelKind::IndividualVsNormative => &[Percentile, Percentage, MeanDif],
        };
        if allowed.contains(&self.threshold_type) {
            Ok(())
        } else {
            Err(ModelError::UnsupportedThreshold {
                kind: self.kind(),
                threshold: self.threshold_type,
            })
        }
    }

    /// Drop subjects whose design values equal `sentinel`, then re-validate.
    ///
    /// Group labels and regression covariates (intercept excluded) are
    /// checked; for a paired design both members of an affected pair are
    /// dropped. Returns the number of observations removed.
    pub fn remove_missing_data(&mut self, sentinel: f64) -> Result<usize, ModelError> {
        let before = self.samples.len();
        match &mut self.design {
            Design::GroupDifference { labels } => {
                let keep: Vec<bool> = labels.iter().map(|&l| l as f64 != sentinel).collect();
                retain_aligned(&mut self.samples, &keep);
                retain_aligned(labels, &keep);
            }
            Design::PairedDifference { codes, partners } => {
                let missing: Vec<i32> = codes
                    .iter()
                    .copied()
                    .filter(|&c| c != 0 && c as f64 == sentinel)
                    .collect();
                for code in missing {
                    for c in codes.iter_mut() {
                        if *c == code || *c == -code {
                            *c = 0;
                        }
                    }
                }
                *partners = None;
            }
            Design::MultipleRegression {
                rows,
                feature_count,
                ..
            } => {
                let fc = (*feature_count).max(1);
                let keep: Vec<bool> = rows
                    .chunks(fc)
                    .map(|r| r.iter().skip(1).all(|&v| v != sentinel))
                    .collect();
                retain_aligned(&mut self.samples, &keep);
                *rows = rows
                    .chunks(fc)
                    .zip(&keep)
                    .filter(|(_, &k)| k)
                    .flat_map(|(r, _)| r.iter().copied())
                    .collect();
            }
            Design::IndividualVsNormative { .. } => {}
        }
        self.validated = false;
        self.pre_process()?;
        Ok(before.saturating_sub(self.samples.len()))
    }

    /// Remove database subject `index` and renumber the later subjects.
    ///
    /// The model must be re-validated afterwards.
    pub fn remove_subject(&mut self, index: usize) -> Result<(), ModelError> {
        if index >= self.population {
            return Err(ModelError::UnknownSubject {
                index,
                count: self.population,
            });
        }
        match &mut self.design {
            Design::PairedDifference { codes, partners } => {
                let code = codes.remove(index);
                if code != 0 {
                    for c in codes.iter_mut() {
                        if *c == -code {
                            *c = 0;
                        }
                    }
                }
                *partners = None;
                self.samples.clear();
            }
            design => {
                let keep: Vec<bool> = self.samples.iter().map(|&s| s != index).collect();
                match design {
                    Design::GroupDifference { labels } => retain_aligned(labels, &keep),
                    Design::MultipleRegression {
                        rows,
                        feature_count,
                        ..
                    } => {
                        let fc = (*feature_count).max(1);
                        *rows = rows
                            .chunks(fc)
                            .zip(&keep)
                            .filter(|(_, &k)| k)
                            .flat_map(|(r, _)| r.iter().copied())
                            .collect();
                    }
                    _ => {}
                }
                retain_aligned(&mut self.samples, &keep);
                for s in &mut self.samples {
                    if *s > index {
                        *s -= 1;
                    }
                }
            }
        }
        self.population -= 1;
        self.validated = false;
        Ok(())
    }

    /// Database subjects present in the design, in model order.
    ///
    /// For a paired design the first members come first, then their partners.
    pub fn present_subjects(&self) -> Vec<usize> {
        match &self.design {
            Design::PairedDifference {
                partners: Some(p), ..
            } => self.samples.iter().chain(p.iter()).copied().collect(),
            _ => self.samples.clone(),
        }
    }

    /// Restrict a per-database-subject vector to the subjects present in the design.
    pub fn select(&self, data: &[f64]) -> Vec<f64> {
        self.present_subjects()
            .into_iter()
            .filter_map(|s| data.get(s).copied())
            .collect()
    }

    /// Values of one design column for each observation (regression only).
    pub fn feature_values(&self, column: usize) -> Option<Vec<f64>> {
        match &self.design {
            Design::MultipleRegression {
                rows,
                feature_count,
                ..
            } if column < *feature_count => {
                Some(rows.chunks(*feature_count).map(|r| r[column]).collect())
            }
            _ => None,
        }
    }

    /// Partner of each observation (paired designs after `pre_process`).
    pub fn partners(&self) -> Option<&[usize]> {
        match &self.design {
            Design::PairedDifference { partners, .. } => partners.as_deref(),
            _ => None,
        }
    }

    /// Group code of each observation (group designs).
    pub fn labels(&self) -> Option<&[i32]> {
        match &self.design {
            Design::GroupDifference { labels } => Some(labels),
            _ => None,
        }
    }
}

/// Keep the entries of `v` whose flag in `keep` is set.
fn retain_aligned<T>(v: &mut Vec<T>, keep: &[bool]) {
    let mut flags = keep.iter();
    v.retain(|_| flags.next().copied().unwrap_or(false));
}

/// Resolve signed pairing codes into `(first members, partners)`.
fn resolve_pairs(codes: &[i32]) -> Result<(Vec<usize>, Vec<usize>), ModelError> {
    let mut first = Vec::new();
    let mut partners = Vec::new();
    for (i, &code) in codes.iter().enumerate() {
        if code == 0 {
            continue;
        }
        let matches: Vec<usize> = codes
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c == -code)
            .map(|(j, _)| j)
            .collect();
        let same = codes.iter().filter(|&&c| c == code).count();
        if matches.len() != 1 || same != 1 {
            return Err(ModelError::UnresolvedPair {
                code: code.abs(),
                subject: i,
            });
        }
        if code > 0 {
            first.push(i);
            partners.push(matches[0]);
        }
    }
    Ok((first, partners))
}
