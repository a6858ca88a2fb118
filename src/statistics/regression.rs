//! Ordinary least squares for one tested column.
//!
//! The design matrix is fixed for a whole resample, so the projection
//! `(XᵀX)⁻¹Xᵀ` is factored once and every voxel only pays for two
//! matrix-vector products.

use nalgebra::{Cholesky, DMatrix, DVector};

use crate::error::ModelError;

/// Least-squares fit of a fixed design against many response vectors.
#[derive(Debug, Clone)]
pub struct RegressionSolver {
    design: DMatrix<f64>,
    projection: DMatrix<f64>,
    study_feature: usize,
    /// `[(XᵀX)⁻¹]_{kk}` for the tested column.
    study_inverse_diag: f64,
}

/// Coefficient and t statistic of the tested column at one voxel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionFit {
    /// Coefficient of the study feature.
    pub beta: f64,
    /// `beta / se(beta)`, 0.0 if the residual variance vanishes.
    pub t: f64,
    /// Mean of the response.
    pub mean_response: f64,
}

impl RegressionSolver {
    /// Factor `design` (rows = observations). Fails if `XᵀX` is not positive definite.
    pub fn new(design: DMatrix<f64>, study_feature: usize) -> Result<Self, ModelError> {
        let (rows, cols) = design.shape();
        if study_feature == 0 || study_feature >= cols {
            return Err(ModelError::StudyFeatureOutOfRange {
                index: study_feature,
                feature_count: cols,
            });
        }
        if rows <= cols {
            return Err(ModelError::TooFewSubjects {
                kind: crate::types::ModelKind::MultipleRegression,
                required: cols + 1,
                found: rows,
            });
        }

        let xtx = design.transpose() * &design;
        let chol = Cholesky::new(xtx).ok_or(ModelError::Singular)?;
        let inverse = chol.inverse();
        let study_inverse_diag = inverse[(study_feature, study_feature)];
        let projection = inverse * design.transpose();

        Ok(Self {
            design,
            projection,
            study_feature,
            study_inverse_diag,
        })
    }

    /// Number of observations the design expects.
    pub fn rows(&self) -> usize {
        self.design.nrows()
    }

    /// Fit one response vector. `y.len()` must equal [`rows`](Self::rows).
    pub fn fit(&self, y: &DVector<f64>) -> RegressionFit {
        let n = self.design.nrows();
        let p = self.design.ncols();
        let beta = &self.projection * y;
        let residual = y - &self.design * &beta;
        let rss = residual.norm_squared();
        let sigma2 = rss / (n - p) as f64;
        let se = (sigma2 * self.study_inverse_diag).sqrt();
        let b = beta[self.study_feature];
        let t = if se > 0.0 && se.is_finite() { b / se } else { 0.0 };
        RegressionFit {
            beta: b,
            t,
            mean_response: y.mean(),
        }
    }
}
