//! Statistical building blocks.
//!
//! - Descriptive statistics and t tests over per-voxel samples
//! - Least-squares regression for one tested column
//! - Otsu thresholding
//! - Statistic maps of a model draw

mod regression;
mod summary;
mod threshold;
mod voxel;

pub use regression::{RegressionFit, RegressionSolver};
pub use summary::{mean, one_sample_t, ratio, sample_variance, std_dev, std_dev_f32, welch_t, GroupSummary};
pub use threshold::otsu_threshold;
pub use voxel::{calculate, StatisticMaps};
