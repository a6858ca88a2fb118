//! # connectometry
//!
//! Permutation testing for diffusion MRI connectometry.
//!
//! A [`StatModel`] relates a per-voxel quantity from a population
//! [`Database`] to a study variable. For every permutation the engine draws a
//! null resample (study variable shuffled) and an observed resample,
//! thresholds the resulting statistic maps, tracks them with a
//! caller-supplied [`TrackGenerator`], and bins the track lengths. The
//! false discovery rate of a tract length is the ratio of null to observed
//! tracks at least that long.
//!
//! Results depend only on the model seed and the permutation count, never
//! on how many worker threads ran them.
//!
//! ## Quick Start
//!
//! ```ignore
//! use connectometry::{Config, PermutationEngine, StatModel};
//!
//! let mut engine = PermutationEngine::new(database, tracker)
//!     .with_config(Config::default().permutations(2000).threads(8));
//! engine.run(StatModel::group_difference(labels))?;
//! engine.wait();
//!
//! let summary = engine.summary()?;
//! println!("{}", connectometry::output::format_summary(&summary));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
mod config;
mod constants;
mod error;
mod result;
mod types;

// Functional modules
pub mod database;
pub mod engine;
pub mod fdr;
pub mod histogram;
pub mod model;
pub mod output;
pub mod statistics;
pub mod thread_pool;
pub mod tracking;

// Re-exports for public API
pub use config::Config;
pub use constants::{MAX_TRACT_LENGTH, REPORTABLE_FDR};
pub use database::{Database, Geometry, Patients};
pub use engine::{PermutationEngine, ResultSink, SaveReport, SinkError, SubjectResult};
pub use error::{DatabaseError, EngineError, ModelError, Result};
pub use fdr::FdrCurve;
pub use histogram::{Histograms, LengthHistogram, SeedCounts};
pub use model::{IndividualTarget, StatModel};
pub use result::{RunStatus, RunSummary, SubjectSummary};
pub use statistics::StatisticMaps;
pub use thread_pool::CancelFlag;
pub use tracking::{Region, RoiType, Streamline, TrackCollection, TrackGenerator, TrackingRequest};
pub use types::{Direction, ModelKind, Phase, Resampling, ThresholdType};
