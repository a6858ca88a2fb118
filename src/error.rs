//! Error types.
//!
//! Configuration problems are detected before any worker starts and are
//! returned synchronously. Failures inside a running worker never cross the
//! pool boundary; they are logged and end that worker's loop only.

use thiserror::Error;

use crate::types::{ModelKind, ThresholdType};

/// Invalid statistical design.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// A per-subject vector does not match the population size.
    #[error("{what} has {actual} entries but the population has {expected} subjects")]
    SubjectCountMismatch {
        /// Which input was mismatched.
        what: &'static str,
        /// Population size.
        expected: usize,
        /// Entries supplied.
        actual: usize,
    },

    /// Design matrix length is not `rows × feature_count`.
    #[error("design matrix has {len} values, not a multiple of {feature_count} features")]
    DesignShape {
        /// Total values supplied.
        len: usize,
        /// Columns per row.
        feature_count: usize,
    },

    /// Tested column is the intercept or beyond the last column.
    #[error("study feature {index} is out of range (1..{feature_count})")]
    StudyFeatureOutOfRange {
        /// Requested column.
        index: usize,
        /// Columns per row, intercept included.
        feature_count: usize,
    },

    /// Not enough observations left to estimate the model.
    #[error("{kind} needs at least {required} subjects, found {found}")]
    TooFewSubjects {
        /// Model variant.
        kind: ModelKind,
        /// Minimum required.
        required: usize,
        /// Present after filtering.
        found: usize,
    },

    /// Every subject carries the same label, or the tested feature is constant.
    #[error("{0}")]
    Degenerate(&'static str),

    /// A pairing code has no counterpart, or more than one.
    #[error("pairing code {code} at subject {subject} has no unique matching -{code}")]
    UnresolvedPair {
        /// The unmatched code.
        code: i32,
        /// Database index of the subject carrying it.
        subject: usize,
    },

    /// The threshold type is not defined for this design.
    #[error("{threshold} statistic is not available for {kind}")]
    UnsupportedThreshold {
        /// Model variant.
        kind: ModelKind,
        /// Requested threshold type.
        threshold: ThresholdType,
    },

    /// A subject index outside the population.
    #[error("subject {index} does not exist (population of {count})")]
    UnknownSubject {
        /// Requested index.
        index: usize,
        /// Population size.
        count: usize,
    },

    /// The design matrix is singular for the current subjects.
    #[error("design matrix is rank deficient")]
    Singular,
}

/// Invalid in-memory population data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DatabaseError {
    /// Geometry with a zero dimension or non-positive voxel size.
    #[error("invalid geometry: {0}")]
    Geometry(String),

    /// An array that must cover the volume has the wrong length.
    #[error("{what} has {actual} voxels, expected {expected}")]
    VoxelCountMismatch {
        /// Which array.
        what: String,
        /// Voxels in the geometry.
        expected: usize,
        /// Values supplied.
        actual: usize,
    },

    /// Subject names and subject fields disagree.
    #[error("{names} subject names for {fields} subject fields")]
    NameCountMismatch {
        /// Names supplied.
        names: usize,
        /// Fields supplied.
        fields: usize,
    },

    /// No subjects at all.
    #[error("the population is empty")]
    Empty,

    /// A subject index outside the population.
    #[error("no subject {index} in a population of {count}")]
    NoSuchSubject {
        /// Requested index.
        index: usize,
        /// Population size.
        count: usize,
    },

    /// A patient field that does not match the population geometry.
    #[error("patient data is incompatible with the population: {0}")]
    IncompatiblePatient(String),
}

/// Errors returned by the permutation engine to its caller.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Design rejected before the run started.
    #[error("invalid statistical model: {0}")]
    Model(#[from] ModelError),

    /// Population rejected before the run started.
    #[error("invalid database: {0}")]
    Database(#[from] DatabaseError),

    /// Individual analysis requested without patients, or patients given for a population design.
    #[error("individual analysis requires patient data ({0})")]
    Patients(&'static str),

    /// Output names do not match the number of study subjects.
    #[error("{names} output names for {subjects} result subjects")]
    OutputNames {
        /// Names supplied.
        names: usize,
        /// Subjects with results.
        subjects: usize,
    },

    /// The caller's sink failed.
    #[error("result sink failed: {0}")]
    Sink(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Worker threads could not be started.
    #[error("failed to start worker threads: {0}")]
    Workers(String),

    /// No run has produced results yet.
    #[error("no permutation run has been started")]
    NotStarted,
}

/// Result alias for engine operations.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
