//! Small shared enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Statistical design family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    /// Two groups distinguished by a label.
    GroupDifference,
    /// Matched pairs within the population.
    PairedDifference,
    /// Linear model over a design matrix, testing one column.
    MultipleRegression,
    /// One or more patients compared with a normative population.
    IndividualVsNormative,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GroupDifference => "group difference",
            Self::PairedDifference => "paired difference",
            Self::MultipleRegression => "multiple regression",
            Self::IndividualVsNormative => "individual analysis",
        };
        f.write_str(name)
    }
}

/// How the voxel statistic is derived and scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdType {
    /// Difference relative to the mean (fraction, not ×100).
    Percentage,
    /// t statistic.
    T,
    /// Regression coefficient of the study feature.
    Beta,
    /// Rank of a patient within the normative population (fraction).
    Percentile,
    /// Signed difference of means.
    MeanDif,
}

impl ThresholdType {
    /// Short name used in output file suffixes and map labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::T => "t",
            Self::Beta => "beta",
            Self::Percentile => "percentile",
            Self::MeanDif => "mean_dif",
        }
    }

    /// Whether the user-facing threshold is given in percent.
    pub fn is_percent(self) -> bool {
        matches!(self, Self::Percentage | Self::Percentile)
    }
}

impl fmt::Display for ThresholdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sign of the voxel statistic a map or track set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Positive statistic.
    Greater,
    /// Negative statistic (stored as magnitude).
    Lesser,
}

impl Direction {
    /// Both directions, greater first.
    pub const BOTH: [Direction; 2] = [Direction::Greater, Direction::Lesser];

    /// Lower-case name used in file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Greater => "greater",
            Self::Lesser => "lesser",
        }
    }
}

/// Which distribution an iteration contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Labels randomized under the null hypothesis.
    Null,
    /// Actual (or bootstrap-resampled) labelling.
    Observed,
}

impl Phase {
    /// The other phase.
    pub fn toggle(self) -> Self {
        match self {
            Self::Null => Self::Observed,
            Self::Observed => Self::Null,
        }
    }

    /// Whether this is a null draw.
    pub fn is_null(self) -> bool {
        self == Self::Null
    }
}

/// How a non-null draw treats the subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resampling {
    /// Subjects used as they are; only null draws are randomized.
    Permutation,
    /// Subjects drawn with replacement before any null randomization.
    Bootstrap,
}
