//! Run result types.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::fdr::FdrCurve;
use crate::histogram::Histograms;
use crate::types::{ModelKind, ThresholdType};

/// Summary of one permutation run, suitable for JSON export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Design family.
    pub kind: ModelKind,

    /// Statistic thresholded for tracking.
    pub threshold_type: ThresholdType,

    /// Tested regression feature, if named.
    pub study_feature: Option<String>,

    /// Observations in the design (pairs for paired designs).
    pub observations: usize,

    /// Subjects in the population.
    pub population: usize,

    /// Study patients (individual analysis only).
    pub patients: usize,

    /// Where the run stands.
    pub status: RunStatus,

    /// Progress, 0 to 100.
    pub progress: u32,

    /// FDR of greater tracks at the length threshold.
    pub fdr_greater: f64,

    /// FDR of lesser tracks at the length threshold.
    pub fdr_lesser: f64,

    /// Result track counts per study subject.
    pub subjects: Vec<SubjectSummary>,

    /// Suffix appended to output names, e.g. `.length40.s10.p2000.t.2.group`.
    pub parameter_suffix: String,

    /// Natural-language description of the method.
    pub method: String,

    /// Natural-language description of the findings.
    pub conclusion: String,

    /// Configuration the run used.
    pub config: Config,

    /// Length histograms at the time of the summary.
    pub histograms: Histograms,

    /// FDR curves at the time of the summary.
    pub fdr: FdrCurve,
}

impl RunSummary {
    /// Whether the run finished its final pass.
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// State of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Workers are still running.
    Running,
    /// Every worker returned and the final pass completed.
    Completed,
    /// The run was terminated; its histograms are not valid statistics.
    Terminated,
    /// Worker 0 stopped on an error before the final pass.
    Failed,
}

/// Result track counts of one study subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectSummary {
    /// Tracks on the greater map.
    pub greater_tracks: usize,
    /// Tracks on the lesser map.
    pub lesser_tracks: usize,
    /// Whether the final maps were computed.
    pub has_maps: bool,
}
