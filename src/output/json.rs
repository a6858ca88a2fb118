//! JSON serialization for run summaries.

use crate::result::RunSummary;

/// Single-line JSON of a run summary, for logs and machine consumers.
///
/// # Errors
///
/// Propagates the `serde_json` error. Every summary field has a plain JSON
/// form (non-finite FDR values become `null`), so none is expected.
pub fn to_json(summary: &RunSummary) -> Result<String, serde_json::Error> {
    serde_json::to_string(summary)
}

/// Indented JSON of a run summary, for reports meant to be read.
///
/// # Errors
///
/// Same as [`to_json`].
pub fn to_json_pretty(summary: &RunSummary) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::fdr::FdrCurve;
    use crate::histogram::Histograms;
    use crate::result::{RunStatus, SubjectSummary};
    use crate::types::{ModelKind, ThresholdType};

    fn make_summary() -> RunSummary {
        let histograms = Histograms::default();
        RunSummary {
            kind: ModelKind::GroupDifference,
            threshold_type: ThresholdType::T,
            study_feature: None,
            observations: 12,
            population: 12,
            patients: 0,
            status: RunStatus::Completed,
            progress: 100,
            fdr_greater: 0.2,
            fdr_lesser: 1.0,
            subjects: vec![SubjectSummary {
                greater_tracks: 30,
                lesser_tracks: 0,
                has_maps: true,
            }],
            parameter_suffix: ".length40.s10.p100.t.2.group".to_string(),
            method: "method".to_string(),
            conclusion: "conclusion".to_string(),
            config: Config::quick(),
            fdr: FdrCurve::compute(&histograms),
            histograms,
        }
    }

    #[test]
    fn test_json_serialization() {
        let json = to_json(&make_summary()).unwrap();
        assert!(json.contains("\"kind\":\"GroupDifference\""));
        assert!(json.contains("\"threshold_type\":\"t\""));
        assert!(json.contains("\"status\":\"completed\""));
        assert!(json.contains("\"greater_tracks\":30"));
    }

    #[test]
    fn test_non_finite_fdr_serializes_as_null() {
        let mut summary = make_summary();
        summary.fdr_greater = f64::NAN;
        let json = to_json(&summary).unwrap();
        assert!(json.contains("\"fdr_greater\":null"));
    }

    #[test]
    fn test_json_round_trip() {
        let summary = make_summary();
        let json = to_json_pretty(&summary).unwrap();
        assert!(json.contains('\n'));
        let back: RunSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary);
    }
}
