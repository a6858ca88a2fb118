//! Natural-language method and result descriptions, and output name suffixes.

use std::fmt::Write as _;

use crate::config::Config;
use crate::constants::REPORTABLE_FDR;
use crate::fdr::FdrCurve;
use crate::model::StatModel;
use crate::types::{Direction, ModelKind, ThresholdType};

const CONNECTOMETRY_CITATION: &str =
    "Diffusion MRI connectometry (Yeh et al. NeuroImage 125 (2016): 162-171)";
const TRACKING_CITATION: &str =
    "a deterministic fiber tracking algorithm (Yeh et al. PLoS ONE 8(11): e80713, 2013)";

/// Paragraph describing how the analysis was run.
pub fn method_summary(model: &StatModel, config: &Config, population: usize, patients: usize) -> String {
    let mut out = String::new();
    let n = model.observation_count();
    match model.kind() {
        ModelKind::GroupDifference => {
            let _ = write!(
                out,
                "{CONNECTOMETRY_CITATION} was conducted to compare group differences in a total of {n} subjects."
            );
        }
        ModelKind::PairedDifference => {
            let _ = write!(
                out,
                "{CONNECTOMETRY_CITATION} was conducted to compare paired group differences in a total of {n} pairs."
            );
        }
        ModelKind::MultipleRegression => {
            let _ = write!(
                out,
                "{CONNECTOMETRY_CITATION} was used to study the effect of {}. A multiple regression model was used to consider {} in a total of {n} subjects.",
                study_feature_label(model),
                english_list(&feature_labels(model)),
            );
        }
        ModelKind::IndividualVsNormative => {
            let _ = write!(
                out,
                "{CONNECTOMETRY_CITATION} was conducted to identify affected pathways in {patients} study patients. The diffusion data of the patients were compared with {population} normal subjects."
            );
        }
    }

    if config.normalize {
        out.push_str(" The SDF was normalized.");
    }
    let threshold = model.threshold_type();
    let _ = write!(
        out,
        " A {} threshold of {} was assigned to select local connectomes, and the local connectomes were tracked using {TRACKING_CITATION}.",
        threshold_phrase(threshold),
        config.display_threshold(threshold.is_percent()),
    );
    if !config.regions.is_empty() {
        let regions: Vec<String> = config
            .regions
            .iter()
            .map(|r| format!("{} as the {}", r.name, r.kind.description()))
            .collect();
        let _ = write!(out, " The tracking algorithm used {}.", english_list(&regions));
    }
    if config.output_resampling {
        out.push_str(" All tracks generated from bootstrap resampling were included.");
    }
    let _ = write!(
        out,
        " A length threshold of {} mm was used to select tracks. The seeding density was {} seed(s) per mm3. To estimate the false discovery rate, a total of {} randomized permutations were applied to the group label to obtain the null distribution of the track length.",
        config.length_threshold, config.seeding_density, config.permutation_count,
    );
    out
}

/// Sentence reporting the findings at the length threshold.
///
/// `has_result` tells, greater then lesser, whether any result tracks exist.
/// `descriptions` names the tracks found (for example from an atlas lookup);
/// "tracks" is used otherwise. A direction whose FDR exceeds 0.5 is reported
/// as "no track".
pub fn result_sentence(
    model: &StatModel,
    fdr: &FdrCurve,
    length_threshold: usize,
    has_result: [bool; 2],
    descriptions: Option<[&str; 2]>,
) -> String {
    let names = descriptions.unwrap_or(["tracks", "tracks"]);
    let [greater, lesser] = [(Direction::Greater, 0), (Direction::Lesser, 1)].map(|(d, k)| {
        let value = fdr.at(d, length_threshold);
        let found = if value > REPORTABLE_FDR || !has_result[k] {
            "no track"
        } else {
            names[k]
        };
        (found, format_fdr(value))
    });
    let (increased, decreased) = match model.kind() {
        ModelKind::IndividualVsNormative => (
            "increased connectivity".to_string(),
            "decreased connectivity".to_string(),
        ),
        ModelKind::MultipleRegression => {
            let feature = study_feature_label(model);
            (
                format!("increased connectivity related to {feature}"),
                format!("decreased connectivity related to {feature}"),
            )
        }
        ModelKind::GroupDifference | ModelKind::PairedDifference => (
            "increased connectivity in group 1".to_string(),
            "increased connectivity in group 0".to_string(),
        ),
    };
    format!(
        "The connectometry analysis identified {} with {increased} (FDR={}) and {} with {decreased} (FDR={}).",
        greater.0, greater.1, lesser.0, lesser.1
    )
}

/// Suffix describing the run parameters, appended to output names.
///
/// For example `.nqa.length40.s10.p2000.t.2.5.group`.
pub fn parameter_suffix(model: &StatModel, config: &Config) -> String {
    let mut out = String::new();
    if config.normalize {
        out.push_str(".nqa");
    }
    let threshold = model.threshold_type();
    let _ = write!(
        out,
        ".length{}.s{}.p{}.{}.{}",
        config.length_threshold,
        config.seeding_density,
        config.permutation_count,
        threshold.as_str(),
        config.display_threshold(threshold.is_percent()),
    );
    match model.kind() {
        ModelKind::GroupDifference => out.push_str(".group"),
        ModelKind::PairedDifference => out.push_str(".paired"),
        ModelKind::MultipleRegression => {
            let _ = write!(out, ".mr.{}", study_feature_label(model).to_lowercase());
        }
        ModelKind::IndividualVsNormative => {}
    }
    for region in &config.regions {
        let _ = write!(out, ".{}.{}", region.kind.tag(), sanitize(&region.name));
    }
    out
}

fn threshold_phrase(threshold: ThresholdType) -> &'static str {
    match threshold {
        ThresholdType::Percentage => "percentage",
        ThresholdType::Percentile => "percentile",
        ThresholdType::Beta => "beta coefficient",
        ThresholdType::T => "t",
        ThresholdType::MeanDif => "mean difference",
    }
}

fn study_feature_label(model: &StatModel) -> String {
    match model.study_feature_name() {
        Some(name) => name.to_string(),
        None => format!("feature {}", model.study_feature().unwrap_or(0)),
    }
}

fn feature_labels(model: &StatModel) -> Vec<String> {
    if !model.feature_names().is_empty() {
        return model.feature_names().to_vec();
    }
    let columns = (1..).take_while(|&c| model.feature_values(c).is_some());
    columns.map(|c| format!("feature {c}")).collect()
}

/// `a`, `a and b`, `a, b, and c`.
fn english_list(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [a, b] => format!("{a} and {b}"),
        [init @ .., last] => format!("{}, and {last}", init.join(", ")),
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '?' | ':' | '/' | '\\') { '_' } else { c })
        .collect()
}

fn format_fdr(value: f64) -> String {
    let s = format!("{value:.4}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}
