//! Terminal output formatting with colors and box drawing.

use colored::Colorize;

use crate::constants::REPORTABLE_FDR;
use crate::result::{RunStatus, RunSummary};

/// Format a RunSummary for human-readable terminal output.
pub fn format_summary(summary: &RunSummary) -> String {
    let mut output = String::new();
    let sep = "\u{2500}".repeat(62);

    output.push_str("connectometry\n");
    output.push_str(&sep);
    output.push('\n');
    output.push('\n');

    output.push_str(&format!(
        "  Design: {} ({} statistic)\n",
        summary.kind, summary.threshold_type
    ));
    if let Some(feature) = &summary.study_feature {
        output.push_str(&format!("  Study feature: {feature}\n"));
    }
    output.push_str(&format!(
        "  Subjects: {} of {} in the population",
        summary.observations, summary.population
    ));
    if summary.patients > 0 {
        output.push_str(&format!(", {} patients", summary.patients));
    }
    output.push('\n');
    output.push_str(&format!(
        "  Permutations: {}  Threads: {}  Status: {} ({}%)\n",
        summary.config.permutation_count,
        summary.config.threads,
        format_status(summary.status),
        summary.progress
    ));
    output.push('\n');

    let length = summary.config.length_threshold;
    output.push_str(&format!("    FDR at {length} mm:\n"));
    output.push_str(&format!("      Greater: {}\n", format_fdr(summary.fdr_greater)));
    output.push_str(&format!("      Lesser:  {}\n", format_fdr(summary.fdr_lesser)));
    output.push('\n');

    for (i, subject) in summary.subjects.iter().enumerate() {
        output.push_str(&format!(
            "    Subject {}: {} greater tracks, {} lesser tracks\n",
            i + 1,
            subject.greater_tracks,
            subject.lesser_tracks
        ));
    }
    output.push('\n');
    output.push_str(&sep);
    output.push('\n');

    if summary.status == RunStatus::Terminated {
        output.push_str(&format!(
            "{}\n",
            "Note: The run was terminated; its histograms are incomplete.".yellow()
        ));
    }
    output.push_str(&summary.conclusion);
    output.push('\n');

    output
}

fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Running => "running".cyan().to_string(),
        RunStatus::Completed => "completed".green().to_string(),
        RunStatus::Terminated => "terminated".yellow().to_string(),
        RunStatus::Failed => "failed".red().bold().to_string(),
    }
}

fn format_fdr(fdr: f64) -> String {
    let text = format!("{fdr:.4}");
    if fdr > REPORTABLE_FDR {
        text.dimmed().to_string()
    } else {
        text.green().bold().to_string()
    }
}
