//! Tab-separated FDR and length-distribution table.

use std::fmt::Write as _;

use crate::fdr::FdrCurve;
use crate::histogram::Histograms;

/// Header of [`fdr_table`].
pub const FDR_TABLE_HEADER: &str =
    "length\tfdr_greater\tfdr_lesser\tnull_greater\tnull_lesser\tgreater\tlesser";

/// One row per length from 1 mm to the last bin.
pub fn fdr_table(histograms: &Histograms, fdr: &FdrCurve) -> String {
    let mut out = String::from(FDR_TABLE_HEADER);
    out.push('\n');
    let bins = fdr.greater.len().min(fdr.lesser.len());
    for len in 1..bins {
        let _ = writeln!(
            out,
            "{len}\t{}\t{}\t{}\t{}\t{}\t{}",
            fdr.greater[len],
            fdr.lesser[len],
            bin(histograms.null_greater.bins(), len),
            bin(histograms.null_lesser.bins(), len),
            bin(histograms.greater.bins(), len),
            bin(histograms.lesser.bins(), len),
        );
    }
    out
}

fn bin(bins: &[u64], len: usize) -> u64 {
    bins.get(len).copied().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_TRACT_LENGTH;
    use crate::histogram::LengthHistogram;

    #[test]
    fn test_table_rows() {
        let mut bins = vec![0; MAX_TRACT_LENGTH];
        bins[3] = 4;
        let h = Histograms {
            greater: LengthHistogram::from_bins(bins.clone()),
            null_greater: LengthHistogram::from_bins(bins),
            ..Histograms::default()
        };
        let table = fdr_table(&h, &FdrCurve::compute(&h));
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], FDR_TABLE_HEADER);
        assert_eq!(lines.len(), MAX_TRACT_LENGTH);
        assert_eq!(lines[3], "3\t1\t1\t4\t0\t4\t0");
    }
}
