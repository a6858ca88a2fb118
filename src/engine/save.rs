//! Handing finished results to the caller's storage.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::PermutationEngine;
use crate::error::{EngineError, Result};
use crate::statistics::StatisticMaps;
use crate::tracking::TrackCollection;
use crate::types::Direction;

/// Error type returned by sinks.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Persistence for finished track sets and statistic maps.
///
/// `name` is the caller-supplied output name of one study subject; the
/// helper functions below give the conventional file names.
pub trait ResultSink {
    /// Store a non-empty track set.
    fn save_tracks(
        &mut self,
        name: &str,
        direction: Direction,
        tracks: &TrackCollection,
    ) -> std::result::Result<(), SinkError>;

    /// Record that a direction produced no tracks.
    fn save_no_tracks(&mut self, name: &str, direction: Direction) -> std::result::Result<(), SinkError>;

    /// Store the final statistic maps.
    fn save_maps(&mut self, name: &str, maps: &StatisticMaps) -> std::result::Result<(), SinkError>;
}

/// `<name>.<direction>.trk.gz`
pub fn track_file_name(name: &str, direction: Direction) -> String {
    format!("{name}.{}.trk.gz", direction.as_str())
}

/// `<name>.<direction>.no_trk.txt`
pub fn no_track_file_name(name: &str, direction: Direction) -> String {
    format!("{name}.{}.no_trk.txt", direction.as_str())
}

/// `<name>.fib.gz`
pub fn map_file_name(name: &str) -> String {
    format!("{name}.fib.gz")
}

/// What [`PermutationEngine::save_results`] wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReport {
    /// Track files written, by conventional name.
    pub saved: Vec<String>,
    /// Whether any subject had greater tracks.
    pub has_greater: bool,
    /// Whether any subject had lesser tracks.
    pub has_lesser: bool,
}

impl SaveReport {
    /// Whether `direction` produced tracks for any subject.
    pub fn has_result(&self, direction: Direction) -> bool {
        match direction {
            Direction::Greater => self.has_greater,
            Direction::Lesser => self.has_lesser,
        }
    }
}

impl PermutationEngine {
    /// Wait for the run, then write every subject's tracks and maps to `sink`.
    ///
    /// `names` holds one output name per study subject. Duplicate tracks
    /// are removed before saving.
    pub fn save_results(&mut self, names: &[String], sink: &mut dyn ResultSink) -> Result<SaveReport> {
        self.wait();
        if self.model.is_none() {
            return Err(EngineError::NotStarted);
        }
        if names.len() != self.state.subjects.len() {
            return Err(EngineError::OutputNames {
                names: names.len(),
                subjects: self.state.subjects.len(),
            });
        }

        let mut report = SaveReport::default();
        for (name, slot) in names.iter().zip(&self.state.subjects) {
            for direction in Direction::BOTH {
                let mut tracks = slot.tracks(direction).lock();
                if tracks.is_empty() {
                    sink.save_no_tracks(name, direction).map_err(EngineError::Sink)?;
                    continue;
                }
                tracks.delete_repeated();
                sink.save_tracks(name, direction, &tracks)
                    .map_err(EngineError::Sink)?;
                report.saved.push(track_file_name(name, direction));
                match direction {
                    Direction::Greater => report.has_greater = true,
                    Direction::Lesser => report.has_lesser = true,
                }
            }
            if let Some(maps) = slot.maps.lock().as_ref() {
                sink.save_maps(name, maps).map_err(EngineError::Sink)?;
            }
        }
        info!(files = report.saved.len(), "saved permutation results");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        assert_eq!(track_file_name("a.group", Direction::Greater), "a.group.greater.trk.gz");
        assert_eq!(no_track_file_name("a", Direction::Lesser), "a.lesser.no_trk.txt");
        assert_eq!(map_file_name("a"), "a.fib.gz");
    }
}
