//! Fiber tracking on statistic maps.
//!
//! The tracking algorithm itself is supplied by the caller through
//! [`TrackGenerator`]. This module prepares its inputs (seed voxels, seed
//! count, region constraints) and collects its output into length-filtered
//! track sets.

use serde::{Deserialize, Serialize};

use crate::constants::SEED_RATIO_SCALE;
use crate::database::Geometry;
use crate::thread_pool::CancelFlag;

/// One tracked fiber as flattened `x, y, z` coordinates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Streamline {
    coords: Vec<f32>,
}

impl Streamline {
    /// Wrap flattened coordinates; a trailing partial point is dropped.
    pub fn new(mut coords: Vec<f32>) -> Self {
        coords.truncate(coords.len() - coords.len() % 3);
        Self { coords }
    }

    /// Straight track through `points` evenly spaced points along x.
    pub fn straight(points: usize) -> Self {
        Self::new((0..points).flat_map(|i| [i as f32, 0.0, 0.0]).collect())
    }

    /// Flattened coordinates.
    pub fn coords(&self) -> &[f32] {
        &self.coords
    }

    /// Number of points.
    pub fn point_count(&self) -> usize {
        self.coords.len() / 3
    }

    /// Length in steps (points − 1), 0 for an empty track.
    pub fn length(&self) -> usize {
        self.point_count().saturating_sub(1)
    }
}

/// How a region constrains tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoiType {
    /// Tracks must pass through.
    Roi,
    /// Tracks must avoid.
    Roa,
    /// Tracks must end inside.
    End,
    /// Seeding is restricted to it.
    Seed,
    /// Tracking stops on entry.
    Terminate,
}

impl RoiType {
    /// Phrase used in the method summary.
    pub fn description(self) -> &'static str {
        match self {
            Self::Roi => "region of interest",
            Self::Roa => "region of avoidance",
            Self::End => "ending region",
            Self::Seed => "seeding region",
            Self::Terminate => "terminating region",
        }
    }

    /// Short tag used in output names.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Roi => "roi",
            Self::Roa => "roa",
            Self::End => "end",
            Self::Seed => "seed",
            Self::Terminate => "ter",
        }
    }
}

/// A set of voxels with a tracking role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Display name, used in reports and output names.
    pub name: String,
    /// Role of the region.
    pub kind: RoiType,
    /// Voxel indices in the database geometry.
    pub voxels: Vec<usize>,
}

/// Everything a tracker needs for one map.
#[derive(Debug, Clone)]
pub struct TrackingRequest<'a> {
    /// Volume the maps live in.
    pub geometry: &'a Geometry,
    /// Statistic map driving the tracking.
    pub field: &'a [f32],
    /// Fiber orientation per voxel.
    pub directions: &'a [[f32; 3]],
    /// Voxels above the tracking threshold; seeds go here, within any seed regions.
    pub seed_voxels: Vec<usize>,
    /// Number of seeds to place.
    pub seed_count: usize,
    /// Voxels below this value stop tracking.
    pub threshold: f32,
    /// Region constraints for the tracker to honor.
    pub regions: &'a [Region],
    /// Threads the tracker may use.
    pub threads: usize,
}

impl<'a> TrackingRequest<'a> {
    /// Build a request with seeds placed at `seeding_density` per mm³ over
    /// the voxels whose value exceeds `threshold`.
    ///
    /// Regions only constrain where the tracker may place seeds and which
    /// tracks it keeps; they never change the seed count, so a map with no
    /// suprathreshold voxel gets no seeds.
    pub fn new(
        geometry: &'a Geometry,
        field: &'a [f32],
        directions: &'a [[f32; 3]],
        threshold: f32,
        seeding_density: f64,
        regions: &'a [Region],
    ) -> Self {
        let seed_voxels: Vec<usize> = field
            .iter()
            .enumerate()
            .filter(|(_, &value)| value > threshold)
            .map(|(v, _)| v)
            .collect();
        let seed_count = (seed_voxels.len() as f64 * seeding_density * geometry.voxel_volume()
            / SEED_RATIO_SCALE) as usize;
        Self {
            geometry,
            field,
            directions,
            seed_voxels,
            seed_count,
            threshold,
            regions,
            threads: 1,
        }
    }

    /// Let the tracker use `threads` threads.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }
}

/// A fiber tracking algorithm.
///
/// Implementations must be usable from several workers at once and should
/// return early once `cancel` is set.
pub trait TrackGenerator: Send + Sync {
    /// Track `request.seed_count` seeds over `request.field`.
    fn generate(&self, request: &TrackingRequest<'_>, cancel: &CancelFlag) -> Vec<Streamline>;
}

impl<F> TrackGenerator for F
where
    F: Fn(&TrackingRequest<'_>, &CancelFlag) -> Vec<Streamline> + Send + Sync,
{
    fn generate(&self, request: &TrackingRequest<'_>, cancel: &CancelFlag) -> Vec<Streamline> {
        self(request, cancel)
    }
}

/// Run `generator` unless there is nothing to seed.
pub fn track(
    generator: &dyn TrackGenerator,
    request: &TrackingRequest<'_>,
    cancel: &CancelFlag,
) -> Vec<Streamline> {
    if request.seed_count == 0 || cancel.is_cancelled() {
        return Vec::new();
    }
    generator.generate(request, cancel)
}

/// Tracks kept for one subject and direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackCollection {
    tracks: Vec<Streamline>,
}

impl TrackCollection {
    /// Empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append tracks at least `length_threshold` long; returns how many were kept.
    pub fn append(&mut self, tracks: Vec<Streamline>, length_threshold: usize) -> usize {
        let before = self.tracks.len();
        self.tracks
            .extend(tracks.into_iter().filter(|t| t.length() >= length_threshold));
        self.tracks.len() - before
    }

    /// Drop exact duplicates, keeping the first occurrence.
    pub fn delete_repeated(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.tracks
            .retain(|t| seen.insert(t.coords.iter().map(|c| c.to_bits()).collect::<Vec<_>>()));
    }

    /// Remove every track.
    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    /// Stored tracks.
    pub fn tracks(&self) -> &[Streamline] {
        &self.tracks
    }

    /// Number of stored tracks.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether there are no tracks.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
