//! Fixed constants shared across the permutation pipeline.

/// Number of tract-length bins (1 mm each). Longer tracts saturate into the last bin.
pub const MAX_TRACT_LENGTH: usize = 200;

/// Seed used for resampling when the caller never reseeds a model.
pub const DEFAULT_SEED: u64 = 0;

/// Scale between `seeds × density × voxel volume` and the seed count handed to the tracker.
pub const SEED_RATIO_SCALE: f64 = 1000.0;

/// Fraction of the Otsu threshold of the fiber-presence map used as the fiber threshold.
pub const FIBER_THRESHOLD_RATIO: f64 = 0.6;

/// Histogram bins used by Otsu thresholding.
pub const OTSU_BINS: usize = 256;

/// Stack size for permutation worker threads.
pub const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

/// FDR above which a direction is reported as "no track".
pub const REPORTABLE_FDR: f64 = 0.5;
