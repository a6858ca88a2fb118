//! Run lifecycle: validation before start, termination, worker failures.

use std::thread;
use std::time::{Duration, Instant};

use connectometry::{
    CancelFlag, Config, Database, Direction, EngineError, FdrCurve, Geometry, Histograms,
    LengthHistogram, ModelError, PermutationEngine, Resampling, RunStatus, StatModel, Streamline,
    ThresholdType, TrackingRequest, MAX_TRACT_LENGTH,
};
use proptest::prelude::*;

fn no_tracks(_: &TrackingRequest<'_>, _: &CancelFlag) -> Vec<Streamline> {
    Vec::new()
}

/// Sleeps in short slices so termination is noticed quickly.
fn slow_tracker(_: &TrackingRequest<'_>, cancel: &CancelFlag) -> Vec<Streamline> {
    for _ in 0..10 {
        if cancel.is_cancelled() {
            return Vec::new();
        }
        thread::sleep(Duration::from_millis(2));
    }
    vec![Streamline::straight(8)]
}

fn panicking_tracker(_: &TrackingRequest<'_>, _: &CancelFlag) -> Vec<Streamline> {
    panic!("tracker failed");
}

fn database(subjects: usize) -> Database {
    let geometry = Geometry::new([4, 2, 1], [10.0, 10.0, 10.0]).unwrap();
    let fields = (0..subjects)
        .map(|s| (0..8).map(|v| 1.0 + (s * v % 3) as f32 * 0.25).collect())
        .collect();
    Database::new(geometry, vec![1.0; 8], fields)
        .unwrap()
        .with_fiber_threshold(0.5)
}

/// Voxel 0 grows as 2^s and voxel 1 mirrors it, so equal groups always
/// differ and every draw reaches the tracker in both directions.
fn contrast_database(subjects: usize) -> Database {
    let geometry = Geometry::new([4, 2, 1], [10.0, 10.0, 10.0]).unwrap();
    let fields = (0..subjects)
        .map(|s| {
            let rise = (1u32 << s) as f32;
            let mut field = vec![1.0; 8];
            field[0] = rise;
            field[1] = 100.0 - rise;
            field
        })
        .collect();
    Database::new(geometry, vec![1.0; 8], fields)
        .unwrap()
        .with_fiber_threshold(0.5)
}

fn contrast_config(permutations: usize, threads: usize) -> Config {
    Config::default()
        .permutations(permutations)
        .threads(threads)
        .tracking_threshold(0.1)
        .resampling(Resampling::Permutation)
}

fn contrast_model(labels: Vec<i32>) -> StatModel {
    StatModel::group_difference(labels).with_threshold_type(ThresholdType::MeanDif)
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("connectometry=warn")
        .try_init();
}

/// Two-by-two group difference with a tracker that never finds anything.
#[test]
fn group_difference_without_tracks() {
    let mut engine = PermutationEngine::new(database(4), no_tracks)
        .with_config(Config::default().permutations(10).threads(1));
    engine.run(StatModel::group_difference(vec![0, 0, 1, 1])).unwrap();
    engine.wait();

    assert_eq!(engine.progress(), 100);
    assert_eq!(engine.histograms(), Histograms::default());
    let fdr = engine.calculate_fdr();
    assert_eq!(fdr.greater.len(), MAX_TRACT_LENGTH);
    assert!(fdr.greater.iter().chain(&fdr.lesser).all(|&f| f == 1.0));

    let summary = engine.summary().unwrap();
    assert!(summary.is_complete());
    assert!(summary.conclusion.contains("no track with increased connectivity in group 1"));
}

/// An unpaired code is reported before any worker starts.
#[test]
fn unresolved_pair_fails_synchronously() {
    let mut engine = PermutationEngine::new(database(4), no_tracks)
        .with_config(Config::default().permutations(10).threads(2));
    let err = engine
        .run(StatModel::paired_difference(vec![1, -1, 2, 0]))
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Model(ModelError::UnresolvedPair { code: 2, .. })
    ));
    assert!(!engine.is_running());
    assert_eq!(engine.progress(), 0);
}

/// The intercept column cannot be the tested feature.
#[test]
fn regression_study_feature_out_of_range() {
    let design: Vec<f64> = (0..4).flat_map(|s| [1.0, s as f64]).collect();
    let mut engine = PermutationEngine::new(database(4), no_tracks);

    for feature in [0, 2] {
        let err = engine
            .run(StatModel::multiple_regression(design.clone(), 2, feature))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Model(ModelError::StudyFeatureOutOfRange { feature_count: 2, .. })
        ));
    }
    assert!(!engine.is_running());
}

/// Clearing an idle engine does nothing, however often.
#[test]
fn clear_on_idle_engine() {
    let mut engine = PermutationEngine::new(database(4), no_tracks);
    engine.clear();
    engine.clear();
    assert!(!engine.is_running());
    assert!(!engine.is_terminated());
    assert_eq!(engine.progress(), 0);
}

/// Termination stops every worker and skips the final pass.
#[test]
fn terminate_stops_run() {
    init_logging();
    let mut engine = PermutationEngine::new(contrast_database(6), slow_tracker)
        .with_config(contrast_config(100_000, 2));
    engine.run(contrast_model(vec![0, 1, 0, 1, 0, 1])).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(engine.is_running());

    let start = Instant::now();
    engine.terminate();
    engine.wait();
    assert!(start.elapsed() < Duration::from_secs(5));

    assert!(engine.is_terminated());
    assert!(engine.progress() < 100);
    assert!(engine.results()[0].maps.is_none());
    assert_eq!(engine.summary().unwrap().status, RunStatus::Terminated);

    // No partial iteration was folded: observed never outruns null.
    let h = engine.histograms();
    assert!(h.greater.total() <= h.null_greater.total());
    assert!(h.null_greater.total() <= h.greater.total() + 2);
}

/// Starting a new run stops the previous one and clears the termination flag.
#[test]
fn run_replaces_active_run() {
    let mut engine = PermutationEngine::new(contrast_database(6), slow_tracker)
        .with_config(contrast_config(100_000, 2));
    let model = contrast_model(vec![0, 1, 0, 1, 0, 1]);
    engine.run(model.clone()).unwrap();
    thread::sleep(Duration::from_millis(20));

    engine.config_mut().permutation_count = 2;
    engine.run(model).unwrap();
    engine.wait();
    assert!(!engine.is_terminated());
    assert_eq!(engine.progress(), 100);
    assert_eq!(engine.histograms().greater.total(), 2);
}

/// Dropping a running engine joins its workers.
#[test]
fn drop_joins_workers() {
    let mut engine = PermutationEngine::new(contrast_database(6), slow_tracker)
        .with_config(contrast_config(100_000, 3));
    engine.run(contrast_model(vec![0, 1, 0, 1, 0, 1])).unwrap();
    let start = Instant::now();
    drop(engine);
    assert!(start.elapsed() < Duration::from_secs(5));
}

/// A panicking tracker ends its worker only; the engine stays usable.
#[test]
fn worker_panic_is_contained() {
    init_logging();
    let mut engine = PermutationEngine::new(contrast_database(4), panicking_tracker)
        .with_config(contrast_config(8, 2));
    engine.run(contrast_model(vec![0, 0, 1, 1])).unwrap();
    engine.wait();

    assert!(!engine.is_running());
    assert!(engine.progress() < 100);
    assert_eq!(engine.histograms(), Histograms::default());
    assert_eq!(engine.summary().unwrap().status, RunStatus::Failed);
}

/// FDR can be read while a run is in progress.
#[test]
fn fdr_during_run() {
    let mut engine = PermutationEngine::new(contrast_database(6), slow_tracker)
        .with_config(contrast_config(200, 2));
    engine.run(contrast_model(vec![0, 1, 0, 1, 0, 1])).unwrap();

    let mut last = 0;
    while engine.is_running() {
        let progress = engine.progress();
        assert!(progress >= last);
        last = progress;
        let fdr = engine.calculate_fdr();
        assert!(fdr.greater.iter().all(|&f| (0.0..=1.0).contains(&f)));
        if progress > 5 {
            engine.terminate();
        }
        thread::sleep(Duration::from_millis(5));
    }
    engine.wait();
}

proptest! {
    #[test]
    fn fdr_stays_in_unit_interval(
        observed in prop::collection::vec(0u64..50, MAX_TRACT_LENGTH),
        null in prop::collection::vec(0u64..50, MAX_TRACT_LENGTH),
    ) {
        let histograms = Histograms {
            greater: LengthHistogram::from_bins(observed.clone()),
            lesser: LengthHistogram::from_bins(null.clone()),
            null_greater: LengthHistogram::from_bins(null),
            null_lesser: LengthHistogram::from_bins(observed),
        };
        let fdr = FdrCurve::compute(&histograms);
        for direction in Direction::BOTH {
            for &f in fdr.get(direction) {
                prop_assert!((0.0..=1.0).contains(&f));
            }
        }
    }
}
