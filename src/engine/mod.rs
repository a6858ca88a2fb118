//! Permutation engine: runs null and observed draws on a worker pool and
//! accumulates tract-length histograms.
//!
//! # Example
//!
//! ```ignore
//! use connectometry::{Config, PermutationEngine, StatModel};
//!
//! let mut engine = PermutationEngine::new(database, my_tracker)
//!     .with_config(Config::quick().threads(4));
//! engine.run(StatModel::group_difference(labels))?;
//! while engine.is_running() {
//!     println!("{}%", engine.progress());
//!     std::thread::sleep(std::time::Duration::from_secs(1));
//! }
//! engine.wait();
//! let fdr = engine.calculate_fdr();
//! ```

mod save;
mod worker;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::database::{Database, Patients};
use crate::error::{EngineError, ModelError, Result};
use crate::fdr::FdrCurve;
use crate::histogram::{Histograms, SeedCounts};
use crate::model::StatModel;
use crate::output::{method_summary, parameter_suffix, result_sentence};
use crate::result::{RunStatus, RunSummary, SubjectSummary};
use crate::statistics::{calculate, StatisticMaps};
use crate::thread_pool::WorkerPool;
use crate::tracking::{TrackCollection, TrackGenerator};
use crate::types::{Direction, ModelKind};

pub use save::{map_file_name, no_track_file_name, track_file_name, ResultSink, SaveReport, SinkError};

use worker::{run_worker, RunContext, RunControl, RunState};

/// Tracks and final maps of one study subject after a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectResult {
    /// Tracks on the greater map.
    pub greater: TrackCollection,
    /// Tracks on the lesser map.
    pub lesser: TrackCollection,
    /// Unresampled statistic maps, present once the run has finished.
    pub maps: Option<StatisticMaps>,
}

impl SubjectResult {
    /// Tracks for one direction.
    pub fn tracks(&self, direction: Direction) -> &TrackCollection {
        match direction {
            Direction::Greater => &self.greater,
            Direction::Lesser => &self.lesser,
        }
    }
}

/// Orchestrates permutation runs over one population.
///
/// At most one run is active at a time; starting a run, [`clear`](Self::clear)
/// and dropping the engine all stop and join the previous one first.
pub struct PermutationEngine {
    database: Arc<Database>,
    patients: Option<Arc<Patients>>,
    generator: Arc<dyn TrackGenerator>,
    config: Config,
    model: Option<StatModel>,
    control: Arc<RunControl>,
    state: Arc<RunState>,
    pool: Option<WorkerPool>,
}

impl PermutationEngine {
    /// Engine over `database` tracking with `generator`.
    pub fn new(database: Database, generator: impl TrackGenerator + 'static) -> Self {
        Self {
            database: Arc::new(database),
            patients: None,
            generator: Arc::new(generator),
            config: Config::default(),
            model: None,
            control: Arc::new(RunControl::default()),
            state: Arc::new(RunState::new(0, 0)),
            pool: None,
        }
    }

    /// Replace the configuration used by the next run.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Attach study patients for individual analysis.
    pub fn with_patients(mut self, patients: Patients) -> Self {
        self.patients = Some(Arc::new(patients));
        self
    }

    /// Configuration of the next run.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mutable configuration of the next run.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// The population.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Study patients, if any.
    pub fn patients(&self) -> Option<&Patients> {
        self.patients.as_deref()
    }

    /// Model of the current or last run.
    pub fn model(&self) -> Option<&StatModel> {
        self.model.as_ref()
    }

    /// Remove a subject from the population. Stops any active run first.
    pub fn remove_subject(&mut self, index: usize) -> Result<()> {
        self.clear();
        Arc::make_mut(&mut self.database).remove_subject(index)?;
        Ok(())
    }

    /// Validate `model` and start a run in the background.
    ///
    /// Configuration errors are returned before any worker starts. A previous
    /// run is terminated and joined first.
    pub fn run(&mut self, mut model: StatModel) -> Result<()> {
        self.clear();
        model.pre_process()?;
        let subjects = self.study_subjects(&model)?;

        let threads = self.config.threads.max(1);
        self.state = Arc::new(RunState::new(subjects, self.config.permutation_count));
        self.control.reset();
        self.model = Some(model.clone());

        info!(
            kind = %model.kind(),
            threshold_type = %model.threshold_type(),
            permutations = self.config.permutation_count,
            threads,
            subjects,
            "starting permutation run"
        );
        let ctx = Arc::new(RunContext {
            database: Arc::clone(&self.database),
            patients: self.patients.clone(),
            model,
            generator: Arc::clone(&self.generator),
            config: self.config.clone(),
            threads,
            control: Arc::clone(&self.control),
            state: Arc::clone(&self.state),
        });
        let pool = WorkerPool::spawn(threads, Arc::new(move |id| run_worker(&ctx, id)))?;
        self.pool = Some(pool);
        Ok(())
    }

    /// Block until every worker of the current run has returned.
    pub fn wait(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.join();
        }
    }

    /// Ask the current run to stop at the next check point. Does not block.
    pub fn terminate(&self) {
        if self.pool.is_some() {
            warn!("terminating permutation run");
        }
        self.control.terminate();
    }

    /// Stop and join the current run, then clear the termination flag.
    ///
    /// Idempotent; progress and results of the last run stay readable.
    pub fn clear(&mut self) {
        if self.pool.is_some() {
            self.control.terminate();
            self.wait();
        }
        self.control.cancel_flag().reset();
    }

    /// Whether a run is in progress.
    pub fn is_running(&self) -> bool {
        self.pool.as_ref().is_some_and(|p| !p.is_finished())
    }

    /// Whether the current run was asked to stop.
    pub fn is_terminated(&self) -> bool {
        self.control.should_stop()
    }

    /// Progress of the current run, 0 to 100. 100 means the final pass completed.
    pub fn progress(&self) -> u32 {
        self.control.progress()
    }

    /// Copy of the four length histograms.
    pub fn histograms(&self) -> Histograms {
        self.state.histograms.snapshot()
    }

    /// Seed counts per permutation index (population designs only).
    pub fn seed_counts(&self) -> SeedCounts {
        self.state.seeds.snapshot()
    }

    /// FDR curves from a consistent snapshot of the histograms.
    ///
    /// May be called while a run is in progress.
    pub fn calculate_fdr(&self) -> FdrCurve {
        FdrCurve::compute(&self.histograms())
    }

    /// Copy of every study subject's tracks and final maps.
    pub fn results(&self) -> Vec<SubjectResult> {
        self.state
            .subjects
            .iter()
            .map(|slot| SubjectResult {
                greater: slot.greater.lock().clone(),
                lesser: slot.lesser.lock().clone(),
                maps: slot.maps.lock().clone(),
            })
            .collect()
    }

    /// Statistic maps of the unresampled model, for patient `patient` in
    /// individual analysis.
    pub fn calculate_spm(&self, model: &StatModel, patient: Option<usize>) -> Result<StatisticMaps> {
        let mut model = model.clone();
        model.pre_process()?;
        self.study_subjects(&model)?;
        if let Some(p) = patient {
            model = model.for_patient(p);
        }
        Ok(calculate(
            &model,
            &self.database,
            self.patients.as_deref(),
            self.config.normalize,
        ))
    }

    /// Otsu threshold of the unresampled statistic, a starting point for
    /// [`Config::tracking_threshold`].
    pub fn suggest_threshold(&self, model: &StatModel) -> Result<f32> {
        let patient = (model.kind() == ModelKind::IndividualVsNormative).then_some(0);
        Ok(self.calculate_spm(model, patient)?.suggest_threshold())
    }

    /// Number of study subjects `model` yields over this population.
    ///
    /// Fails when the model was built for another population size, or when
    /// an individual design has no patients to compare.
    fn study_subjects(&self, model: &StatModel) -> Result<usize> {
        if model.population_size() != self.database.subject_count() {
            return Err(ModelError::SubjectCountMismatch {
                what: "statistical model",
                expected: self.database.subject_count(),
                actual: model.population_size(),
            }
            .into());
        }
        match (model.kind(), &self.patients) {
            (ModelKind::IndividualVsNormative, Some(p)) => Ok(p.len()),
            (ModelKind::IndividualVsNormative, None) => {
                Err(EngineError::Patients("no patients were attached"))
            }
            _ => Ok(1),
        }
    }

    /// Summary of the current or last run.
    pub fn summary(&self) -> Result<RunSummary> {
        let model = self.model.as_ref().ok_or(EngineError::NotStarted)?;
        let fdr = self.calculate_fdr();
        let histograms = self.histograms();
        let results = self.results();
        let status = if self.is_running() {
            RunStatus::Running
        } else if self.progress() == 100 {
            RunStatus::Completed
        } else if self.is_terminated() {
            RunStatus::Terminated
        } else {
            RunStatus::Failed
        };
        let has_result = |direction| results.iter().any(|r| !r.tracks(direction).is_empty());
        let length = self.config.length_threshold;
        let population = self.database.subject_count();
        let patients = self.patients.as_ref().map_or(0, |p| p.len());
        Ok(RunSummary {
            kind: model.kind(),
            threshold_type: model.threshold_type(),
            study_feature: model.study_feature_name().map(str::to_owned),
            observations: model.observation_count(),
            population,
            patients,
            status,
            progress: self.progress(),
            fdr_greater: fdr.at(Direction::Greater, length),
            fdr_lesser: fdr.at(Direction::Lesser, length),
            subjects: results
                .iter()
                .map(|r| SubjectSummary {
                    greater_tracks: r.greater.len(),
                    lesser_tracks: r.lesser.len(),
                    has_maps: r.maps.is_some(),
                })
                .collect(),
            parameter_suffix: parameter_suffix(model, &self.config),
            method: method_summary(model, &self.config, population, patients),
            conclusion: result_sentence(
                model,
                &fdr,
                length,
                [has_result(Direction::Greater), has_result(Direction::Lesser)],
                None,
            ),
            config: self.config.clone(),
            histograms,
            fdr,
        })
    }
}

impl Drop for PermutationEngine {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for PermutationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermutationEngine")
            .field("subjects", &self.database.subject_count())
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("progress", &self.progress())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Geometry;
    use crate::thread_pool::CancelFlag;
    use crate::tracking::{Streamline, TrackingRequest};

    /// Emits one straight track per seed voxel, as long as the voxel index + 2.
    fn voxel_tracker(request: &TrackingRequest<'_>, _: &CancelFlag) -> Vec<Streamline> {
        request
            .seed_voxels
            .iter()
            .map(|&v| Streamline::straight(v + 3))
            .collect()
    }

    fn database() -> Database {
        let geometry = Geometry::new([8, 1, 1], [10.0, 10.0, 10.0]).unwrap();
        let subjects = (0..6)
            .map(|s| (0..8).map(|v| (s * v) as f32 * 0.1 + (s % 3) as f32).collect())
            .collect();
        Database::new(geometry, vec![1.0; 8], subjects)
            .unwrap()
            .with_fiber_threshold(0.5)
    }

    fn engine(permutations: usize, threads: usize) -> PermutationEngine {
        PermutationEngine::new(database(), voxel_tracker).with_config(
            Config::default()
                .permutations(permutations)
                .threads(threads)
                .tracking_threshold(0.5)
                .length_threshold(0)
                .resampling(crate::types::Resampling::Permutation),
        )
    }

    #[test]
    fn test_run_completes_with_balanced_counts() {
        let mut e = engine(8, 2);
        e.run(StatModel::group_difference(vec![0, 0, 0, 1, 1, 1]).with_threshold_type(crate::types::ThresholdType::MeanDif))
            .unwrap();
        e.wait();
        assert_eq!(e.progress(), 100);
        assert!(!e.is_running());
        let seeds = e.seed_counts();
        assert_eq!(seeds.greater.len(), 8);
        assert_eq!(seeds.null_greater.len(), 8);
        let results = e.results();
        assert_eq!(results.len(), 1);
        assert!(results[0].maps.is_some());
        let summary = e.summary().unwrap();
        assert_eq!(summary.status, RunStatus::Completed);
    }

    #[test]
    fn test_invalid_model_does_not_start() {
        let mut e = engine(4, 1);
        let err = e.run(StatModel::paired_difference(vec![1, 2, -1, 0, 0, 3])).unwrap_err();
        assert!(matches!(err, EngineError::Model(ModelError::UnresolvedPair { .. })));
        assert!(!e.is_running());
        assert!(matches!(e.summary(), Err(EngineError::NotStarted)));
    }

    #[test]
    fn test_population_mismatch_rejected() {
        let mut e = engine(4, 1);
        let err = e.run(StatModel::group_difference(vec![0, 1, 0, 1])).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Model(ModelError::SubjectCountMismatch { .. })
        ));
    }

    #[test]
    fn test_individual_requires_patients() {
        let mut e = engine(4, 1);
        let err = e.run(StatModel::individual_vs_normative(6)).unwrap_err();
        assert!(matches!(err, EngineError::Patients(_)));
    }

    #[test]
    fn test_statistic_maps_check_population() {
        let e = engine(4, 1);
        let model = StatModel::group_difference(vec![0, 1, 0, 1]);
        assert!(matches!(
            e.calculate_spm(&model, None),
            Err(EngineError::Model(ModelError::SubjectCountMismatch { expected: 6, actual: 4, .. }))
        ));
        assert!(matches!(
            e.suggest_threshold(&model),
            Err(EngineError::Model(ModelError::SubjectCountMismatch { .. }))
        ));

        let individual = StatModel::individual_vs_normative(6);
        assert!(matches!(e.suggest_threshold(&individual), Err(EngineError::Patients(_))));
        assert!(matches!(e.calculate_spm(&individual, Some(0)), Err(EngineError::Patients(_))));
    }

    #[test]
    fn test_clear_resets_flag_after_finished_run() {
        let mut e = engine(4, 2);
        e.run(StatModel::group_difference(vec![0, 0, 0, 1, 1, 1])).unwrap();
        e.terminate();
        e.wait();
        assert!(e.is_terminated());
        e.clear();
        assert!(!e.is_terminated());
    }

    #[test]
    fn test_completed_run_stays_completed_after_terminate() {
        let mut e = engine(4, 2);
        e.run(StatModel::group_difference(vec![0, 0, 0, 1, 1, 1])).unwrap();
        e.wait();
        e.terminate();
        assert!(e.is_terminated());
        assert_eq!(e.summary().unwrap().status, RunStatus::Completed);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut e = engine(4, 1);
        e.clear();
        e.clear();
        assert!(!e.is_terminated());
        assert_eq!(e.progress(), 0);
    }

    #[test]
    fn test_remove_subject_shrinks_population() {
        let mut e = engine(4, 1);
        e.remove_subject(5).unwrap();
        assert_eq!(e.database().subject_count(), 5);
        assert!(e.remove_subject(9).is_err());
    }
}
