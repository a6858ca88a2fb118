//! The per-worker permutation loop and the final result pass.

use std::any::Any;
use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::database::{Database, Patients};
use crate::error::ModelError;
use crate::histogram::{HistogramSet, SeedCounters};
use crate::model::{draw_key, StatModel};
use crate::statistics::{calculate, StatisticMaps};
use crate::thread_pool::CancelFlag;
use crate::tracking::{self, Streamline, TrackCollection, TrackGenerator, TrackingRequest};
use crate::types::{Direction, ModelKind, Phase};

/// Progress and termination, the only state a caller polls during a run.
#[derive(Debug, Default)]
pub(crate) struct RunControl {
    cancel: CancelFlag,
    progress: AtomicU32,
}

impl RunControl {
    /// The single check point for cooperative cancellation.
    #[inline]
    pub(crate) fn should_stop(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn terminate(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub(crate) fn progress(&self) -> u32 {
        self.progress.load(Ordering::Acquire)
    }

    /// Only worker 0 writes progress.
    fn set_progress(&self, value: u32) {
        self.progress.store(value.min(100), Ordering::Release);
    }

    pub(crate) fn reset(&self) {
        self.cancel.reset();
        self.progress.store(0, Ordering::Release);
    }
}

/// Tracks and final maps of one study subject.
#[derive(Debug, Default)]
pub(crate) struct SubjectSlot {
    pub(crate) greater: Mutex<TrackCollection>,
    pub(crate) lesser: Mutex<TrackCollection>,
    pub(crate) maps: Mutex<Option<StatisticMaps>>,
}

impl SubjectSlot {
    pub(crate) fn tracks(&self, direction: Direction) -> &Mutex<TrackCollection> {
        match direction {
            Direction::Greater => &self.greater,
            Direction::Lesser => &self.lesser,
        }
    }
}

/// Accumulators written by the workers of one run.
#[derive(Debug)]
pub(crate) struct RunState {
    pub(crate) histograms: HistogramSet,
    pub(crate) seeds: SeedCounters,
    pub(crate) subjects: Vec<SubjectSlot>,
}

impl RunState {
    pub(crate) fn new(subjects: usize, permutations: usize) -> Self {
        let seeds = SeedCounters::default();
        seeds.reset(permutations);
        Self {
            histograms: HistogramSet::new(),
            seeds,
            subjects: (0..subjects).map(|_| SubjectSlot::default()).collect(),
        }
    }
}

/// Everything the workers of one run share.
pub(crate) struct RunContext {
    pub(crate) database: Arc<Database>,
    pub(crate) patients: Option<Arc<Patients>>,
    pub(crate) model: StatModel,
    pub(crate) generator: Arc<dyn TrackGenerator>,
    pub(crate) config: Config,
    pub(crate) threads: usize,
    pub(crate) control: Arc<RunControl>,
    pub(crate) state: Arc<RunState>,
}

impl RunContext {
    fn individual(&self) -> bool {
        self.model.kind() == ModelKind::IndividualVsNormative
    }

    /// Model for one study subject: the shared design, or a copy aimed at a patient.
    fn subject_model(&self, subject: usize) -> Cow<'_, StatModel> {
        if self.individual() {
            Cow::Owned(self.model.for_patient(subject))
        } else {
            Cow::Borrowed(&self.model)
        }
    }

    fn request<'a>(&'a self, maps: &'a StatisticMaps, direction: Direction, density: f64) -> TrackingRequest<'a> {
        TrackingRequest::new(
            self.database.geometry(),
            maps.get(direction),
            self.database.fiber_directions(),
            self.config.tracking_threshold,
            density,
            &self.config.regions,
        )
    }

    fn track_both(&self, maps: &StatisticMaps, density: f64, threads: usize) -> [(Vec<Streamline>, usize); 2] {
        Direction::BOTH.map(|direction| {
            let request = self.request(maps, direction, density).with_threads(threads);
            let tracks = tracking::track(self.generator.as_ref(), &request, self.control.cancel_flag());
            (tracks, request.seed_count)
        })
    }
}

/// Entry point of worker `id`. Never unwinds into the pool.
pub(crate) fn run_worker(ctx: &RunContext, id: usize) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        permutation_loop(ctx, id)?;
        if id == 0 && !ctx.control.should_stop() {
            finalize(ctx);
        }
        Ok::<(), ModelError>(())
    }));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(worker = id, error = %e, "permutation worker stopped"),
        Err(payload) => error!(
            worker = id,
            panic = %panic_message(payload.as_ref()),
            "permutation worker panicked"
        ),
    }
    if ctx.control.should_stop() {
        warn!(worker = id, "permutation worker terminated");
    }
}

/// Alternate null and observed draws; only observed draws advance `i`.
#[instrument(skip(ctx), fields(permutations = ctx.config.permutation_count))]
fn permutation_loop(ctx: &RunContext, id: usize) -> Result<(), ModelError> {
    let permutations = ctx.config.permutation_count;
    let subjects = ctx.state.subjects.len();
    let record_seeds = !ctx.individual();
    let mut phase = Phase::Null;
    let mut i = id;

    while i < permutations && !ctx.control.should_stop() {
        for subject in 0..subjects {
            let model = ctx.subject_model(subject);
            let resampled = model.resample(
                phase.is_null(),
                ctx.config.resampling,
                draw_key(i, phase, subject),
            )?;
            let maps = calculate(&resampled, &ctx.database, ctx.patients.as_deref(), ctx.config.normalize);
            if ctx.control.should_stop() {
                return Ok(());
            }

            let tracked = ctx.track_both(&maps, ctx.config.seeding_density, 1);
            if ctx.control.should_stop() {
                return Ok(());
            }
            for (direction, (tracks, seed_count)) in Direction::BOTH.into_iter().zip(tracked) {
                if record_seeds {
                    ctx.state.seeds.record(phase, direction, i, seed_count);
                }
                let counted = ctx.state.histograms.fold(phase, direction, &tracks);
                debug!(iteration = i, ?phase, ?direction, subject, tracks = counted, "folded");
                if phase == Phase::Observed && ctx.config.output_resampling {
                    ctx.state.subjects[subject]
                        .tracks(direction)
                        .lock()
                        .append(tracks, ctx.config.length_threshold);
                }
            }
        }

        if phase == Phase::Observed {
            i += ctx.threads;
            if id == 0 {
                // 100 is written only once the final pass completes.
                let percent = (100 * i / permutations.max(1)).min(99);
                ctx.control.set_progress(percent as u32);
            }
        }
        phase = phase.toggle();
    }
    Ok(())
}

/// Unresampled statistic pass per subject; worker 0 only.
#[instrument(skip(ctx))]
fn finalize(ctx: &RunContext) {
    let density = ctx.config.seeding_density * ctx.config.permutation_count as f64;
    for (subject, slot) in ctx.state.subjects.iter().enumerate() {
        if ctx.control.should_stop() {
            return;
        }
        let model = ctx.subject_model(subject);
        let maps = calculate(&model, &ctx.database, ctx.patients.as_deref(), ctx.config.normalize);
        if !ctx.config.output_resampling {
            let tracked = ctx.track_both(&maps, density, ctx.threads);
            if ctx.control.should_stop() {
                return;
            }
            for (direction, (tracks, _)) in Direction::BOTH.into_iter().zip(tracked) {
                let mut collection = TrackCollection::new();
                collection.append(tracks, ctx.config.length_threshold);
                *slot.tracks(direction).lock() = collection;
            }
        }
        *slot.maps.lock() = Some(maps);
    }
    ctx.control.set_progress(100);
    info!(subjects = ctx.state.subjects.len(), "permutation run finished");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Geometry;
    use crate::types::{Resampling, ThresholdType};

    fn context(generator: Arc<dyn TrackGenerator>, threads: usize) -> RunContext {
        let geometry = Geometry::new([2, 1, 1], [10.0, 10.0, 10.0]).unwrap();
        let database = Database::new(
            geometry,
            vec![1.0; 2],
            vec![vec![1.0, 2.0], vec![1.0, 2.0], vec![3.0, 2.0], vec![3.0, 2.0]],
        )
        .unwrap()
        .with_fiber_threshold(0.5);
        let mut model = StatModel::group_difference(vec![0, 0, 1, 1])
            .with_threshold_type(ThresholdType::MeanDif);
        model.pre_process().unwrap();
        let config = Config::default()
            .permutations(4)
            .threads(threads)
            .tracking_threshold(0.5)
            .length_threshold(0)
            .resampling(Resampling::Permutation);
        RunContext {
            database: Arc::new(database),
            patients: None,
            model,
            generator,
            config,
            threads,
            control: Arc::new(RunControl::default()),
            state: Arc::new(RunState::new(1, 4)),
        }
    }

    #[test]
    fn test_worker_zero_finalizes() {
        let tracker = |_: &TrackingRequest<'_>, _: &CancelFlag| vec![Streamline::straight(4)];
        let ctx = context(Arc::new(tracker), 1);
        run_worker(&ctx, 0);
        assert_eq!(ctx.control.progress(), 100);
        let slot = &ctx.state.subjects[0];
        assert_eq!(slot.greater.lock().len(), 1);
        assert!(slot.maps.lock().is_some());
    }

    #[test]
    fn test_panic_in_final_pass_stays_in_worker() {
        // Only the final pass hands the tracker more than one thread.
        let tracker = |request: &TrackingRequest<'_>, _: &CancelFlag| -> Vec<Streamline> {
            if request.threads > 1 {
                panic!("final pass failed");
            }
            vec![Streamline::straight(4)]
        };
        let ctx = context(Arc::new(tracker), 2);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_worker(&ctx, 0)));
        assert!(outcome.is_ok());
        assert!(ctx.control.progress() < 100);
        assert!(ctx.state.subjects[0].maps.lock().is_none());
        assert!(ctx.state.histograms.snapshot().greater.total() > 0);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
