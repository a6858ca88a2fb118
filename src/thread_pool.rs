//! Worker threads for one permutation run.
//!
//! Each run gets its own pool of exactly `W` workers with an 8 MB stack.
//! With the `parallel` feature the workers live in a dedicated rayon pool
//! and are started with [`rayon::ThreadPool::broadcast`], which hands every
//! pool thread its index. A coordinator thread owns the pool so the caller
//! returns immediately and can join later.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::constants::WORKER_STACK_SIZE;
use crate::error::EngineError;

/// Cooperative stop signal shared by every worker of a run and its tracker.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A flag that is not set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder to stop at its next check.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether a stop was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Body run by every worker; receives the worker id in `0..W`.
pub type WorkerJob = Arc<dyn Fn(usize) + Send + Sync + 'static>;

/// Handle to a running set of workers.
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    threads: usize,
}

impl WorkerPool {
    /// Start `threads` workers running `job`.
    pub fn spawn(threads: usize, job: WorkerJob) -> Result<Self, EngineError> {
        let threads = threads.max(1);
        let handles = spawn_workers(threads, job)?;
        Ok(Self { handles, threads })
    }

    /// Number of workers.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Whether every worker has returned.
    pub fn is_finished(&self) -> bool {
        self.handles.iter().all(JoinHandle::is_finished)
    }

    /// Block until every worker has returned.
    pub fn join(self) {
        for handle in self.handles {
            // Worker bodies catch their own panics.
            let _ = handle.join();
        }
    }
}

#[cfg(feature = "parallel")]
fn spawn_workers(threads: usize, job: WorkerJob) -> Result<Vec<JoinHandle<()>>, EngineError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .stack_size(WORKER_STACK_SIZE)
        .thread_name(|i| format!("connectometry-worker-{i}"))
        .build()
        .map_err(|e| EngineError::Workers(e.to_string()))?;
    let coordinator = thread::Builder::new()
        .name("connectometry-run".into())
        .spawn(move || {
            pool.broadcast(|ctx| job(ctx.index()));
        })
        .map_err(|e| EngineError::Workers(e.to_string()))?;
    Ok(vec![coordinator])
}

#[cfg(not(feature = "parallel"))]
fn spawn_workers(threads: usize, job: WorkerJob) -> Result<Vec<JoinHandle<()>>, EngineError> {
    (0..threads)
        .map(|id| {
            let job = Arc::clone(&job);
            thread::Builder::new()
                .name(format!("connectometry-worker-{id}"))
                .stack_size(WORKER_STACK_SIZE)
                .spawn(move || job(id))
                .map_err(|e| EngineError::Workers(e.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_every_worker_id_runs_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let pool = WorkerPool::spawn(
            4,
            Arc::new(move |id| {
                sink.lock().unwrap().push(id);
            }),
        )
        .unwrap();
        assert_eq!(pool.threads(), 4);
        pool.join();
        let mut ids = seen.lock().unwrap().clone();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_zero_threads_runs_one_worker() {
        let pool = WorkerPool::spawn(0, Arc::new(|_| {})).unwrap();
        assert_eq!(pool.threads(), 1);
        pool.join();
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
        flag.reset();
        assert!(!other.is_cancelled());
    }
}
