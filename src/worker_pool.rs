//! Fixed-size pool of named worker threads.
//!
//! Jobs go onto an unbounded queue, so submitting never blocks. On
//! [`WorkerPool::shutdown`] jobs that have not started yet are abandoned,
//! jobs already running finish, and every thread is joined.

use crate::error::{SortError, SortResult};
use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Counters kept by a pool.
#[derive(Debug, Default)]
pub struct PoolStats {
    completed: AtomicUsize,
    abandoned: AtomicUsize,
    panicked: AtomicUsize,
}

impl PoolStats {
    /// Jobs that ran to completion (including ones that panicked).
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    /// Jobs dropped from the queue during shutdown.
    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::Acquire)
    }

    /// Jobs that panicked.
    pub fn panicked(&self) -> usize {
        self.panicked.load(Ordering::Acquire)
    }
}

/// Cloneable handle for submitting jobs to a [`WorkerPool`].
#[derive(Clone)]
pub struct PoolHandle {
    sender: mpsc::Sender<Job>,
    shutting_down: Arc<AtomicBool>,
}

impl PoolHandle {
    /// Queues `job`. Returns `false` if the pool is shutting down.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shutting_down.load(Ordering::Acquire) {
            return false;
        }
        self.sender.send(Box::new(job)).is_ok()
    }
}

impl std::fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolHandle")
            .field("shutting_down", &self.shutting_down.load(Ordering::Relaxed))
            .finish()
    }
}

/// A bounded set of worker threads sharing one job queue.
#[derive(Debug)]
pub struct WorkerPool {
    handle: Option<PoolHandle>,
    shutting_down: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    /// Spawns `size` threads named `{name}-{index}`.
    pub fn new(size: usize, name: &str) -> SortResult<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let shutting_down = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(PoolStats::default());

        let mut pool = Self {
            handle: Some(PoolHandle {
                sender,
                shutting_down: Arc::clone(&shutting_down),
            }),
            shutting_down: Arc::clone(&shutting_down),
            workers: Vec::with_capacity(size),
            stats: Arc::clone(&stats),
        };

        for index in 0..size.max(1) {
            let receiver = Arc::clone(&receiver);
            let shutting_down = Arc::clone(&shutting_down);
            let stats = Arc::clone(&stats);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", name, index))
                .spawn(move || worker_loop(&receiver, &shutting_down, &stats));

            match spawned {
                Ok(worker) => pool.workers.push(worker),
                Err(e) => {
                    pool.shutdown();
                    return Err(SortError::WorkerSpawnFailed(e));
                }
            }
        }

        Ok(pool)
    }

    /// A handle for submitting jobs. `None` after shutdown.
    pub fn handle(&self) -> Option<PoolHandle> {
        self.handle.clone()
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Shared counters.
    pub fn stats(&self) -> Arc<PoolStats> {
        Arc::clone(&self.stats)
    }

    /// Abandons queued jobs, waits for running ones and joins every thread.
    ///
    /// Threads exit once every [`PoolHandle`] clone has been dropped, so
    /// callers must drop theirs before (or while) this runs.
    pub fn shutdown(&mut self) {
        self.shutting_down.store(true, Ordering::Release);
        self.handle = None;

        for worker in self.workers.drain(..) {
            if let Err(error) = worker.join() {
                warn!(?error, "worker thread panicked during shutdown");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    receiver: &Mutex<mpsc::Receiver<Job>>,
    shutting_down: &AtomicBool,
    stats: &PoolStats,
) {
    loop {
        let job = {
            let receiver = receiver.lock();
            receiver.recv()
        };
        let Ok(job) = job else {
            break;
        };

        if shutting_down.load(Ordering::Acquire) {
            stats.abandoned.fetch_add(1, Ordering::AcqRel);
            debug!("abandoning queued job during shutdown");
            continue;
        }

        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            stats.panicked.fetch_add(1, Ordering::AcqRel);
            warn!("worker job panicked");
        }
        stats.completed.fetch_add(1, Ordering::AcqRel);
    }
}
