//! Staging directory watcher.
//!
//! The watcher reacts to "directory contents may have changed" signals. For
//! every signal it lists the staging directory again and hands each eligible
//! file to the worker pool. Signals are not deduplicated: a file still in
//! staging during two passes is dispatched twice, and the mover turns the
//! second dispatch into a no-op.
//!
//! Signals come from a [`SignalSource`]: either the platform notification
//! backend via `notify`, or a manual channel driven by the caller.

use crate::config::{CompiledFilters, UnknownPolicy};
use crate::error::{SortError, SortResult};
use crate::file_organizer::{FileOrganizer, MoveOutcome, StagingEntry};
use crate::worker_pool::{PoolHandle, WorkerPool};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often the dispatcher re-checks the stop flag while idle.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// "The staging directory may have changed." Carries no detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal;

/// Sending side of a manual [`SignalSource`].
#[derive(Debug, Clone)]
pub struct SignalSender(mpsc::Sender<Signal>);

impl SignalSender {
    /// Delivers one signal. Returns `false` once the watcher is gone.
    pub fn signal(&self) -> bool {
        self.0.send(Signal).is_ok()
    }
}

/// A stream of change signals for the staging directory.
pub struct SignalSource {
    receiver: mpsc::Receiver<Signal>,
    backend: Option<RecommendedWatcher>,
}

impl SignalSource {
    /// A source fed by hand through the returned sender.
    pub fn manual() -> (SignalSender, SignalSource) {
        let (sender, receiver) = mpsc::channel();
        (
            SignalSender(sender),
            SignalSource {
                receiver,
                backend: None,
            },
        )
    }

    /// A source fed by the platform's filesystem notifications for `dir`
    /// (non-recursive). Every backend event becomes one signal.
    pub fn notify(dir: &Path) -> SortResult<SignalSource> {
        let (sender, receiver) = mpsc::channel();
        let mut backend = notify::recommended_watcher(move |event: notify::Result<Event>| {
            match event {
                Ok(_) => {
                    if sender.send(Signal).is_err() {
                        debug!("change signal dropped because the watcher stopped");
                    }
                }
                Err(error) => warn!(%error, "filesystem notification error"),
            }
        })?;
        backend.watch(dir, RecursiveMode::NonRecursive)?;

        Ok(SignalSource {
            receiver,
            backend: Some(backend),
        })
    }
}

impl std::fmt::Debug for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalSource")
            .field("backend", &self.backend.is_some())
            .finish()
    }
}

/// Lifecycle of a [`DirectoryWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Stopped,
    Running,
}

/// Counters describing what the watcher has done so far.
#[derive(Debug, Default)]
pub struct WatcherStats {
    passes: AtomicUsize,
    dispatched: AtomicUsize,
    moved: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl WatcherStats {
    /// Enumeration passes over the staging directory.
    pub fn passes(&self) -> usize {
        self.passes.load(Ordering::Acquire)
    }

    /// Entries handed to the worker pool.
    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::Acquire)
    }

    /// Dispatches that moved a file.
    pub fn moved(&self) -> usize {
        self.moved.load(Ordering::Acquire)
    }

    /// Dispatches that turned out to be no-ops.
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::Acquire)
    }

    /// Dispatches that failed; the file stays in staging.
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Acquire)
    }

    /// Dispatches that have finished one way or another.
    pub fn finished(&self) -> usize {
        self.moved() + self.skipped() + self.failed()
    }
}

struct Running {
    stop_flag: Arc<AtomicBool>,
    dispatcher: JoinHandle<()>,
    pool: WorkerPool,
    backend: Option<RecommendedWatcher>,
}

/// Watches the staging directory and files whatever appears in it.
pub struct DirectoryWatcher {
    staging_dir: PathBuf,
    organizer: Arc<FileOrganizer>,
    filters: Arc<CompiledFilters>,
    unknown: UnknownPolicy,
    pool_size: usize,
    stats: Arc<WatcherStats>,
    running: Option<Running>,
}

impl DirectoryWatcher {
    /// Creates a stopped watcher.
    pub fn new(
        staging_dir: PathBuf,
        organizer: Arc<FileOrganizer>,
        filters: Arc<CompiledFilters>,
        unknown: UnknownPolicy,
        pool_size: usize,
    ) -> Self {
        Self {
            staging_dir,
            organizer,
            filters,
            unknown,
            pool_size: pool_size.max(1),
            stats: Arc::new(WatcherStats::default()),
            running: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WatcherState {
        if self.running.is_some() {
            WatcherState::Running
        } else {
            WatcherState::Stopped
        }
    }

    /// Shared counters, valid across restarts.
    pub fn stats(&self) -> Arc<WatcherStats> {
        Arc::clone(&self.stats)
    }

    /// Starts the worker pool and the dispatcher.
    ///
    /// The dispatcher makes one pass over the staging directory straight
    /// away, then one pass per signal from `source`. Starting a running
    /// watcher does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if a thread cannot be spawned.
    pub fn start(&mut self, source: SignalSource) -> SortResult<()> {
        if self.running.is_some() {
            return Ok(());
        }

        let mut pool = WorkerPool::new(self.pool_size, "filesorter-worker")?;
        let Some(pool_handle) = pool.handle() else {
            pool.shutdown();
            return Err(SortError::WorkerSpawnFailed(std::io::Error::other(
                "worker pool closed before start",
            )));
        };
        let stop_flag = Arc::new(AtomicBool::new(false));
        let SignalSource { receiver, backend } = source;

        let context = DispatchContext {
            staging_dir: self.staging_dir.clone(),
            organizer: Arc::clone(&self.organizer),
            filters: Arc::clone(&self.filters),
            unknown: self.unknown,
            stats: Arc::clone(&self.stats),
            stop_flag: Arc::clone(&stop_flag),
            pool: pool_handle,
        };

        let dispatcher = thread::Builder::new()
            .name("filesorter-dispatch".to_owned())
            .spawn(move || run_dispatcher(context, receiver))
            .map_err(|e| {
                pool.shutdown();
                SortError::WorkerSpawnFailed(e)
            })?;

        info!(
            staging = %self.staging_dir.display(),
            workers = pool.size(),
            "watcher running"
        );
        self.running = Some(Running {
            stop_flag,
            dispatcher,
            pool,
            backend,
        });
        Ok(())
    }

    /// Stops accepting signals, lets in-flight moves finish, abandons queued
    /// ones and joins every thread. Stopping a stopped watcher does nothing.
    pub fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };

        running.stop_flag.store(true, Ordering::Release);
        drop(running.backend.take());

        if let Err(error) = running.dispatcher.join() {
            warn!(?error, "dispatcher thread panicked");
        }
        running.pool.shutdown();

        let abandoned = running.pool.stats().abandoned();
        info!(
            moved = self.stats.moved(),
            failed = self.stats.failed(),
            abandoned,
            "watcher stopped"
        );
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("staging_dir", &self.staging_dir)
            .field("state", &self.state())
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

struct DispatchContext {
    staging_dir: PathBuf,
    organizer: Arc<FileOrganizer>,
    filters: Arc<CompiledFilters>,
    unknown: UnknownPolicy,
    stats: Arc<WatcherStats>,
    stop_flag: Arc<AtomicBool>,
    pool: PoolHandle,
}

impl DispatchContext {
    fn stopping(&self) -> bool {
        self.stop_flag.load(Ordering::Acquire)
    }
}

fn run_dispatcher(context: DispatchContext, receiver: mpsc::Receiver<Signal>) {
    dispatch_pass(&context);

    while !context.stopping() {
        match receiver.recv_timeout(STOP_POLL_INTERVAL) {
            Ok(Signal) => {
                if context.stopping() {
                    break;
                }
                dispatch_pass(&context);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                debug!("signal source closed");
                break;
            }
        }
    }
}

/// Lists the staging directory and queues every eligible entry.
fn dispatch_pass(context: &DispatchContext) {
    context.stats.passes.fetch_add(1, Ordering::AcqRel);

    let entries = match enumerate_staging(&context.staging_dir, &context.filters) {
        Ok(entries) => entries,
        Err(error) => {
            warn!(%error, "skipping dispatch pass");
            return;
        }
    };

    for entry in entries {
        if context.stopping() {
            return;
        }

        let organizer = Arc::clone(&context.organizer);
        let stats = Arc::clone(&context.stats);
        let unknown = context.unknown;
        let queued = context.pool.submit(move || {
            match organizer.move_one(&entry, unknown) {
                Ok(MoveOutcome::Moved(_)) => {
                    stats.moved.fetch_add(1, Ordering::AcqRel);
                }
                Ok(MoveOutcome::Skipped(reason)) => {
                    debug!(name = %entry.display_name(), ?reason, "skipped");
                    stats.skipped.fetch_add(1, Ordering::AcqRel);
                }
                Err(error) => {
                    warn!(name = %entry.display_name(), %error, "could not file; left in staging");
                    stats.failed.fetch_add(1, Ordering::AcqRel);
                }
            }
        });

        if queued {
            context.stats.dispatched.fetch_add(1, Ordering::AcqRel);
        } else {
            return;
        }
    }
}

/// Current dispatchable entries of the staging directory: regular,
/// non-hidden files that pass the configured filters.
pub fn enumerate_staging(
    staging_dir: &Path,
    filters: &CompiledFilters,
) -> SortResult<Vec<StagingEntry>> {
    let entries = fs::read_dir(staging_dir).map_err(|e| SortError::StagingUnreadable {
        path: staging_dir.to_path_buf(),
        source: e,
    })?;

    Ok(entries
        .flatten()
        .map(|entry| StagingEntry::from_dir_entry(&entry))
        .filter(|entry| entry.is_regular_file && filters.should_include(&entry.display_name()))
        .collect())
}
