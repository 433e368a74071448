//! Bounded worker pool for fingerprint computation.
//!
//! Runs up to `concurrency` fingerprint computations at a time, collecting
//! results in completion order rather than dispatch order. Each dispatched
//! job gets its own single-slot completion channel; the dispatcher
//! multiplexes over all in-flight channels with [`crossbeam_channel::Select`]
//! and folds each result into the caller's sink the moment it arrives, so
//! completed jobs release their memory eagerly and partial progress is never
//! lost to a later failure.
//!
//! # Cleanup contract
//!
//! The in-flight set is a scoped resource: its `Drop` impl signals every
//! remaining worker to cancel and then joins it. Whether the dispatcher
//! returns normally, bails out on a spawn failure, stops because the
//! shutdown flag was raised, or unwinds from a panic, no worker thread is
//! left running or leaked. Results still in flight at that point are
//! discarded; results already collected stay in the sink.
//!
//! # Failure semantics
//!
//! A worker that fails to produce a fingerprint (decode error, panic,
//! channel closed early) maps its path to the absent marker and the pool
//! carries on. Only a failure of the pool machinery itself - inability to
//! spawn a worker - aborts the run with [`PoolError`].

use crossbeam_channel::{bounded, Receiver, Select};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;

use crate::phash::FingerprintProvider;

/// Fatal pool errors. Per-job fingerprint failures are not errors at this
/// level; they are folded into the result set as absent markers.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Spawning a worker thread failed (resource exhaustion).
    #[error("failed to spawn fingerprint worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of in-flight fingerprint computations.
    pub concurrency: usize,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get().max(1),
            shutdown_flag: None,
        }
    }
}

impl PoolConfig {
    /// Set the concurrency limit (clamped to at least 1).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Compute fingerprints for `paths`, feeding each result into `sink` as it
/// completes.
///
/// With `concurrency <= 1` this degenerates to a plain sequential loop in
/// input order, with no pool machinery engaged. Otherwise jobs are
/// dispatched to worker threads with at most `config.concurrency` in flight;
/// the dispatcher blocks only while waiting for capacity or for the final
/// drain.
///
/// If the shutdown flag is raised, dispatching stops, in-flight work is
/// cancelled and discarded, and `Ok(())` is returned - interruption is a
/// clean exit, and the caller decides what to do with the partial results
/// already in the sink.
pub fn run(
    paths: Vec<PathBuf>,
    provider: Arc<dyn FingerprintProvider>,
    config: &PoolConfig,
    sink: &mut dyn FnMut(PathBuf, Option<u64>),
) -> Result<(), PoolError> {
    if config.concurrency <= 1 {
        run_sequential(paths, provider.as_ref(), config, sink);
        Ok(())
    } else {
        run_with_spawner(paths, provider, config, sink, &ThreadSpawner)
    }
}

fn run_sequential(
    paths: Vec<PathBuf>,
    provider: &dyn FingerprintProvider,
    config: &PoolConfig,
    sink: &mut dyn FnMut(PathBuf, Option<u64>),
) {
    for path in paths {
        if config.is_shutdown_requested() {
            log::debug!("shutdown requested, stopping fingerprint computation");
            return;
        }
        let fingerprint = compute_one(provider, &path);
        sink(path, fingerprint);
    }
}

fn run_with_spawner(
    paths: Vec<PathBuf>,
    provider: Arc<dyn FingerprintProvider>,
    config: &PoolConfig,
    sink: &mut dyn FnMut(PathBuf, Option<u64>),
    spawner: &dyn Spawner,
) -> Result<(), PoolError> {
    let mut in_flight = InFlightSet::new();

    for path in paths {
        if config.is_shutdown_requested() {
            log::debug!("shutdown requested, discarding in-flight fingerprint work");
            return Ok(());
        }

        // Admission control: block until a slot frees up.
        while in_flight.len() >= config.concurrency {
            let (done, fingerprint) = in_flight.wait_ready();
            sink(done, fingerprint);
        }

        in_flight.dispatch(spawner, Arc::clone(&provider), path)?;
    }

    // Final drain.
    while !in_flight.is_empty() {
        if config.is_shutdown_requested() {
            log::debug!("shutdown requested, discarding in-flight fingerprint work");
            return Ok(());
        }
        let (done, fingerprint) = in_flight.wait_ready();
        sink(done, fingerprint);
    }

    Ok(())
}

/// Compute a single fingerprint, mapping provider failures to the absent
/// marker with a diagnostic.
fn compute_one(provider: &dyn FingerprintProvider, path: &Path) -> Option<u64> {
    match provider.fingerprint(path) {
        Ok(fingerprint) => Some(fingerprint),
        Err(e) => {
            log::warn!("failed to fingerprint {}: {}", path.display(), e);
            None
        }
    }
}

/// Seam for spawning worker threads, so tests can inject spawn failures and
/// observe worker lifecycles.
trait Spawner {
    fn spawn(
        &self,
        name: String,
        body: Box<dyn FnOnce() + Send>,
    ) -> std::io::Result<JoinHandle<()>>;
}

struct ThreadSpawner;

impl Spawner for ThreadSpawner {
    fn spawn(
        &self,
        name: String,
        body: Box<dyn FnOnce() + Send>,
    ) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new().name(name).spawn(body)
    }
}

/// A dispatched-but-not-yet-collected fingerprint computation.
struct PendingJob {
    path: PathBuf,
    rx: Receiver<Option<u64>>,
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// The set of in-flight jobs. Mutated only by the dispatcher; workers
/// communicate exclusively through their completion channel.
struct InFlightSet {
    jobs: Vec<PendingJob>,
    seq: u64,
}

impl InFlightSet {
    fn new() -> Self {
        Self {
            jobs: Vec::new(),
            seq: 0,
        }
    }

    fn len(&self) -> usize {
        self.jobs.len()
    }

    fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Spawn a worker for `path` and add it to the set.
    fn dispatch(
        &mut self,
        spawner: &dyn Spawner,
        provider: Arc<dyn FingerprintProvider>,
        path: PathBuf,
    ) -> Result<(), PoolError> {
        let (tx, rx) = bounded(1);
        let cancel = Arc::new(AtomicBool::new(false));

        let worker_path = path.clone();
        let worker_cancel = Arc::clone(&cancel);
        let body = move || {
            // Cancellation is checked once, before the (opaque, uninterruptible)
            // computation starts. A cancelled worker sends nothing; the closed
            // channel reads as an absent result if anyone still collects it.
            if worker_cancel.load(Ordering::SeqCst) {
                return;
            }
            let fingerprint = compute_one(provider.as_ref(), &worker_path);
            let _ = tx.send(fingerprint);
        };

        let name = format!("fingerprint-{}", self.seq);
        self.seq += 1;
        let handle = spawner
            .spawn(name, Box::new(body))
            .map_err(PoolError::Spawn)?;

        self.jobs.push(PendingJob {
            path,
            rx,
            cancel,
            handle,
        });
        Ok(())
    }

    /// Block until any in-flight job has a result ready, remove it from the
    /// set, and return its path and fingerprint.
    ///
    /// A worker that exits without sending (panic, cancellation) yields the
    /// absent marker.
    fn wait_ready(&mut self) -> (PathBuf, Option<u64>) {
        debug_assert!(!self.jobs.is_empty());

        let ready = {
            let mut select = Select::new();
            for job in &self.jobs {
                select.recv(&job.rx);
            }
            select.ready()
        };

        let job = self.jobs.swap_remove(ready);
        let fingerprint = job.rx.recv().unwrap_or_else(|_| {
            log::warn!(
                "fingerprint worker for {} exited without a result",
                job.path.display()
            );
            None
        });
        let _ = job.handle.join();
        (job.path, fingerprint)
    }
}

impl Drop for InFlightSet {
    fn drop(&mut self) {
        if self.jobs.is_empty() {
            return;
        }
        log::debug!("terminating {} in-flight fingerprint workers", self.jobs.len());
        for job in &self.jobs {
            job.cancel.store(true, Ordering::SeqCst);
        }
        for job in self.jobs.drain(..) {
            let _ = job.handle.join();
        }
    }
}
