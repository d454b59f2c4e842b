//! Bounded parallel execution of finalized cells
//!
//! At most `max_workers` cells are in flight. Submitting beyond that blocks
//! the caller, which applies back-pressure to the input stream instead of
//! shedding work. Each worker writes its cell's batch to the shared sink in
//! one locked `write_all`, so batches of different cells never interleave.

use crate::parallel::{build_thread_pool, PoolConfig};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tinsimp_core::{CellId, CellJob, CellResult, Error, Result, TerrainPoint};

/// Computes the retained vertices of one cell
pub type CellFn = dyn Fn(&CellJob) -> Result<Vec<TerrainPoint>> + Send + Sync;

/// Configuration of the cell scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of cells in flight
    pub max_workers: usize,
    /// How long a blocked submit waits for a completion before re-checking
    pub poll_interval: Duration,
    /// Blocked longer than this and a warning is logged
    pub stall_warning: Duration,
    pub pool: PoolConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get().max(1),
            poll_interval: Duration::from_millis(50),
            stall_warning: Duration::from_secs(30),
            pool: PoolConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_stall_warning(mut self, stall_warning: Duration) -> Self {
        self.stall_warning = stall_warning;
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::InvalidConfig(
                "At least one worker is required".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "Poll interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Counters reported when the scheduler finishes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub dispatched: usize,
    pub completed: usize,
    pub failed: usize,
    /// Poll intervals spent blocked on a full pool
    pub stalls: usize,
    pub peak_live: usize,
    pub vertices_written: usize,
}

enum Report {
    Done { cell: CellId, vertices: usize },
    Failed { cell: CellId, message: String },
}

/// Runs cell jobs on a bounded pool and serializes their output
pub struct CellScheduler<W: Write + Send + 'static> {
    config: SchedulerConfig,
    pool: ThreadPool,
    sink: Arc<Mutex<W>>,
    worker: Arc<CellFn>,
    reports_tx: Sender<Report>,
    reports_rx: Receiver<Report>,
    live: usize,
    failure: Option<Error>,
    stats: SchedulerStats,
}

impl<W: Write + Send + 'static> CellScheduler<W> {
    pub fn new<F>(config: SchedulerConfig, sink: W, worker: F) -> Result<Self>
    where
        F: Fn(&CellJob) -> Result<Vec<TerrainPoint>> + Send + Sync + 'static,
    {
        config.validate()?;
        let pool = build_thread_pool(&config.pool.clone().with_threads(config.max_workers))?;
        let (reports_tx, reports_rx) = unbounded();
        Ok(Self {
            config,
            pool,
            sink: Arc::new(Mutex::new(sink)),
            worker: Arc::new(worker),
            reports_tx,
            reports_rx,
            live: 0,
            failure: None,
            stats: SchedulerStats::default(),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Cells dispatched whose completion has not been observed yet
    pub fn live(&self) -> usize {
        self.live
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Dispatch a cell, blocking while the pool is at capacity.
    ///
    /// A failure of any earlier cell is returned here instead of
    /// dispatching.
    pub fn submit(&mut self, job: CellJob) -> Result<()> {
        self.drain();
        self.check_failure()?;

        let blocked_since = Instant::now();
        let mut warned = false;
        while self.live >= self.config.max_workers {
            match self.reports_rx.recv_timeout(self.config.poll_interval) {
                Ok(report) => self.handle(report),
                Err(RecvTimeoutError::Timeout) => {
                    self.stats.stalls += 1;
                    if !warned && blocked_since.elapsed() >= self.config.stall_warning {
                        warn!(
                            "All {} workers busy for {:?}, cell {} is waiting",
                            self.config.max_workers,
                            blocked_since.elapsed(),
                            job.cell
                        );
                        warned = true;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "worker report channel closed",
                    )));
                }
            }
        }
        self.check_failure()?;

        self.spawn(job);
        Ok(())
    }

    /// Write a pass-through line under the sink lock
    pub fn write_line(&self, line: &str) -> Result<()> {
        let mut sink = lock_sink(&self.sink)?;
        sink.write_all(line.trim_end_matches(|c| c == '\r' || c == '\n').as_bytes())?;
        sink.write_all(b"\n")?;
        sink.flush()?;
        Ok(())
    }

    /// Wait for every in-flight cell and return the counters
    pub fn finish(&mut self) -> Result<SchedulerStats> {
        while self.live > 0 {
            match self.reports_rx.recv() {
                Ok(report) => self.handle(report),
                Err(_) => break,
            }
        }
        self.check_failure()?;
        Ok(self.stats.clone())
    }

    /// Wait for every in-flight cell and hand back the sink
    pub fn into_sink(mut self) -> Result<W> {
        self.finish()?;
        let sink = Arc::try_unwrap(self.sink).map_err(|_| {
            Error::Io(io::Error::new(
                io::ErrorKind::Other,
                "output sink still shared by a worker",
            ))
        })?;
        sink.into_inner().map_err(|_| poisoned())
    }

    fn spawn(&mut self, job: CellJob) {
        self.live += 1;
        self.stats.dispatched += 1;
        self.stats.peak_live = self.stats.peak_live.max(self.live);
        debug!(
            "Dispatching cell {} with {} points ({} live)",
            job.cell,
            job.points.len(),
            self.live
        );

        let sink = Arc::clone(&self.sink);
        let worker = Arc::clone(&self.worker);
        let reports = self.reports_tx.clone();
        self.pool.spawn(move || {
            let cell = job.cell;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_cell(&*worker, job, &sink)));
            // Release the sink before reporting so the owner can reclaim it
            drop(sink);
            let report = match outcome {
                Ok(Ok(vertices)) => Report::Done { cell, vertices },
                Ok(Err(e)) => Report::Failed {
                    cell,
                    message: e.to_string(),
                },
                Err(payload) => Report::Failed {
                    cell,
                    message: panic_message(payload.as_ref()),
                },
            };
            let _ = reports.send(report);
        });
    }

    fn drain(&mut self) {
        while let Ok(report) = self.reports_rx.try_recv() {
            self.handle(report);
        }
    }

    fn handle(&mut self, report: Report) {
        self.live = self.live.saturating_sub(1);
        match report {
            Report::Done { cell, vertices } => {
                self.stats.completed += 1;
                self.stats.vertices_written += vertices;
                debug!("Cell {} done: {} vertices", cell, vertices);
            }
            Report::Failed { cell, message } => {
                self.stats.failed += 1;
                warn!("Cell {} failed: {}", cell, message);
                if self.failure.is_none() {
                    self.failure = Some(Error::WorkerFailed { cell, message });
                }
            }
        }
    }

    fn check_failure(&mut self) -> Result<()> {
        match self.failure.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn run_cell<W: Write>(worker: &CellFn, job: CellJob, sink: &Mutex<W>) -> Result<usize> {
    let vertices = worker(&job)?;
    let count = vertices.len();
    let batch = CellResult {
        cell: job.cell,
        vertices,
        end_line: job.end_line,
    }
    .render();

    let mut sink = lock_sink(sink)?;
    sink.write_all(batch.as_bytes())?;
    sink.flush()?;
    Ok(count)
}

fn lock_sink<W>(sink: &Mutex<W>) -> Result<std::sync::MutexGuard<'_, W>> {
    sink.lock().map_err(|_| poisoned())
}

fn poisoned() -> Error {
    Error::Io(io::Error::new(io::ErrorKind::Other, "output sink lock poisoned"))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
