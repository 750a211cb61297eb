//! Load driver: fan out one worker per connection and join them all.

use crate::payload::PayloadMode;
use crate::worker::{run_worker, Outcome, Target, Timeouts, WorkerError};
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Parameters for a single run
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub target: Target,
    pub concurrency: usize,
    /// Connections allowed open at once; `None` opens them all immediately.
    pub max_in_flight: Option<usize>,
    pub payload: PayloadMode,
    pub timeouts: Timeouts,
}

impl LoadConfig {
    pub fn new(target: Target, concurrency: usize) -> Self {
        LoadConfig {
            target,
            concurrency,
            max_in_flight: None,
            payload: PayloadMode::default(),
            timeouts: Timeouts::default(),
        }
    }
}

/// Sink for per-worker result lines.
///
/// Called from inside each worker task as soon as that worker is done, so
/// implementations must tolerate concurrent calls.
pub trait Reporter: Send + Sync + 'static {
    fn report(&self, outcome: &Outcome);
}

/// Writes one line per outcome to standard output.
pub struct StdoutReporter;

impl Reporter for StdoutReporter {
    fn report(&self, outcome: &Outcome) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{outcome}") {
            warn!(worker = outcome.worker, error = %e, "Failed to write outcome");
        }
    }
}

/// Totals for a finished run, tallied after the join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Load test completed in {:.6} seconds",
            self.elapsed.as_secs_f64()
        )
    }
}

/// Launch `config.concurrency` workers, wait for every one of them, and
/// return how long that took.
///
/// Worker failures are reported and counted but never abort the run.
pub async fn run<R: Reporter>(config: &LoadConfig, reporter: Arc<R>) -> RunSummary {
    let admission = config
        .max_in_flight
        .map(|limit| Arc::new(Semaphore::new(limit)));

    info!(
        target_addr = %config.target,
        concurrency = config.concurrency,
        max_in_flight = ?config.max_in_flight,
        payload = ?config.payload,
        "Starting load run"
    );

    let start = Instant::now();

    let handles: Vec<(usize, JoinHandle<bool>)> = (0..config.concurrency)
        .map(|id| {
            let target = config.target.clone();
            let payload = config.payload;
            let timeouts = config.timeouts;
            let admission = admission.clone();
            let reporter = Arc::clone(&reporter);

            let handle = tokio::spawn(async move {
                // Held until the worker's socket is gone.
                let _permit = match admission {
                    Some(sem) => sem.acquire_owned().await.ok(),
                    None => None,
                };

                let outcome = run_worker(id, &target, payload, timeouts).await;
                trace!(worker = id, command = ?outcome.command, "Worker done");
                reporter.report(&outcome);
                outcome.is_success()
            });

            (id, handle)
        })
        .collect();

    debug!(spawned = handles.len(), "All workers spawned");

    let mut succeeded = 0;
    let mut failed = 0;
    for (id, handle) in handles {
        match handle.await {
            Ok(true) => succeeded += 1,
            Ok(false) => failed += 1,
            Err(e) => {
                failed += 1;
                warn!(worker = id, error = %e, "Worker task did not finish");
                reporter.report(&Outcome {
                    worker: id,
                    command: None,
                    result: Err(WorkerError::Panicked(e.to_string())),
                });
            }
        }
    }

    let summary = RunSummary {
        attempted: config.concurrency,
        succeeded,
        failed,
        elapsed: start.elapsed(),
    };

    info!(
        attempted = summary.attempted,
        succeeded = summary.succeeded,
        failed = summary.failed,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "Load run finished"
    );

    summary
}
