//! Concurrent execution of an [`Update`] against one shared cell.
//!
//! Every worker is a real OS thread (`std::thread::scope`), so all of them can
//! be inside an update at the same instant. Workers are held at a start gate
//! until the whole pool exists; releasing them together widens the window in
//! which non-atomic compositions can interleave.

use core::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::any::Any;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

use crate::cell::AtomicCell;
use crate::error::{HarnessError, Result};
use crate::strategy::Update;

const GATE_WAIT: u8 = 0;
const GATE_GO: u8 = 1;
const GATE_ABORT: u8 = 2;

/// Thread count and per-thread iteration count for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Number of concurrent workers.
    pub threads: usize,
    /// Number of updates each worker applies, sequentially.
    pub iterations: usize,
}

impl WorkloadConfig {
    /// Creates an (unvalidated) configuration.
    pub const fn new(threads: usize, iterations: usize) -> Self {
        Self {
            threads,
            iterations,
        }
    }

    /// Checks that the configuration describes a runnable workload.
    ///
    /// # Errors
    /// [`HarnessError::InvalidConfiguration`] if either count is zero or the
    /// total number of operations does not fit in a `u64`.
    pub fn validate(&self) -> Result<()> {
        self.checked_total().map(|_| ())
    }

    /// Total number of logical updates the workload attempts, `threads * iterations`.
    ///
    /// Saturates for configurations that [`validate`](Self::validate) rejects.
    pub fn total_operations(&self) -> u64 {
        (self.threads as u64).saturating_mul(self.iterations as u64)
    }

    fn checked_total(&self) -> Result<u64> {
        if self.threads == 0 {
            return Err(HarnessError::InvalidConfiguration(
                "thread count must be greater than zero".into(),
            ));
        }
        if self.iterations == 0 {
            return Err(HarnessError::InvalidConfiguration(
                "iterations per thread must be greater than zero".into(),
            ));
        }
        u64::try_from(self.threads)
            .ok()
            .zip(u64::try_from(self.iterations).ok())
            .and_then(|(t, i)| t.checked_mul(i))
            .ok_or_else(|| {
                HarnessError::InvalidConfiguration(format!(
                    "{} threads x {} iterations overflows the operation count",
                    self.threads, self.iterations
                ))
            })
    }
}

/// What a completed run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Configuration the run used.
    pub config: WorkloadConfig,
    /// Updates attempted across all workers; always `threads * iterations`.
    pub total_operations: u64,
    /// Failed compare-and-swap attempts summed over every worker.
    pub cas_retries: u64,
    /// Wall time from releasing the start gate to the last join.
    pub elapsed: Duration,
}

impl RunReport {
    /// Updates per second over the run.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_operations as f64 / secs
        } else {
            0.0
        }
    }
}

/// A validated workload, ready to be run any number of times.
#[derive(Debug, Clone, Copy)]
pub struct ConcurrentWorkload {
    config: WorkloadConfig,
    total: u64,
    #[cfg(test)]
    fail_spawn_at: Option<usize>,
}

impl ConcurrentWorkload {
    /// Validates `config` and wraps it.
    ///
    /// # Errors
    /// [`HarnessError::InvalidConfiguration`], see [`WorkloadConfig::validate`].
    pub fn new(config: WorkloadConfig) -> Result<Self> {
        let total = config.checked_total()?;
        Ok(Self {
            config,
            total,
            #[cfg(test)]
            fail_spawn_at: None,
        })
    }

    /// The configuration this workload runs.
    pub fn config(&self) -> WorkloadConfig {
        self.config
    }

    /// Spawns the workers, has each apply `update` to `cell` the configured
    /// number of times, and blocks until every worker has been joined.
    ///
    /// The reported operation count is read from a shared ledger that every
    /// worker bumps after each `apply`, independent of the cell under test.
    ///
    /// # Errors
    /// [`HarnessError::WorkerFailure`] if a worker could not be spawned or
    /// terminated abnormally. The cell then holds a partial result that must
    /// not be verified.
    pub fn run<C, U>(&self, cell: &C, update: &U) -> Result<RunReport>
    where
        C: AtomicCell,
        U: Update<C> + ?Sized,
    {
        let WorkloadConfig {
            threads,
            iterations,
        } = self.config;
        let kind = C::KIND;
        let span = info_span!("workload.run", %kind, threads, iterations);
        let _enter = span.enter();

        // Kept off the cell's cache line so bookkeeping does not perturb the
        // contention being measured.
        let applied = CachePadded::new(AtomicU64::new(0));
        let retries = CachePadded::new(AtomicU64::new(0));
        let gate = CachePadded::new(AtomicU8::new(GATE_WAIT));

        let (joined, elapsed) = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(threads);
            for worker in 0..threads {
                let (applied, retries, gate) = (&applied, &retries, &gate);
                let builder = thread::Builder::new().name(format!("rmw-worker-{worker}"));
                let spawned = self.check_spawn(worker).and_then(|()| {
                    builder.spawn_scoped(scope, move || {
                        loop {
                            match gate.load(Ordering::Acquire) {
                                GATE_WAIT => thread::yield_now(),
                                GATE_GO => break,
                                _ => return,
                            }
                        }
                        let mut local = 0u64;
                        for _ in 0..iterations {
                            local += update.apply(cell);
                            applied.fetch_add(1, Ordering::SeqCst);
                        }
                        retries.fetch_add(local, Ordering::SeqCst);
                        debug!(worker, retries = local, "worker finished");
                    })
                });

                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        // Release the already-spawned workers without running them.
                        gate.store(GATE_ABORT, Ordering::Release);
                        for handle in handles {
                            let _ = handle.join();
                        }
                        return (
                            Err(HarnessError::WorkerFailure {
                                worker,
                                reason: format!("failed to spawn: {e}"),
                            }),
                            Duration::ZERO,
                        );
                    }
                }
            }

            let started = Instant::now();
            gate.store(GATE_GO, Ordering::Release);
            let mut first_failure = None;
            for (worker, handle) in handles.into_iter().enumerate() {
                if let Err(payload) = handle.join() {
                    first_failure.get_or_insert(HarnessError::WorkerFailure {
                        worker,
                        reason: panic_message(payload.as_ref()),
                    });
                }
            }
            (first_failure.map_or(Ok(()), Err), started.elapsed())
        });
        joined?;

        // Every worker was joined without panicking, so each bumped the
        // ledger exactly `iterations` times.
        let recorded = applied.load(Ordering::SeqCst);
        debug_assert_eq!(recorded, self.total, "operation ledger out of step");

        let report = RunReport {
            config: self.config,
            total_operations: recorded,
            cas_retries: retries.load(Ordering::SeqCst),
            elapsed,
        };
        info!(
            total = report.total_operations,
            cas_retries = report.cas_retries,
            elapsed = ?report.elapsed,
            "workload complete"
        );
        Ok(report)
    }

    #[cfg(not(test))]
    #[allow(clippy::unused_self)]
    #[inline]
    fn check_spawn(&self, _worker: usize) -> io::Result<()> {
        Ok(())
    }

    #[cfg(test)]
    fn check_spawn(&self, worker: usize) -> io::Result<()> {
        if self.fail_spawn_at == Some(worker) {
            return Err(io::Error::other("injected spawn failure"));
        }
        Ok(())
    }
}

/// Validates the counts and runs `update` on `cell` in one call.
///
/// # Errors
/// See [`ConcurrentWorkload::new`] and [`ConcurrentWorkload::run`].
pub fn run<C, U>(cell: &C, update: &U, threads: usize, iterations: usize) -> Result<RunReport>
where
    C: AtomicCell,
    U: Update<C> + ?Sized,
{
    ConcurrentWorkload::new(WorkloadConfig::new(threads, iterations))?.run(cell, update)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_owned()
    }
}
