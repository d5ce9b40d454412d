//! End-to-end runs: fresh cell, workload, final observation, verdict.

use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use crate::cell::{AtomicCell, CellKind, CellValue, SharedCell};
use crate::error::Result;
use crate::strategy::UpdateStrategy;
use crate::verify::{RaceVerifier, VerificationResult};
use crate::workload::{ConcurrentWorkload, RunReport, WorkloadConfig};

/// One configured experiment. Each [`run`](Self::run) builds its own cell, so
/// experiments share no state and may themselves run in parallel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    /// Strategy every worker applies.
    pub strategy: UpdateStrategy,
    /// Threads and iterations.
    pub config: WorkloadConfig,
    /// Starting value of the cell; also fixes the cell kind.
    pub initial: CellValue,
}

/// Result of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Strategy that was applied.
    pub strategy: UpdateStrategy,
    /// Starting value of the cell.
    pub initial: CellValue,
    /// What the workload did.
    pub report: RunReport,
    /// Verdict on the final value.
    pub verification: VerificationResult,
}

/// Aggregate over repeated runs of one experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialSummary {
    /// Number of runs performed.
    pub trials: usize,
    /// Runs whose final value proved a lost update.
    pub races_detected: usize,
    /// Failed CAS attempts summed across every run.
    pub cas_retries: u64,
    /// The most damaging inconsistent run: largest counter deficit, or the
    /// first flag mismatch.
    pub worst: Option<VerificationResult>,
}

impl TrialSummary {
    /// Fraction of runs in which a race was detected.
    pub fn race_rate(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            self.races_detected as f64 / self.trials as f64
        }
    }
}

impl Experiment {
    /// An experiment on a cell of `kind` starting from `false` / `0`.
    pub const fn new(kind: CellKind, strategy: UpdateStrategy, config: WorkloadConfig) -> Self {
        Self {
            strategy,
            config,
            initial: kind.zero(),
        }
    }

    /// Replaces the starting value (and with it the cell kind).
    #[must_use]
    pub const fn with_initial(mut self, initial: CellValue) -> Self {
        self.initial = initial;
        self
    }

    /// Kind of cell under test.
    pub const fn kind(&self) -> CellKind {
        self.initial.kind()
    }

    /// Runs the workload once on a fresh cell and verifies the final value.
    ///
    /// # Errors
    /// Configuration and worker failures from [`ConcurrentWorkload`]. A run
    /// that fails is never verified.
    pub fn run(&self) -> Result<Outcome> {
        let workload = ConcurrentWorkload::new(self.config)?;
        let span = info_span!("experiment", kind = %self.kind(), strategy = %self.strategy);
        let _enter = span.enter();

        let cell = SharedCell::with_initial(self.initial);
        let report = match &cell {
            SharedCell::Flag(c) => workload.run(c, &self.strategy)?,
            SharedCell::Counter(c) => workload.run(c, &self.strategy)?,
        };
        let observed = cell.load();
        let verification =
            RaceVerifier::from_initial(self.initial).verify(observed, report.total_operations)?;

        if verification.consistent {
            info!(%observed, "final value matches serial execution");
        } else {
            warn!(
                expected = %verification.expected,
                %observed,
                "race detected: final value differs from serial execution"
            );
        }
        Ok(Outcome {
            strategy: self.strategy,
            initial: self.initial,
            report,
            verification,
        })
    }

    /// Repeats [`run`](Self::run) `trials` times and aggregates the verdicts.
    ///
    /// # Errors
    /// Stops at the first failed run and returns its error.
    pub fn trials(&self, trials: usize) -> Result<TrialSummary> {
        let mut summary = TrialSummary {
            trials,
            races_detected: 0,
            cas_retries: 0,
            worst: None,
        };
        for _ in 0..trials {
            let outcome = self.run()?;
            summary.cas_retries += outcome.report.cas_retries;
            let v = outcome.verification;
            if v.consistent {
                continue;
            }
            summary.races_detected += 1;
            let worse = match summary.worst {
                None => true,
                Some(w) => v.lost_updates() > w.lost_updates(),
            };
            if worse {
                summary.worst = Some(v);
            }
        }
        info!(
            trials,
            races = summary.races_detected,
            "trials complete"
        );
        Ok(summary)
    }
}

/// Runs one experiment on a statically typed cell the caller already owns.
///
/// The caller keeps the cell and can inspect it afterwards. The verdict is
/// relative to whatever the cell held when the call began.
///
/// # Errors
/// See [`Experiment::run`].
pub fn run_on<C: AtomicCell>(
    cell: &C,
    strategy: UpdateStrategy,
    config: WorkloadConfig,
) -> Result<(RunReport, VerificationResult)> {
    let initial = cell.snapshot();
    let report = ConcurrentWorkload::new(config)?.run(cell, &strategy)?;
    let verification =
        RaceVerifier::from_initial(initial).verify(cell.snapshot(), report.total_operations)?;
    Ok((report, verification))
}
