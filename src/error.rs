//! Error types for harness operations.
//!
//! A detected race is *not* an error: it is reported as data through
//! [`VerificationResult`](crate::verify::VerificationResult). The variants here
//! cover misuse and runs that could not complete.

use thiserror::Error;

use crate::cell::CellKind;

/// Errors surfaced by the harness.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HarnessError {
    /// The workload configuration cannot be executed.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A worker did not complete its assigned iterations.
    #[error("worker {worker} failed: {reason}")]
    WorkerFailure {
        /// Index of the first worker that failed.
        worker: usize,
        /// Panic payload, or why the worker could not be spawned.
        reason: String,
    },

    /// No update strategy goes by this name.
    #[error("unknown strategy `{0}` (expected naive, cas or fused)")]
    UnknownStrategy(String),

    /// No cell kind goes by this name.
    #[error("unknown cell kind `{0}` (expected flag or counter)")]
    UnknownCellKind(String),

    /// An observed value was handed to a verifier built for another kind of cell.
    #[error("cell kind mismatch: verifier expects {expected}, observed value is {found}")]
    KindMismatch {
        /// Kind the verifier was built for.
        expected: CellKind,
        /// Kind of the value it was given.
        found: CellKind,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, HarnessError>;
