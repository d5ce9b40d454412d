//! # `rmwcheck` - Lost-Update Detection Harness
//!
//! Holds one piece of shared mutable state, lets many OS threads apply a
//! read-modify-write step to it through an interchangeable update strategy,
//! and checks whether the final value matches what a serial execution would
//! have produced.
//!
//! ## Architecture
//!
//! 1. **Cells** ([`FlagCell`], [`CounterCell`], [`SharedCell`]):
//!    - One primitive value, reachable only through atomic operations
//!    - `load`, `store`, compare-and-swap, and a fused step (`fetch_xor` / `fetch_add`)
//!
//! 2. **Strategies** ([`UpdateStrategy`]):
//!    - `Naive`: `load` then `store`; two atomics that do not compose
//!    - `CasRetry`: compare-and-swap loop; linearizable
//!    - `Fused`: one hardware RMW; linearizable
//!
//! 3. **Workload** ([`ConcurrentWorkload`]):
//!    - `threads` scoped workers, `iterations` sequential steps each
//!    - Joins every worker; any abnormal exit fails the run
//!
//! 4. **Verification** ([`RaceVerifier`]):
//!    - Counter: expected `initial + threads * iterations`
//!    - Flag: expected `initial` flipped iff the total is odd
//!
//! ## Assumptions
//!
//! Parity checking presumes a load can never observe a torn flag. This holds
//! because `AtomicBool` has the size of `u8` and is a single atomic unit on
//! every supported target; the layout is asserted at compile time below.
//!
//! ## Example
//!
//! ```rust
//! use rmwcheck::{CellKind, Experiment, UpdateStrategy, WorkloadConfig};
//!
//! let outcome = Experiment::new(CellKind::Counter, UpdateStrategy::Fused, WorkloadConfig::new(4, 1_000))
//!     .run()
//!     .unwrap();
//! assert_eq!(outcome.report.total_operations, 4_000);
//! assert!(outcome.verification.consistent);
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod cell;
pub mod error;
pub mod experiment;
pub mod strategy;
pub mod verify;
pub mod workload;

pub use cell::{AtomicCell, CellKind, CellValue, CounterCell, FlagCell, SharedCell};
pub use error::{HarnessError, Result};
pub use experiment::{Experiment, Outcome, TrialSummary};
pub use strategy::{Update, UpdateStrategy};
pub use verify::{RaceVerifier, VerificationResult};
pub use workload::{ConcurrentWorkload, RunReport, WorkloadConfig};

#[cfg(not(loom))]
const _: () = {
    use core::mem;
    use core::sync::atomic::{AtomicBool, AtomicU64};

    // Cells are transparent over the primitive atomic.
    assert!(mem::size_of::<FlagCell>() == mem::size_of::<AtomicBool>());
    assert!(mem::size_of::<CounterCell>() == mem::size_of::<AtomicU64>());

    // A flag occupies one byte, so a load can never be torn.
    assert!(mem::size_of::<AtomicBool>() == 1);
};
