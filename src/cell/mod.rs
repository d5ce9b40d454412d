//! Shared state under test.
//!
//! A cell wraps exactly one primitive value and exposes it **only** through
//! atomic operations. Every operation uses `SeqCst`, so all workers observe a
//! single total order of loads, stores, CAS and fetch operations on a cell.
//!
//! Two shapes exist:
//! - [`FlagCell`]: a single bit; one logical step is a toggle.
//! - [`CounterCell`]: a scalar counter; one logical step is `+1`.
//!
//! [`SharedCell`] selects between them at runtime for callers that only know
//! the kind as data (e.g. a command-line flag).

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

/// Bit specialization.
pub mod flag;
/// Integer specialization.
pub mod counter;

pub use counter::CounterCell;
pub use flag::FlagCell;

// Under `--cfg loom` the cells are built on loom's atomics so the model
// checker can explore every interleaving of the strategies.
#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicBool, AtomicU64};
#[cfg(not(loom))]
pub(crate) use core::sync::atomic::{AtomicBool, AtomicU64};

/// Atomic access to one primitive value.
///
/// Implementors must route every read and write of the wrapped value through a
/// single atomic primitive. Composing several of these calls is *not* atomic;
/// that gap is exactly what the naive strategy exposes.
pub trait AtomicCell: Send + Sync {
    /// The wrapped primitive.
    type Value: Copy + Eq + fmt::Debug + Send + Into<CellValue>;

    /// Which shape of state this cell holds.
    const KIND: CellKind;

    /// Returns the current value.
    fn load(&self) -> Self::Value;

    /// Replaces the current value.
    fn store(&self, value: Self::Value);

    /// Replaces the value with `desired` iff it currently equals `*expected`.
    ///
    /// On failure the value is left unchanged, `*expected` is overwritten with
    /// the value actually observed, and `false` is returned.
    fn compare_and_swap(&self, expected: &mut Self::Value, desired: Self::Value) -> bool;

    /// Like [`compare_and_swap`](Self::compare_and_swap) but may fail spuriously.
    ///
    /// Only suitable inside a retry loop.
    fn compare_and_swap_weak(&self, expected: &mut Self::Value, desired: Self::Value) -> bool;

    /// Applies one logical step as a single fused primitive, returning the
    /// value held *before* the step.
    fn fetch_step(&self) -> Self::Value;

    /// The pure transform of one logical step.
    fn step(value: Self::Value) -> Self::Value;

    /// Loads the current value as a kind-tagged [`CellValue`].
    #[inline]
    fn snapshot(&self) -> CellValue {
        self.load().into()
    }
}

/// The two supported shapes of shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    /// A single bit toggled by each step.
    Flag,
    /// A scalar counter incremented by each step.
    Counter,
}

impl CellKind {
    /// Both kinds, flag first.
    pub const ALL: [CellKind; 2] = [CellKind::Flag, CellKind::Counter];

    /// Canonical lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            CellKind::Flag => "flag",
            CellKind::Counter => "counter",
        }
    }

    /// The value a freshly created cell of this kind holds: `false` or `0`.
    pub const fn zero(self) -> CellValue {
        match self {
            CellKind::Flag => CellValue::Flag(false),
            CellKind::Counter => CellValue::Counter(0),
        }
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CellKind {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flag" | "bool" => Ok(CellKind::Flag),
            "counter" | "int" => Ok(CellKind::Counter),
            _ => Err(HarnessError::UnknownCellKind(s.to_owned())),
        }
    }
}

/// A value read from (or used to initialise) a cell, tagged with its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Value of a [`FlagCell`].
    Flag(bool),
    /// Value of a [`CounterCell`].
    Counter(u64),
}

impl CellValue {
    /// Kind of cell this value belongs to.
    pub const fn kind(self) -> CellKind {
        match self {
            CellValue::Flag(_) => CellKind::Flag,
            CellValue::Counter(_) => CellKind::Counter,
        }
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Flag(value)
    }
}

impl From<u64> for CellValue {
    fn from(value: u64) -> Self {
        CellValue::Counter(value)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Flag(v) => write!(f, "{v}"),
            CellValue::Counter(v) => write!(f, "{v}"),
        }
    }
}

/// A cell whose kind is chosen at runtime.
#[derive(Debug)]
pub enum SharedCell {
    /// Wraps a [`FlagCell`].
    Flag(FlagCell),
    /// Wraps a [`CounterCell`].
    Counter(CounterCell),
}

impl SharedCell {
    /// Creates a cell of `kind` holding its zero value.
    pub fn new(kind: CellKind) -> Self {
        Self::with_initial(kind.zero())
    }

    /// Creates a cell holding `initial`; the kind follows the value.
    pub fn with_initial(initial: CellValue) -> Self {
        match initial {
            CellValue::Flag(v) => SharedCell::Flag(FlagCell::new(v)),
            CellValue::Counter(v) => SharedCell::Counter(CounterCell::new(v)),
        }
    }

    /// Kind of the wrapped cell.
    pub fn kind(&self) -> CellKind {
        match self {
            SharedCell::Flag(_) => CellKind::Flag,
            SharedCell::Counter(_) => CellKind::Counter,
        }
    }

    /// Loads the current value.
    pub fn load(&self) -> CellValue {
        match self {
            SharedCell::Flag(c) => c.snapshot(),
            SharedCell::Counter(c) => c.snapshot(),
        }
    }
}
