//! Serialization-consistency check on a cell's final value.
//!
//! Each logical step is `+1` or a toggle, so the serial outcome of `n` steps
//! depends only on `n` and the starting value:
//!
//! - counter: `initial + n` (wrapping)
//! - flag: `initial` flipped iff `n` is odd
//!
//! A final value that differs from this is proof that at least one update was
//! lost.
//!
//! # Limitations
//!
//! The check is necessary, not sufficient. For a flag only parity is
//! observable: two lost toggles cancel out and the run still looks consistent.
//! For a counter every step adds exactly one, so a deficit is always visible,
//! but its size is only a lower bound on the interleavings that occurred.

use serde::{Deserialize, Serialize};

use crate::cell::{CellKind, CellValue};
use crate::error::{HarnessError, Result};

/// Verdict for one run. Produced once and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Kind of cell that was checked.
    pub kind: CellKind,
    /// Value an atomic (serial) execution would have produced.
    pub expected: CellValue,
    /// Value actually read after all workers were joined.
    pub observed: CellValue,
    /// Whether `observed == expected`.
    pub consistent: bool,
}

impl VerificationResult {
    /// `true` when the observed value proves an update was lost.
    pub fn race_detected(&self) -> bool {
        !self.consistent
    }

    /// For counters, how far the observed value falls short of the serial one.
    ///
    /// The distance is taken modulo 2^64, so a deficit that straddles the wrap
    /// point is still counted. A counter that ends ahead of the serial value
    /// lost nothing and yields `Some(0)`. `None` for flags, where only parity
    /// is observable.
    pub fn lost_updates(&self) -> Option<u64> {
        match (self.expected, self.observed) {
            (CellValue::Counter(e), CellValue::Counter(o)) => {
                let deficit = e.wrapping_sub(o);
                // Distances in the upper half of the ring are an excess.
                Some(if deficit > u64::MAX / 2 { 0 } else { deficit })
            }
            _ => None,
        }
    }
}

/// Computes the expected final value of a run and compares it to what was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceVerifier {
    initial: CellValue,
}

impl RaceVerifier {
    /// A verifier for cells of `kind` that started at `false` / `0`.
    pub const fn new(kind: CellKind) -> Self {
        Self {
            initial: kind.zero(),
        }
    }

    /// A verifier for a cell that started at `initial`.
    pub const fn from_initial(initial: CellValue) -> Self {
        Self { initial }
    }

    /// Kind of cell this verifier accepts.
    pub const fn kind(&self) -> CellKind {
        self.initial.kind()
    }

    /// The value `total_operations` serial steps produce from the initial value.
    pub const fn expected(&self, total_operations: u64) -> CellValue {
        match self.initial {
            CellValue::Counter(start) => CellValue::Counter(start.wrapping_add(total_operations)),
            CellValue::Flag(start) => CellValue::Flag(start ^ (total_operations % 2 == 1)),
        }
    }

    /// Classifies `observed` as consistent or race-detected.
    ///
    /// Pure: identical inputs always yield identical results.
    ///
    /// # Errors
    /// [`HarnessError::KindMismatch`] if `observed` came from a different kind
    /// of cell. An inconsistent value is *not* an error.
    pub fn verify(&self, observed: CellValue, total_operations: u64) -> Result<VerificationResult> {
        let kind = self.kind();
        if observed.kind() != kind {
            return Err(HarnessError::KindMismatch {
                expected: kind,
                found: observed.kind(),
            });
        }
        let expected = self.expected(total_operations);
        Ok(VerificationResult {
            kind,
            expected,
            observed,
            consistent: observed == expected,
        })
    }
}

/// Verifies `observed` for a cell of `kind` that started at its zero value.
///
/// # Errors
/// See [`RaceVerifier::verify`].
pub fn verify(observed: CellValue, total_operations: u64, kind: CellKind) -> Result<VerificationResult> {
    RaceVerifier::new(kind).verify(observed, total_operations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_thousand_toggles_return_to_false() {
        let r = verify(CellValue::Flag(false), 10_000, CellKind::Flag).unwrap();
        assert_eq!(r.expected, CellValue::Flag(false));
        assert!(r.consistent);
        assert_eq!(r.lost_updates(), None);
    }

    #[test]
    fn counter_deficit_is_reported() {
        let r = verify(CellValue::Counter(49_990), 50_000, CellKind::Counter).unwrap();
        assert!(r.race_detected());
        assert_eq!(r.lost_updates(), Some(10));
    }

    #[test]
    fn counter_ahead_of_serial_value_lost_nothing() {
        let r = verify(CellValue::Counter(50_010), 50_000, CellKind::Counter).unwrap();
        assert!(r.race_detected());
        assert_eq!(r.lost_updates(), Some(0));
    }

    #[test]
    fn deficit_across_the_wrap_point_is_counted() {
        let v = RaceVerifier::from_initial(CellValue::Counter(u64::MAX - 5));
        // Serial value is 4 after wrapping; the cell stopped two short.
        let r = v.verify(CellValue::Counter(2), 10).unwrap();
        assert_eq!(r.expected, CellValue::Counter(4));
        assert_eq!(r.lost_updates(), Some(2));

        // Only one update landed before the wrap point.
        let r = v.verify(CellValue::Counter(u64::MAX - 4), 10).unwrap();
        assert_eq!(r.lost_updates(), Some(9));
    }

    #[test]
    fn odd_toggles_from_true_end_false() {
        let v = RaceVerifier::from_initial(CellValue::Flag(true));
        assert_eq!(v.expected(3), CellValue::Flag(false));
        assert_eq!(v.expected(4), CellValue::Flag(true));
    }

    #[test]
    fn mismatched_kind_is_an_error() {
        assert_eq!(
            verify(CellValue::Flag(true), 1, CellKind::Counter),
            Err(HarnessError::KindMismatch {
                expected: CellKind::Counter,
                found: CellKind::Flag,
            })
        );
    }
}
