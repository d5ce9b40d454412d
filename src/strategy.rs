//! Ways of applying one logical read-modify-write step to a cell.
//!
//! All three strategies share the same external contract. They differ only in
//! whether the read, the transform and the write form one indivisible unit:
//!
//! | Strategy | Composition | Linearizable |
//! |---|---|---|
//! | [`Naive`](UpdateStrategy::Naive) | `load`, transform, `store` | no |
//! | [`CasRetry`](UpdateStrategy::CasRetry) | `load`, transform, CAS, retry on conflict | yes |
//! | [`Fused`](UpdateStrategy::Fused) | one `fetch_add` / `fetch_xor` | yes |

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cell::AtomicCell;
use crate::error::{HarnessError, Result};

/// Something a worker can apply to a cell, once per iteration.
///
/// [`UpdateStrategy`] is the production implementation; the seam exists so
/// the workload driver can be exercised with arbitrary per-step behaviour.
pub trait Update<C: AtomicCell>: Sync {
    /// Applies one logical step to `cell`.
    ///
    /// Returns how many compare-and-swap attempts failed before the step took
    /// effect (zero for strategies that never retry).
    fn apply(&self, cell: &C) -> u64;
}

/// A stateless policy describing how one logical step reaches the cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateStrategy {
    /// Separate load and store. Concurrent steps can be lost.
    #[serde(rename = "naive")]
    Naive,
    /// Compare-and-swap loop; retries until no writer raced it.
    #[serde(rename = "cas")]
    CasRetry,
    /// A single fused atomic primitive.
    #[serde(rename = "fused")]
    Fused,
}

impl UpdateStrategy {
    /// Every strategy, unsafe one first.
    pub const ALL: [UpdateStrategy; 3] = [
        UpdateStrategy::Naive,
        UpdateStrategy::CasRetry,
        UpdateStrategy::Fused,
    ];

    /// Looks a strategy up by name (`naive`, `cas`, `fused`).
    ///
    /// Every strategy supports both cell kinds, so the kind never narrows the
    /// choice.
    ///
    /// # Errors
    /// Returns [`HarnessError::UnknownStrategy`] for any other name.
    pub fn select(name: &str) -> Result<Self> {
        name.parse()
    }

    /// Canonical name.
    pub const fn name(self) -> &'static str {
        match self {
            UpdateStrategy::Naive => "naive",
            UpdateStrategy::CasRetry => "cas",
            UpdateStrategy::Fused => "fused",
        }
    }

    /// Whether every application takes effect atomically at a single point,
    /// and so is guaranteed to reach the serial result.
    pub const fn is_linearizable(self) -> bool {
        !matches!(self, UpdateStrategy::Naive)
    }
}

impl<C: AtomicCell> Update<C> for UpdateStrategy {
    #[inline]
    fn apply(&self, cell: &C) -> u64 {
        match self {
            UpdateStrategy::Naive => {
                // Another worker's store may land between these two calls.
                let current = cell.load();
                cell.store(C::step(current));
                0
            }
            UpdateStrategy::CasRetry => {
                let mut retries = 0;
                let mut current = cell.load();
                // A failed CAS refreshes `current`; no sleep or backoff.
                loop {
                    let next = C::step(current);
                    if cell.compare_and_swap_weak(&mut current, next) {
                        break retries;
                    }
                    retries += 1;
                }
            }
            UpdateStrategy::Fused => {
                cell.fetch_step();
                0
            }
        }
    }
}

impl fmt::Display for UpdateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for UpdateStrategy {
    type Err = HarnessError;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "naive" => Ok(UpdateStrategy::Naive),
            "cas" | "cas-retry" | "casretry" => Ok(UpdateStrategy::CasRetry),
            "fused" => Ok(UpdateStrategy::Fused),
            _ => Err(HarnessError::UnknownStrategy(s.to_owned())),
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::cell::{CounterCell, FlagCell};

    #[test]
    fn single_threaded_steps_agree() {
        for strategy in UpdateStrategy::ALL {
            let counter = CounterCell::new(10);
            let flag = FlagCell::new(false);
            for _ in 0..3 {
                strategy.apply(&counter);
                strategy.apply(&flag);
            }
            assert_eq!(counter.load(), 13, "{strategy}");
            assert!(flag.load(), "{strategy}");
        }
    }

    #[test]
    fn select_accepts_canonical_names_and_aliases() {
        assert_eq!(UpdateStrategy::select("naive"), Ok(UpdateStrategy::Naive));
        assert_eq!(UpdateStrategy::select("CAS"), Ok(UpdateStrategy::CasRetry));
        assert_eq!(UpdateStrategy::select("cas-retry"), Ok(UpdateStrategy::CasRetry));
        assert_eq!(UpdateStrategy::select("fused"), Ok(UpdateStrategy::Fused));
        assert_eq!(
            UpdateStrategy::select("mutex"),
            Err(HarnessError::UnknownStrategy("mutex".into()))
        );
    }

    #[test]
    fn names_round_trip_through_display() {
        for strategy in UpdateStrategy::ALL {
            assert_eq!(strategy.to_string().parse::<UpdateStrategy>(), Ok(strategy));
        }
        assert!(!UpdateStrategy::Naive.is_linearizable());
        assert!(UpdateStrategy::CasRetry.is_linearizable());
        assert!(UpdateStrategy::Fused.is_linearizable());
    }
}
