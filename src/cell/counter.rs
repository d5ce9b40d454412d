use core::fmt;
use core::sync::atomic::Ordering;

use super::{AtomicCell, AtomicU64, CellKind};

/// A shared scalar counter.
///
/// Arithmetic wraps on overflow, matching the hardware `fetch_add`.
#[repr(transparent)]
pub struct CounterCell {
    inner: AtomicU64,
}

impl CounterCell {
    /// Creates a new counter holding `value`.
    #[cfg(not(loom))]
    #[inline(always)]
    pub const fn new(value: u64) -> Self {
        Self {
            inner: AtomicU64::new(value),
        }
    }

    /// Creates a new counter holding `value`.
    #[cfg(loom)]
    pub fn new(value: u64) -> Self {
        Self {
            inner: AtomicU64::new(value),
        }
    }

    /// Adds `delta` in one indivisible step, returning the previous value.
    #[inline(always)]
    pub fn fetch_add(&self, delta: u64) -> u64 {
        self.inner.fetch_add(delta, Ordering::SeqCst)
    }
}

impl AtomicCell for CounterCell {
    type Value = u64;

    const KIND: CellKind = CellKind::Counter;

    #[inline(always)]
    fn load(&self) -> u64 {
        self.inner.load(Ordering::SeqCst)
    }

    #[inline(always)]
    fn store(&self, value: u64) {
        self.inner.store(value, Ordering::SeqCst);
    }

    #[inline(always)]
    fn compare_and_swap(&self, expected: &mut u64, desired: u64) -> bool {
        self.inner
            .compare_exchange(*expected, desired, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|actual| *expected = actual)
            .is_ok()
    }

    #[inline(always)]
    fn compare_and_swap_weak(&self, expected: &mut u64, desired: u64) -> bool {
        self.inner
            .compare_exchange_weak(*expected, desired, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|actual| *expected = actual)
            .is_ok()
    }

    #[inline(always)]
    fn fetch_step(&self) -> u64 {
        self.fetch_add(1)
    }

    #[inline(always)]
    fn step(value: u64) -> u64 {
        value.wrapping_add(1)
    }
}

impl Default for CounterCell {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for CounterCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CounterCell").field(&self.load()).finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn step_wraps_like_fetch_add() {
        let c = CounterCell::new(u64::MAX);
        assert_eq!(c.fetch_step(), u64::MAX);
        assert_eq!(c.load(), 0);
        assert_eq!(CounterCell::step(u64::MAX), 0);
    }

    #[test]
    fn failed_cas_reports_observed_value() {
        let c = CounterCell::new(5);
        let mut expected = 4;
        assert!(!c.compare_and_swap(&mut expected, 9));
        assert_eq!(expected, 5);
        assert_eq!(c.load(), 5);
        assert!(c.compare_and_swap(&mut expected, 9));
        assert_eq!(c.load(), 9);
    }
}
