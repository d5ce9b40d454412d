use core::fmt;
use core::sync::atomic::Ordering;

use super::{AtomicBool, AtomicCell, CellKind};

/// A shared single-bit flag.
///
/// Relies on `AtomicBool` being one atomic word on the target: a load can never
/// observe a torn value, which is what makes parity verification meaningful.
#[repr(transparent)]
pub struct FlagCell {
    inner: AtomicBool,
}

impl FlagCell {
    /// Creates a new flag holding `value`.
    #[cfg(not(loom))]
    #[inline(always)]
    pub const fn new(value: bool) -> Self {
        Self {
            inner: AtomicBool::new(value),
        }
    }

    /// Creates a new flag holding `value`.
    #[cfg(loom)]
    pub fn new(value: bool) -> Self {
        Self {
            inner: AtomicBool::new(value),
        }
    }

    /// XORs the flag with `mask` in one indivisible step, returning the previous value.
    #[inline(always)]
    pub fn fetch_xor(&self, mask: bool) -> bool {
        self.inner.fetch_xor(mask, Ordering::SeqCst)
    }
}

impl AtomicCell for FlagCell {
    type Value = bool;

    const KIND: CellKind = CellKind::Flag;

    #[inline(always)]
    fn load(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }

    #[inline(always)]
    fn store(&self, value: bool) {
        self.inner.store(value, Ordering::SeqCst);
    }

    #[inline(always)]
    fn compare_and_swap(&self, expected: &mut bool, desired: bool) -> bool {
        match self
            .inner
            .compare_exchange(*expected, desired, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => true,
            Err(actual) => {
                *expected = actual;
                false
            }
        }
    }

    #[inline(always)]
    fn compare_and_swap_weak(&self, expected: &mut bool, desired: bool) -> bool {
        match self
            .inner
            .compare_exchange_weak(*expected, desired, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => true,
            Err(actual) => {
                *expected = actual;
                false
            }
        }
    }

    #[inline(always)]
    fn fetch_step(&self) -> bool {
        self.fetch_xor(true)
    }

    #[inline(always)]
    fn step(value: bool) -> bool {
        !value
    }
}

impl Default for FlagCell {
    fn default() -> Self {
        Self::new(false)
    }
}

impl fmt::Debug for FlagCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FlagCell").field(&self.load()).finish()
    }
}
