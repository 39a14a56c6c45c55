//! Lock-free signed accumulator.
//!
//! Used both as the running total of a [`RateCounter`](crate::RateCounter)
//! and as each bucket's partial sum.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// An atomically mutable signed 64-bit sum.
///
/// All operations are single atomic instructions and never block. Overflow
/// wraps around, as [`AtomicI64::fetch_add`] does.
///
/// # Example
///
/// ```rust
/// use rate_counter_core::Accumulator;
///
/// let acc = Accumulator::new();
/// acc.add(5);
/// acc.add(-2);
/// assert_eq!(acc.value(), 3);
/// ```
#[derive(Debug, Default)]
pub struct Accumulator {
    value: AtomicI64,
}

impl Accumulator {
    /// Creates a zeroed accumulator.
    pub const fn new() -> Self {
        Self {
            value: AtomicI64::new(0),
        }
    }

    /// Adds `delta` (positive or negative) to the sum.
    #[inline]
    pub fn add(&self, delta: i64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    /// Returns the current sum.
    #[inline]
    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Sets the sum back to zero.
    ///
    /// This is a plain store: an [`add`](Self::add) racing between a caller's
    /// [`value`](Self::value) and this store is lost. Use [`take`](Self::take)
    /// when the cleared amount must be accounted for.
    #[inline]
    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }

    /// Atomically sets the sum to zero and returns what it held.
    #[inline]
    pub fn take(&self) -> i64 {
        self.value.swap(0, Ordering::Relaxed)
    }
}

impl fmt::Display for Accumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}
