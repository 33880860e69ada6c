//! Shared event counter.

use portable_atomic::{AtomicU32, Ordering};

/// Monotonic event count, wrapping on overflow.
///
/// Written from the timer context or the interrupt context depending on the
/// variant, read from anywhere.
#[derive(Debug, Default)]
pub struct EventCounter(AtomicU32);

impl EventCounter {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Bumps the count and returns the new value.
    pub fn increment(&self) -> u32 {
        self.0.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }
}
