//! Monotonic identifier generation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Generator for unique, monotonically increasing identifiers
///
/// Every call to [`IdGenerator::next`] returns a value strictly greater than
/// any value previously returned by the same generator, from any thread.
pub struct IdGenerator {
    counter: AtomicU64,
}

impl IdGenerator {
    /// Create a new generator starting from 0
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create a generator whose first identifier is `first`
    pub const fn starting_at(first: u64) -> Self {
        Self {
            counter: AtomicU64::new(first),
        }
    }

    /// Claim the next identifier
    ///
    /// # Panics
    ///
    /// Panics if the 64-bit identifier space is exhausted.
    pub fn next(&self) -> u64 {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        if id == u64::MAX {
            panic!("identifier space exhausted");
        }
        id
    }

    /// Peek at the identifier the next call to `next` would return
    pub fn peek(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
