//! Atomic Utilities
//!
//! The word-sized primitives every protocol in isola is built from:
//! shared generation counters, the spin-wait used by every unbounded wait,
//! and the "spin until published" load for pointers.
//!
//! There are no timeouts. A waiter spins until its peer makes progress; the
//! only concession is a one-time `log::warn!` once a waiter has spun for
//! [`stuck_waiter_threshold`] rounds, so a wedged context is visible in logs.

use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::utils::{Backoff, CachePadded};

static STUCK_WAITER_WARN_SPINS: AtomicU64 = AtomicU64::new(1 << 22);

/// Set the spin count after which waiters report themselves as stuck
///
/// 0 disables the diagnostic. Called by `Runtime::new` from the config.
pub fn set_stuck_waiter_threshold(spins: u64) {
    STUCK_WAITER_WARN_SPINS.store(spins, Ordering::Relaxed);
}

/// Current stuck-waiter threshold
pub fn stuck_waiter_threshold() -> u64 {
    STUCK_WAITER_WARN_SPINS.load(Ordering::Relaxed)
}

/// SpinWait - the single retry/backoff primitive
///
/// Wraps `crossbeam::utils::Backoff` (busy-spin first, then yield to the OS
/// scheduler) and counts rounds for stuck-waiter diagnostics.
pub struct SpinWait {
    backoff: Backoff,
    spins: u64,
    warn_after: u64,
    what: &'static str,
}

impl SpinWait {
    /// Create a waiter labelled `what` for diagnostics
    pub fn new(what: &'static str) -> Self {
        Self {
            backoff: Backoff::new(),
            spins: 0,
            warn_after: stuck_waiter_threshold(),
            what,
        }
    }

    /// Back off once
    #[inline]
    pub fn snooze(&mut self) {
        self.backoff.snooze();
        self.spins += 1;
        if self.spins == self.warn_after {
            log::warn!(
                "thread {:?} has spun {} rounds waiting for {}; a peer context may be wedged",
                std::thread::current().id(),
                self.spins,
                self.what
            );
        }
    }

    /// Number of rounds spun so far
    pub fn spins(&self) -> u64 {
        self.spins
    }

    /// Spin until `condition` returns true
    #[inline]
    pub fn until<F>(what: &'static str, mut condition: F)
    where
        F: FnMut() -> bool,
    {
        if condition() {
            return;
        }
        let mut wait = SpinWait::new(what);
        while !condition() {
            wait.snooze();
        }
    }
}

/// Spin until the pointer is non-null and return it (acquire)
#[inline]
pub fn load_wait_ptr<T>(ptr: &AtomicPtr<T>, what: &'static str) -> *mut T {
    let mut value = ptr.load(Ordering::Acquire);
    if value.is_null() {
        let mut wait = SpinWait::new(what);
        loop {
            wait.snooze();
            value = ptr.load(Ordering::Acquire);
            if !value.is_null() {
                break;
            }
        }
    }
    value
}

/// Counter - a shared, cache-line padded generation counter
///
/// Cloning yields another handle to the same counter. Counters are what
/// `AwaitCounter` messages wait on.
#[derive(Clone, Default)]
pub struct Counter(Arc<CachePadded<AtomicU64>>);

impl Counter {
    /// Create a counter with an initial value
    pub fn new(value: u64) -> Self {
        Counter(Arc::new(CachePadded::new(AtomicU64::new(value))))
    }

    /// Load the current value (acquire)
    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Store a new value (release)
    #[inline]
    pub fn set(&self, value: u64) {
        self.0.store(value, Ordering::Release)
    }

    /// Full-barrier fetch-and-increment, returns the previous value
    #[inline]
    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    /// Full-barrier fetch-and-add, returns the previous value
    #[inline]
    pub fn add(&self, n: u64) -> u64 {
        self.0.fetch_add(n, Ordering::SeqCst)
    }

    /// Spin until the counter reaches at least `target`
    pub fn wait_until(&self, target: u64) {
        SpinWait::until("counter", || self.get() >= target);
    }

    /// Whether both handles refer to the same counter
    pub fn ptr_eq(&self, other: &Counter) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Counter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Counter").field(&self.get()).finish()
    }
}
