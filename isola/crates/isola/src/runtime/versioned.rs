//! Versioned Pointer - lock-free reads, serialized copy-on-write updates
//!
//! Readers take a single atomic load and never wait. A writer first claims
//! the runtime's exclusive turn (see [`turns`](super::turns)), which parks
//! every other context, then copies the current value, modifies the copy
//! and publishes it:
//!
//! ```text
//!  updater                                   every other context
//!  ───────                                   ───────────────────
//!  claim turn, broadcast await         ───▶  parked in poll
//!  value = f(current)
//!  store value, generation += 1
//!  release turn                        ───▶  released
//! ```
//!
//! Between `begin_update` and commit every other context is either parked
//! inside that await or asleep, so the updater may rely on nobody acting on
//! the old value concurrently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::context::ContextHandle;
use crate::logging::RuntimeEvent;
use crate::runtime::Runtime;

/// VersionedPtr - a published `Arc<T>` with a generation counter
///
/// # Examples
///
/// ```rust
/// use isola::{Runtime, RuntimeConfig, VersionedPtr};
///
/// let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
/// let ctx = runtime.enter().unwrap();
///
/// let ptr = VersionedPtr::new(vec![1u32]);
/// let update = ptr.begin_update(&ctx);
/// let mut next = update.current().clone();
/// next.push(2);
/// update.commit(next);
///
/// assert_eq!(*ptr.read(), vec![1, 2]);
/// assert_eq!(ptr.generation(), 1);
/// ```
pub struct VersionedPtr<T> {
    value: ArcSwap<T>,
    generation: AtomicU64,
}

impl<T> VersionedPtr<T> {
    pub fn new(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc(value: Arc<T>) -> Self {
        Self {
            value: ArcSwap::new(value),
            generation: AtomicU64::new(0),
        }
    }

    /// Current value
    #[inline]
    pub fn read(&self) -> Arc<T> {
        self.value.load_full()
    }

    /// Number of committed updates
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Wait for this context's turn, park every other context and return a
    /// ticket holding the current value
    pub fn begin_update(&self, ctx: &ContextHandle) -> PendingUpdate<'_, T> {
        self.begin_update_from(ctx.runtime(), Some(ctx))
    }

    /// [`begin_update`](Self::begin_update) for a caller that may have no
    /// context of its own
    pub(crate) fn begin_update_from(
        &self,
        runtime: &Runtime,
        ctx: Option<&ContextHandle>,
    ) -> PendingUpdate<'_, T> {
        let turn = runtime.turns().claim(runtime, ctx, "versioned pointer turn");
        PendingUpdate {
            ptr: self,
            runtime: runtime.clone(),
            turn,
            generation: self.generation(),
            current: self.value.load_full(),
            done: false,
        }
    }
}

impl<T: Default> Default for VersionedPtr<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for VersionedPtr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedPtr")
            .field("generation", &self.generation())
            .field("value", &self.read())
            .finish()
    }
}

/// PendingUpdate - exclusive right to replace a [`VersionedPtr`]'s value
///
/// Dropping the ticket without committing republishes the unchanged value
/// and still advances the generation, releasing everyone.
#[must_use = "every other context stays parked until the update is committed or dropped"]
pub struct PendingUpdate<'a, T> {
    ptr: &'a VersionedPtr<T>,
    runtime: Runtime,
    turn: u64,
    generation: u64,
    current: Arc<T>,
    done: bool,
}

impl<T> PendingUpdate<'_, T> {
    /// Value at the time the update began
    pub fn current(&self) -> &T {
        &self.current
    }

    pub fn current_arc(&self) -> &Arc<T> {
        &self.current
    }

    /// Generation of the value this update started from
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Publish `value` and release every parked context
    pub fn commit(self, value: T) {
        self.commit_arc(Arc::new(value))
    }

    pub fn commit_arc(mut self, value: Arc<T>) {
        self.publish(value);
    }

    fn publish(&mut self, value: Arc<T>) {
        self.done = true;
        self.ptr.value.store(value);
        self.ptr
            .generation
            .store(self.generation + 1, Ordering::Release);
        self.runtime.turns().release(self.turn);
        self.runtime.stats().record_pointer_update();
        self.runtime.events().log(RuntimeEvent::PointerUpdated {
            generation: self.generation + 1,
        });
    }
}

impl<T> Drop for PendingUpdate<'_, T> {
    fn drop(&mut self) {
        if !self.done {
            log::debug!(
                "versioned pointer update {} dropped without commit",
                self.generation
            );
            let unchanged = Arc::clone(&self.current);
            self.publish(unchanged);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;

    #[test]
    fn test_detached_update_without_contexts() {
        let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
        let ptr = VersionedPtr::new(1u32);

        let update = ptr.begin_update_from(&runtime, None);
        assert_eq!(*update.current(), 1);
        update.commit(2);

        assert_eq!(*ptr.read(), 2);
        assert_eq!(ptr.generation(), 1);
    }

    #[test]
    fn test_dropped_update_advances_generation() {
        let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
        let ptr = VersionedPtr::new("same");
        {
            let update = ptr.begin_update_from(&runtime, None);
            assert_eq!(update.generation(), 0);
        }
        assert_eq!(ptr.generation(), 1);
        assert_eq!(*ptr.read(), "same");

        let update = ptr.begin_update_from(&runtime, None);
        assert_eq!(update.generation(), 1);
        update.commit("next");
        assert_eq!(ptr.generation(), 2);
    }
}
