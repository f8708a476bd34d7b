//! Stop-the-World Barrier
//!
//! One context at a time may hold every other context parked. The stopper
//! claims the runtime's exclusive turn (see [`turns`](super::turns)) and
//! keeps it until it resumes; releasing the turn releases every parked
//! context at once.
//!
//! ## Barrier States
//!
//! ```text
//! RUNNING (stopper = none) ──┐
//!     │ stop_the_world       │
//!     ▼                      │
//! STOPPING (turn claimed, broadcasting)
//!     │                      │
//!     ▼                      │
//! STOPPED (stopper = me) ────┘ resume: release turn
//! ```
//!
//! While the world is stopped, the stopper must not wait on any other
//! context: every peer is parked and cannot answer. Versioned-pointer
//! updates and context creation from the stopper abort the process;
//! synchronous sends to a parked peer never return.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::{ContextHandle, ContextId};
use crate::logging::RuntimeEvent;
use crate::util::Counter;

const NO_STOPPER: u64 = 0;

/// WorldStopper - the runtime's stop-the-world barrier
pub struct WorldStopper {
    generation: Counter,
    /// Stopper id + 1, or `NO_STOPPER`
    stopper: AtomicU64,
    /// Exclusive turn held by the stopper
    turn: AtomicU64,
}

impl WorldStopper {
    pub fn new() -> Self {
        Self {
            generation: Counter::new(0),
            stopper: AtomicU64::new(NO_STOPPER),
            turn: AtomicU64::new(0),
        }
    }

    /// Completed stop/resume cycles
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopper.load(Ordering::Acquire) != NO_STOPPER
    }

    /// Context currently holding the world stopped
    pub fn stopper(&self) -> Option<ContextId> {
        match self.stopper.load(Ordering::Acquire) {
            NO_STOPPER => None,
            encoded => Some(encoded - 1),
        }
    }

    /// Park every other context until [`resume`](Self::resume)
    ///
    /// Stopping twice from the same context aborts the process.
    pub fn stop(&self, ctx: &ContextHandle) {
        ctx.poll();

        let me = ctx.id() + 1;
        crate::ensure_invariant!(
            self.stopper.load(Ordering::Acquire) != me,
            "context {} stopped the world twice",
            ctx.id()
        );

        log::debug!("context {} stopping the world", ctx.id());
        let runtime = ctx.runtime();
        let turn = runtime.turns().claim(runtime, Some(ctx), "world stop turn");

        let previous = self.stopper.swap(me, Ordering::AcqRel);
        crate::ensure_invariant!(
            previous == NO_STOPPER,
            "context {} stopped the world while context {} held it",
            ctx.id(),
            previous.wrapping_sub(1)
        );
        self.turn.store(turn, Ordering::Release);

        runtime.stats().record_world_stop();
        runtime.events().log(RuntimeEvent::WorldStopped {
            by: ctx.id(),
            generation: self.generation.get(),
        });
    }

    /// Release the world stopped by `ctx`
    ///
    /// Resuming from any context but the stopper aborts the process.
    pub fn resume(&self, ctx: &ContextHandle) {
        let me = ctx.id() + 1;
        if let Err(actual) =
            self.stopper
                .compare_exchange(me, NO_STOPPER, Ordering::AcqRel, Ordering::Acquire)
        {
            crate::fatal!(
                "context {} resumed the world held by {:?}",
                ctx.id(),
                actual.checked_sub(1)
            );
        }

        let generation = self.generation.increment() + 1;
        ctx.runtime()
            .turns()
            .release(self.turn.load(Ordering::Acquire));
        ctx.runtime().events().log(RuntimeEvent::WorldResumed {
            by: ctx.id(),
            generation,
        });
        ctx.poll();
    }
}

impl Default for WorldStopper {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WorldStopper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldStopper")
            .field("generation", &self.generation())
            .field("stopper", &self.stopper())
            .finish()
    }
}

/// WorldStopped - the world stays stopped while this guard lives
#[must_use = "the world resumes as soon as the guard is dropped"]
pub struct WorldStopped<'a> {
    ctx: &'a ContextHandle,
    resumed: bool,
}

impl<'a> WorldStopped<'a> {
    pub(crate) fn new(ctx: &'a ContextHandle) -> Self {
        Self {
            ctx,
            resumed: false,
        }
    }

    /// Resume explicitly
    pub fn resume(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.resumed {
            self.resumed = true;
            self.ctx.runtime().world().resume(self.ctx);
        }
    }
}

impl Drop for WorldStopped<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
