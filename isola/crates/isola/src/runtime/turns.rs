//! Exclusive turns shared by every versioned pointer and the world stopper
//!
//! A turn is the right to hold every other context parked. Turns are
//! handed out in `fetch_add` order from one sequence per runtime, so two
//! updaters never park each other: whoever holds the current turn is never
//! waiting on a peer's turn.
//!
//! ```text
//!  claimant                                  every other context
//!  ────────                                  ───────────────────
//!  turn = next++
//!  spin (draining own queue)
//!    until completed == turn
//!  broadcast AwaitCounter(completed,   ───▶  poll: wait until
//!                         turn + 1)           completed >= turn + 1
//!  ... exclusive work ...
//!  completed = turn + 1                ───▶  released
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;

use crate::context::messaging;
use crate::context::{ContextHandle, ContextId};
use crate::message::Message;
use crate::runtime::Runtime;
use crate::util::{Counter, SpinWait};

const NO_HOLDER: u64 = 0;
const DETACHED_HOLDER: u64 = u64::MAX;

/// TurnSequencer - runtime-wide ticket lock whose waiters keep polling
pub struct TurnSequencer {
    next: CachePadded<AtomicU64>,
    completed: Counter,
    /// Holder id + 1, `DETACHED_HOLDER` or `NO_HOLDER`
    holder: AtomicU64,
}

impl TurnSequencer {
    pub fn new() -> Self {
        Self {
            next: CachePadded::new(AtomicU64::new(0)),
            completed: Counter::new(0),
            holder: AtomicU64::new(NO_HOLDER),
        }
    }

    /// Turns released so far
    pub fn completed(&self) -> u64 {
        self.completed.get()
    }

    /// Context holding the current turn, if a context holds it
    pub fn holder(&self) -> Option<ContextId> {
        match self.holder.load(Ordering::Acquire) {
            NO_HOLDER | DETACHED_HOLDER => None,
            encoded => Some(encoded - 1),
        }
    }

    /// Wait for the next turn and park every other context
    ///
    /// Claiming a second turn while holding one aborts the process: the
    /// claimant would wait for itself.
    pub(crate) fn claim(
        &self,
        runtime: &Runtime,
        ctx: Option<&ContextHandle>,
        what: &'static str,
    ) -> u64 {
        if let Some(ctx) = ctx {
            crate::ensure_invariant!(
                self.holder.load(Ordering::Acquire) != ctx.id() + 1,
                "context {} waited for a {} while holding the exclusive turn",
                ctx.id(),
                what
            );
        }

        let turn = self.next.fetch_add(1, Ordering::SeqCst);
        if self.completed.get() != turn {
            let mut wait = SpinWait::new(what);
            while self.completed.get() != turn {
                if let Some(ctx) = ctx {
                    ctx.poll();
                }
                wait.snooze();
            }
        }

        let holder = ctx.map_or(DETACHED_HOLDER, |ctx| ctx.id() + 1);
        self.holder.store(holder, Ordering::Release);

        messaging::broadcast_sync(
            runtime,
            ctx,
            Message::await_counter(&self.completed, turn + 1),
        );
        turn
    }

    /// Hand the sequence to the next claimant, releasing parked contexts
    pub(crate) fn release(&self, turn: u64) {
        crate::ensure_invariant!(
            self.completed.get() == turn,
            "released turn {} while turn {} is current",
            turn,
            self.completed.get()
        );
        self.holder.store(NO_HOLDER, Ordering::Release);
        self.completed.set(turn + 1);
    }
}

impl Default for TurnSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TurnSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnSequencer")
            .field("completed", &self.completed())
            .field("holder", &self.holder())
            .finish()
    }
}
