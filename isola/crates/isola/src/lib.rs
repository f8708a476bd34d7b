//! # isola - Multi-Context Runtime Core
//!
//! isola is the concurrency and heap-sharing core of a managed-language
//! runtime in which several independently scheduled execution contexts, each
//! backed by its own OS thread, cooperate by message passing instead of
//! through one shared mutable heap.
//!
//! ## Overview
//!
//! - **Private heaps**: every context allocates into its own arena that no
//!   other thread touches.
//! - **Promotion**: an object graph that must be seen by several contexts is
//!   deep-copied once into the shared heap. Sharing and cycles survive the
//!   copy.
//! - **Wait-free messaging**: each context owns a chunked MPSC queue. Any
//!   context may enqueue; only the owner dequeues.
//! - **Versioned pointers**: shared registries are published as `Arc`s.
//!   Readers never wait; a writer parks every other context for the length
//!   of its update.
//! - **Stop-the-world**: one context at a time can hold all others parked.
//!   World stops and pointer updates take turns from one runtime-wide
//!   sequence, so they never park each other.
//!
//! ## Quick Start
//!
//! ```rust
//! use isola::{Message, Runtime, RuntimeConfig, Value};
//! use isola::util::Counter;
//!
//! fn main() -> isola::Result<()> {
//!     let runtime = Runtime::new(RuntimeConfig::default())?;
//!     let mut main = runtime.enter()?;
//!
//!     // Share a private pair with other contexts.
//!     let pair = main.heap_mut().alloc(0, vec![Value::int(1), Value::int(2)])?;
//!     let shared = main.globalize(Value::Local(pair))?;
//!     assert!(shared.as_global().is_some());
//!
//!     // Park a worker on a counter, then release it.
//!     let counter = Counter::new(0);
//!     let seen = counter.clone();
//!     let worker = main.spawn(move |ctx| ctx.poll_until(|| seen.get() >= 1))?;
//!     let ticket = main.send(&worker, Message::await_counter(&counter, 1));
//!     counter.set(1);
//!     main.sync_send(&ticket, false);
//!
//!     main.await_shutdown(&worker)?;
//!     main.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Runtime                              │
//! │  registry: VersionedPtr<ContextSet>   world: WorldStopper     │
//! │  heap: SharedHeap                     stats / events          │
//! │  turns: TurnSequencer                                         │
//! └───────────────┬───────────────────────────────┬──────────────┘
//!                 │                               │
//!     ┌───────────▼──────────┐        ┌───────────▼──────────┐
//!     │ ContextHandle (T1)   │  send  │ ContextHandle (T2)   │
//!     │  PrivateHeap         │───────▶│  MessageQueue        │
//!     │  ForwardingTable     │◀───────│  PrivateHeap         │
//!     └──────────────────────┘        └──────────────────────┘
//! ```
//!
//! ## Thread Safety
//!
//! - `Runtime`, `Context` and `SharedHeap` are `Send + Sync`.
//! - `ContextHandle` is neither: it is the thread's identity as a context
//!   and the sole consumer of its queue.
//! - Waits never time out. A context that stops polling wedges every peer
//!   that needs it; waiters log a warning after
//!   `RuntimeConfig::stuck_waiter_warn_spins` rounds.
//!
//! ## Modules
//!
//! - [`config`]: Runtime tuning parameters and validation
//! - [`context`]: Contexts, their handles and message passing
//! - [`error`]: Error types and the fatal-error path
//! - [`heap`]: Private and shared object stores
//! - [`logging`]: Runtime events
//! - [`message`]: Messages and the wait-free queue
//! - [`object`]: Values, headers and object handles
//! - [`promote`]: Forwarding table and graph promotion
//! - [`runtime`]: Registry, exclusive turns, versioned pointers and the
//!   stop-the-world barrier
//! - [`stats`]: Runtime counters
//! - [`util`]: Spin-waits and shared counters

pub mod config;
pub mod error;
pub mod logging;

pub mod context;
pub mod message;
pub mod runtime;

pub mod heap;
pub mod object;
pub mod promote;

pub mod stats;
pub mod util;

pub use config::RuntimeConfig;
pub use context::{current_context_id, Context, ContextHandle, ContextId};
pub use error::{IsolaError, Result};
pub use message::{Message, MessageInFlight};
pub use object::{GlobalRef, LocalRef, Value};
pub use runtime::{Runtime, VersionedPtr, WorldStopped};

/// isola version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create a runtime with default configuration
pub fn init() -> Result<Runtime> {
    Runtime::new(RuntimeConfig::default())
}

/// Create a runtime with configuration taken from `ISOLA_*` environment
/// variables
pub fn init_from_env() -> Result<Runtime> {
    Runtime::new(RuntimeConfig::from_env())
}

static_assertions::assert_impl_all!(Runtime: Send, Sync, Clone);
static_assertions::assert_impl_all!(heap::SharedHeap: Send, Sync);
static_assertions::assert_impl_all!(message::MessageQueue<Message>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_default() {
        let runtime = init().unwrap();
        assert!(runtime.contexts().is_empty());
    }

    #[test]
    fn test_version_not_empty() {
        assert!(!VERSION.is_empty());
    }
}
