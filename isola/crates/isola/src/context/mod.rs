//! Context Module - Thread-backed Execution Contexts
//!
//! A context is one independently scheduled unit of execution backed by one
//! OS thread. It owns a private heap and a message queue. Contexts cooperate
//! only through messages and through the shared structures built on them
//! (the registry, versioned pointers, the stop-the-world barrier).
//!
//! ## Context Lifecycle
//!
//! ```text
//!   create ──▶ registered, not started (treated as asleep)
//!     │
//!     ▼
//!   start ───▶ running ◀──── wake
//!                │  ▲          ▲
//!                │  └──────────┤
//!                ▼             │
//!              sleep ──────────┘
//!                │
//!                ▼
//!             shutdown ──▶ unregistered, joined by await_shutdown
//! ```
//!
//! Two views of a context exist:
//! - [`Context`]: the shared, `Arc`-held state other contexts send to.
//! - [`ContextHandle`]: the running thread's own, non-`Send` capability
//!   through which every operation that acts "as this context" is made.

mod handle;
pub(crate) mod messaging;

pub use handle::{current_context_id, ContextHandle};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::thread::{JoinHandle, ThreadId};

use parking_lot::lock_api::RawMutex as _;
use parking_lot::Mutex;

use crate::message::{Message, MessageQueue};
use crate::object::GlobalRef;

/// Stable context identity
pub type ContextId = u64;

/// Context - state shared between a context's thread and its peers
pub struct Context {
    id: ContextId,
    queue: MessageQueue<Message>,

    /// Held by the context's own thread except while asleep
    ///
    /// A raw lock: it is acquired and released by the same thread at
    /// protocol points that are not lexically scoped.
    sleep_lock: parking_lot::RawMutex,

    started: AtomicBool,
    asleep: AtomicBool,
    shutdown: AtomicBool,
    panicked: AtomicBool,

    thread_id: OnceLock<ThreadId>,
    thread: Mutex<Option<JoinHandle<()>>>,

    /// Shared abstract object carrying the id
    self_value: GlobalRef,
}

impl Context {
    pub(crate) fn new(id: ContextId, self_value: GlobalRef) -> Self {
        Self {
            id,
            queue: MessageQueue::new(),
            sleep_lock: <parking_lot::RawMutex as parking_lot::lock_api::RawMutex>::INIT,
            started: AtomicBool::new(false),
            // Until its thread binds, a context is treated as asleep so
            // synchronous senders can complete awaits on its behalf.
            asleep: AtomicBool::new(true),
            shutdown: AtomicBool::new(false),
            panicked: AtomicBool::new(false),
            thread_id: OnceLock::new(),
            thread: Mutex::new(None),
            self_value,
        }
    }

    #[inline]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Shared-heap object that stands for this context
    pub fn self_value(&self) -> GlobalRef {
        self.self_value
    }

    /// Whether a thread has bound to the context
    #[inline]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_asleep(&self) -> bool {
        self.asleep.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Whether the context's entry closure panicked
    pub fn has_panicked(&self) -> bool {
        self.panicked.load(Ordering::Acquire)
    }

    /// OS thread hosting the context, once started
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.thread_id.get().copied()
    }

    /// Messages sent but not yet consumed
    pub fn pending_messages(&self) -> u64 {
        self.queue.pending()
    }

    pub(crate) fn queue(&self) -> &MessageQueue<Message> {
        &self.queue
    }

    pub(crate) fn lock_sleep(&self) {
        self.sleep_lock.lock();
    }

    pub(crate) fn try_lock_sleep(&self) -> bool {
        self.sleep_lock.try_lock()
    }

    /// # Safety
    ///
    /// The calling thread must hold the sleep lock.
    pub(crate) unsafe fn unlock_sleep(&self) {
        // SAFETY: forwarded to the caller.
        unsafe { self.sleep_lock.unlock() }
    }

    pub(crate) fn set_thread_id(&self, id: ThreadId) -> bool {
        self.thread_id.set(id).is_ok()
    }

    pub(crate) fn set_started(&self) {
        self.started.store(true, Ordering::Release);
    }

    pub(crate) fn set_asleep(&self, asleep: bool) {
        self.asleep.store(asleep, Ordering::Release);
    }

    pub(crate) fn set_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub(crate) fn set_panicked(&self) {
        self.panicked.store(true, Ordering::Release);
    }

    pub(crate) fn set_join_handle(&self, handle: JoinHandle<()>) {
        *self.thread.lock() = Some(handle);
    }

    pub(crate) fn take_join_handle(&self) -> Option<JoinHandle<()>> {
        self.thread.lock().take()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("started", &self.is_started())
            .field("asleep", &self.is_asleep())
            .field("shutdown", &self.is_shutdown())
            .field("pending", &self.pending_messages())
            .finish()
    }
}

static_assertions::assert_impl_all!(Context: Send, Sync);
