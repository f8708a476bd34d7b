//! ContextHandle - the running context's own capability
//!
//! Exactly one handle exists per context, living on the context's thread.
//! The handle is the only way to consume the context's queue, to touch its
//! private heap and to act "as" the context in a protocol. It is neither
//! `Send` nor `Sync`.

use std::cell::Cell;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use super::messaging;
use super::{Context, ContextId};
use crate::error::{IsolaError, Result};
use crate::heap::PrivateHeap;
use crate::logging::RuntimeEvent;
use crate::message::{Message, MessageInFlight};
use crate::object::{GlobalRef, Value};
use crate::promote;
use crate::runtime::safepoint::WorldStopped;
use crate::runtime::Runtime;
use crate::util::SpinWait;

thread_local! {
    static CURRENT: Cell<Option<ContextId>> = const { Cell::new(None) };
}

/// Id of the context hosted by the calling thread, if any
pub fn current_context_id() -> Option<ContextId> {
    CURRENT.with(Cell::get)
}

/// ContextHandle - a context as seen from its own thread
///
/// # Examples
///
/// ```rust
/// use isola::{Message, Runtime, RuntimeConfig};
///
/// let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
/// let main = runtime.enter().unwrap();
///
/// let worker = main
///     .spawn(|ctx| {
///         ctx.poll();
///     })
///     .unwrap();
///
/// let ticket = main.interrupt(&worker, || Ok(()));
/// main.sync_send(&ticket, false);
/// main.await_shutdown(&worker).unwrap();
/// main.shutdown();
/// ```
pub struct ContextHandle {
    context: Arc<Context>,
    runtime: Runtime,
    heap: PrivateHeap,
    finished: bool,
    _not_send: PhantomData<*const ()>,
}

impl ContextHandle {
    /// Bind `context` to the calling thread
    pub(crate) fn start(runtime: Runtime, context: Arc<Context>) -> Self {
        let id = context.id();
        context.lock_sleep();
        crate::ensure_invariant!(
            context.set_thread_id(thread::current().id()),
            "context {} started twice",
            id
        );
        context.set_asleep(false);
        context.set_started();
        CURRENT.with(|current| current.set(Some(id)));
        runtime.events().log(RuntimeEvent::ContextStarted { context: id });

        let handle = Self {
            heap: PrivateHeap::new(runtime.config()),
            context,
            runtime,
            finished: false,
            _not_send: PhantomData,
        };
        handle.poll();
        handle
    }

    #[inline]
    pub fn id(&self) -> ContextId {
        self.context.id()
    }

    /// Shared state of this context, the form peers send to
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Shared-heap object standing for this context
    pub fn self_value(&self) -> GlobalRef {
        self.context.self_value()
    }

    pub fn heap(&self) -> &PrivateHeap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut PrivateHeap {
        &mut self.heap
    }

    // === Queue ===

    /// Drain and execute this context's queue, returning how many messages
    /// ran
    ///
    /// Callback errors and panics are logged and counted, never propagated.
    pub fn poll(&self) -> usize {
        let mut executed = 0;
        // SAFETY: this handle is the only consumer of the queue: it is unique
        // per context and cannot leave the context's thread.
        while let Some(message) = unsafe { self.context.queue().consume() } {
            executed += 1;
            // poll runs nested inside protocol waits; a callback panic must not
            // unwind through a held turn or an unacknowledged sync
            let error = match panic::catch_unwind(AssertUnwindSafe(|| {
                message.execute(self.id(), true)
            })) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{:#}", e),
                Err(payload) => format!("callback panicked: {}", panic_message(payload.as_ref())),
            };
            self.runtime.stats().record_callback_failure();
            self.runtime.events().log(RuntimeEvent::CallbackFailed {
                context: self.id(),
                error,
            });
        }
        if executed > 0 {
            self.runtime.stats().record_consumed(executed as u64);
        }
        executed
    }

    /// Keep draining the queue until `condition` holds
    pub fn poll_until<F>(&self, mut condition: F)
    where
        F: FnMut() -> bool,
    {
        let mut wait = SpinWait::new("poll condition");
        loop {
            self.poll();
            if condition() {
                return;
            }
            wait.snooze();
        }
    }

    // === Messaging ===

    /// Enqueue a message for `target`
    pub fn send(&self, target: &Arc<Context>, message: Message) -> MessageInFlight {
        messaging::send(&self.runtime, target, message)
    }

    /// Enqueue a message for the context with id `target`
    ///
    /// The id must name a registered context; anything else aborts the
    /// process.
    pub fn send_to(&self, target: ContextId, message: Message) -> MessageInFlight {
        match self.runtime.context(target) {
            Some(context) => self.send(&context, message),
            None => crate::fatal!(
                "context {} sent {:?} to unknown context {}",
                self.id(),
                message.kind(),
                target
            ),
        }
    }

    /// Block until the message has been consumed, draining this context's
    /// queue meanwhile
    pub fn sync_send(&self, inflight: &MessageInFlight, allow_local: bool) {
        messaging::sync_send(&self.runtime, Some(self), inflight, allow_local)
    }

    /// Deliver `message` to every other context and wait for all of them
    pub fn broadcast_sync(&self, message: Message) {
        messaging::broadcast_sync(&self.runtime, Some(self), message)
    }

    /// Deliver `message` to every other context without waiting
    pub fn broadcast_async(&self, message: Message) -> Vec<MessageInFlight> {
        messaging::broadcast_async(&self.runtime, Some(self), message)
    }

    /// Ask `target` to run `callback` on its own thread at its next poll
    pub fn interrupt<F>(&self, target: &Arc<Context>, callback: F) -> MessageInFlight
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.send(target, Message::callback(callback))
    }

    // === Sleep ===

    /// Drain the queue and release the sleep lock
    ///
    /// While asleep, peers may complete awaits on this context's behalf.
    /// The context must not touch shared protocol state until [`wake`].
    ///
    /// [`wake`]: ContextHandle::wake
    pub fn sleep(&self) {
        crate::ensure_invariant!(
            !self.context.is_asleep(),
            "context {} is already asleep",
            self.id()
        );
        self.poll();
        self.context.set_asleep(true);
        // SAFETY: the sleep lock is held by this thread from `start` or the
        // last `wake`.
        unsafe { self.context.unlock_sleep() };
        self.runtime.events().log(RuntimeEvent::ContextSlept { context: self.id() });
    }

    /// Reacquire the sleep lock and drain the queue
    pub fn wake(&self) {
        crate::ensure_invariant!(
            self.context.is_asleep(),
            "context {} is not asleep",
            self.id()
        );
        self.context.lock_sleep();
        self.context.set_asleep(false);
        self.runtime.events().log(RuntimeEvent::ContextWoke { context: self.id() });
        self.poll();
    }

    // === Lifecycle ===

    /// Create a context and run `entry` on a new thread as that context
    ///
    /// The context is registered before this returns. It shuts down when
    /// `entry` returns or panics.
    pub fn spawn<F>(&self, entry: F) -> Result<Arc<Context>>
    where
        F: FnOnce(&mut ContextHandle) + Send + 'static,
    {
        let context = self.runtime.create_context(Some(self))?;
        let id = context.id();

        let config = self.runtime.config();
        let mut builder =
            thread::Builder::new().name(format!("{}-{}", config.thread_name_prefix, id));
        if let Some(size) = config.thread_stack_size {
            builder = builder.stack_size(size);
        }

        let runtime = self.runtime.clone();
        let hosted = Arc::clone(&context);
        match builder.spawn(move || run_context(runtime, hosted, entry)) {
            Ok(join) => {
                context.set_join_handle(join);
                Ok(context)
            },
            Err(source) => {
                log::error!("failed to start thread for context {}: {}", id, source);
                self.runtime.remove_context(Some(self), id);
                context.set_started();
                context.set_shutdown();
                Err(IsolaError::ThreadSpawn { context: id, source })
            },
        }
    }

    /// Wait for `target` to start and shut down, then join its thread
    ///
    /// This context keeps draining its queue while waiting.
    pub fn await_shutdown(&self, target: &Arc<Context>) -> Result<()> {
        self.poll_until(|| target.is_started() && target.is_shutdown());

        if let Some(join) = target.take_join_handle() {
            if join.join().is_err() {
                return Err(IsolaError::ContextPanicked(target.id()));
            }
        }
        if target.has_panicked() {
            return Err(IsolaError::ContextPanicked(target.id()));
        }
        Ok(())
    }

    /// Unregister this context, drain its queue a last time and release it
    pub fn shutdown(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let id = self.id();

        if self.context.is_asleep() {
            self.wake();
        }

        self.runtime.remove_context(Some(&*self), id);
        self.poll();

        // SAFETY: the sleep lock is held by this thread (the context is
        // awake).
        unsafe { self.context.unlock_sleep() };
        self.context.set_shutdown();
        CURRENT.with(|current| current.set(None));

        self.runtime.stats().record_context_shutdown();
        self.runtime.events().log(RuntimeEvent::ContextShutdown { context: id });
    }

    // === World ===

    /// Block every other context until the returned guard is dropped or
    /// resumed
    pub fn stop_the_world(&self) -> WorldStopped<'_> {
        self.runtime.world().stop(self);
        WorldStopped::new(self)
    }

    // === Promotion ===

    /// Make `value` shareable with other contexts, promoting private objects
    /// into the shared heap
    pub fn globalize(&mut self, value: Value) -> Result<Value> {
        let (global, stats) =
            promote::globalize_with_stats(&mut self.heap, self.runtime.heap(), value)?;
        if stats.objects > 0 {
            self.runtime.stats().record_promotion(stats.objects, stats.words);
            self.runtime.events().log(RuntimeEvent::Promoted {
                context: self.id(),
                objects: stats.objects,
                words: stats.words,
            });
        }
        Ok(global)
    }

    /// Replace a promoted private reference with its shared copy
    pub fn canonicalize(&self, value: Value) -> Value {
        promote::canonicalize(&self.heap, value)
    }
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        self.finish();
    }
}

impl std::fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle")
            .field("context", &self.context)
            .field("heap_objects", &self.heap.len())
            .finish()
    }
}

/// Body of a spawned context thread
fn run_context<F>(runtime: Runtime, context: Arc<Context>, entry: F)
where
    F: FnOnce(&mut ContextHandle),
{
    let id = context.id();
    let mut handle = ContextHandle::start(runtime, context);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry(&mut handle)));
    if let Err(payload) = outcome {
        let message = panic_message(payload.as_ref());
        handle.context.set_panicked();
        handle
            .runtime
            .events()
            .log(RuntimeEvent::ContextPanicked { context: id, message });
    }

    handle.shutdown();
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

static_assertions::assert_not_impl_any!(ContextHandle: Send, Sync);
