//! Cross-context message passing
//!
//! Send, synchronous send and broadcast. Every function takes the sending
//! context as `Option<&ContextHandle>`: a thread without a context (runtime
//! bootstrap) may coordinate too, it just has no queue to drain while it
//! waits.

use std::sync::Arc;

use super::{Context, ContextHandle};
use crate::message::{Message, MessageInFlight};
use crate::runtime::Runtime;
use crate::util::SpinWait;

/// Enqueue `message` on `target`
pub(crate) fn send(runtime: &Runtime, target: &Arc<Context>, message: Message) -> MessageInFlight {
    let slot = target.queue().produce(message.clone());
    runtime.stats().record_send();
    log::trace!(
        "sent {:?} to context {} (slot {})",
        message.kind(),
        target.id(),
        slot
    );
    MessageInFlight {
        message,
        target: Arc::clone(target),
        slot,
    }
}

/// Wait until the target has consumed `inflight`
///
/// While waiting the sender keeps draining its own queue, so two contexts
/// synchronously messaging each other make progress. With `allow_local`, an
/// eligible message is executed by the sender itself once it wins the
/// target's sleep lock, which is only free while the target is asleep, not
/// yet started or shut down.
pub(crate) fn sync_send(
    runtime: &Runtime,
    from: Option<&ContextHandle>,
    inflight: &MessageInFlight,
    allow_local: bool,
) {
    let target = &inflight.target;
    let allow_local = allow_local && inflight.message.allows_local_execution();
    let mut wait = SpinWait::new("message consumption");

    loop {
        if inflight.is_consumed() {
            break;
        }

        if allow_local && (target.is_asleep() || target.is_shutdown()) && target.try_lock_sleep() {
            let outcome = inflight.message.execute(target.id(), false);
            // SAFETY: acquired by `try_lock_sleep` on this thread just above.
            unsafe { target.unlock_sleep() };
            if let Err(e) = outcome {
                log::warn!("local execution for context {} failed: {:#}", target.id(), e);
            }
            runtime.stats().record_local_execution();
            log::trace!(
                "executed {:?} locally for context {}",
                inflight.message.kind(),
                target.id()
            );
            break;
        }

        if !allow_local && target.is_shutdown() && !inflight.is_consumed() {
            // The final drain has happened, nobody will consume the slot.
            runtime.stats().record_abandoned();
            log::debug!(
                "abandoning {:?} to context {}: target shut down",
                inflight.message.kind(),
                target.id()
            );
            break;
        }

        if let Some(me) = from {
            me.poll();
        }
        wait.snooze();
    }
}

/// Send `message` to every registered context except the sender and wait
/// for each to consume it (local execution allowed)
pub(crate) fn broadcast_sync(runtime: &Runtime, from: Option<&ContextHandle>, message: Message) {
    let inflight = broadcast_async(runtime, from, message);
    for sent in &inflight {
        sync_send(runtime, from, sent, true);
    }
}

/// Send `message` to every registered context except the sender
pub(crate) fn broadcast_async(
    runtime: &Runtime,
    from: Option<&ContextHandle>,
    message: Message,
) -> Vec<MessageInFlight> {
    let me = from.map(|handle| handle.id());
    let contexts = runtime.contexts();
    contexts
        .iter()
        .filter(|target| Some(target.id()) != me)
        .map(|target| send(runtime, target, message.clone()))
        .collect()
}
