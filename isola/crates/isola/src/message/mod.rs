//! Message Module - Cross-Context Requests
//!
//! A message is a request one context asks another to perform the next time
//! it polls. Two kinds exist:
//!
//! - `AwaitCounter` parks the receiving context until a shared counter
//!   reaches a target. Stop-the-world and versioned-pointer updates are
//!   built from it.
//! - `Callback` runs an arbitrary closure on the receiving thread. This is
//!   the interrupt mechanism.
//!
//! Messages travel through each context's [`MessageQueue`]. Sending returns
//! a [`MessageInFlight`] ticket that can be waited on.

pub mod queue;

pub use queue::{MessageQueue, CHUNK_SIZE};

use std::fmt;
use std::sync::Arc;

use crate::context::{Context, ContextId};
use crate::util::Counter;

/// Closure carried by a callback message
pub type Callback = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Message - a request delivered to a context's queue
///
/// Cloning is cheap: counters and callbacks are reference counted, so a
/// broadcast sends one clone of the same request to every context.
#[derive(Clone)]
pub enum Message {
    /// Wait until `counter >= target`
    ///
    /// Only the context the message was addressed to waits. Any other
    /// executor treats it as a no-op.
    AwaitCounter { counter: Counter, target: u64 },

    /// Run a closure on the receiving context's thread
    Callback(Callback),
}

/// Discriminant of [`Message`] used in logs and events
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    AwaitCounter,
    Callback,
}

impl Message {
    /// Build an await message on a shared counter
    pub fn await_counter(counter: &Counter, target: u64) -> Self {
        Message::AwaitCounter {
            counter: counter.clone(),
            target,
        }
    }

    /// Build a callback message
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Message::Callback(Arc::new(f))
    }

    /// Kind of this message
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::AwaitCounter { .. } => MessageKind::AwaitCounter,
            Message::Callback(_) => MessageKind::Callback,
        }
    }

    /// Whether a sender may execute this message itself while the target is
    /// asleep or gone
    ///
    /// An await executed by anyone but the target is a no-op, so running it
    /// locally is harmless. A callback must run on the target's thread.
    pub fn allows_local_execution(&self) -> bool {
        matches!(self, Message::AwaitCounter { .. })
    }

    /// Execute the message
    ///
    /// `on_target` is true when the calling thread is the target context's
    /// own thread. Callback errors are returned to the caller to be logged.
    pub(crate) fn execute(&self, target: ContextId, on_target: bool) -> anyhow::Result<()> {
        match self {
            Message::AwaitCounter { counter, target: goal } => {
                if on_target {
                    log::trace!(
                        "context {} awaiting counter {} >= {}",
                        target,
                        counter.get(),
                        goal
                    );
                    counter.wait_until(*goal);
                }
                Ok(())
            },
            Message::Callback(callback) => {
                if !on_target {
                    crate::fatal!(
                        "callback for context {} executed on a foreign thread",
                        target
                    );
                }
                callback()
            },
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::AwaitCounter { counter, target } => f
                .debug_struct("AwaitCounter")
                .field("counter", counter)
                .field("target", target)
                .finish(),
            Message::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// MessageInFlight - ticket for a sent message
///
/// Identifies the message by its target and queue slot. Consumption is
/// observed through the target queue's monotonic `consumed` counter.
#[derive(Debug, Clone)]
pub struct MessageInFlight {
    pub(crate) message: Message,
    pub(crate) target: Arc<Context>,
    pub(crate) slot: u64,
}

impl MessageInFlight {
    /// The context the message was sent to
    pub fn target(&self) -> &Arc<Context> {
        &self.target
    }

    /// Queue slot assigned at send time
    pub fn slot(&self) -> u64 {
        self.slot
    }

    /// The message itself
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Whether the target has consumed the message
    pub fn is_consumed(&self) -> bool {
        self.target.queue().has_consumed(self.slot)
    }
}
