//! Runtime Module - State Shared by All Contexts
//!
//! A [`Runtime`] owns everything contexts have in common: the registry of
//! live contexts, the exclusive-turn sequence behind every versioned pointer
//! and the stop-the-world barrier, the shared heap, statistics and the event
//! log. It is a cheap `Clone` handle; every context holds one.
//!
//! ## Bootstrap
//!
//! ```text
//! Runtime::new(config) ──▶ runtime.enter() ──▶ ContextHandle (main thread)
//!                                                  │
//!                                                  ├─ spawn(entry) ──▶ ContextHandle (new thread)
//!                                                  └─ ...
//! ```

pub mod registry;
pub mod safepoint;
pub mod turns;
pub mod versioned;

pub use registry::ContextSet;
pub use safepoint::{WorldStopped, WorldStopper};
pub use turns::TurnSequencer;
pub use versioned::{PendingUpdate, VersionedPtr};

use std::sync::Arc;

use isola_util::IdGenerator;

use crate::config::RuntimeConfig;
use crate::context::{current_context_id, Context, ContextHandle, ContextId};
use crate::error::{IsolaError, Result};
use crate::heap::SharedHeap;
use crate::logging::{EventLog, EventLogConfig, RuntimeEvent};
use crate::object::{GlobalRef, Value, ABSTRACT_TAG};
use crate::stats::RuntimeStats;
use crate::util::atomic::set_stuck_waiter_threshold;

struct Shared {
    config: RuntimeConfig,
    registry: VersionedPtr<ContextSet>,
    turns: TurnSequencer,
    world: WorldStopper,
    ids: IdGenerator,
    heap: SharedHeap,
    stats: RuntimeStats,
    events: EventLog,
}

/// Runtime - handle to the state shared by a group of contexts
///
/// # Examples
///
/// ```rust
/// use isola::{Runtime, RuntimeConfig};
///
/// let runtime = Runtime::new(RuntimeConfig::default()).unwrap();
/// let main = runtime.enter().unwrap();
/// assert_eq!(runtime.contexts().ids(), vec![main.id()]);
/// main.shutdown();
/// assert!(runtime.contexts().is_empty());
/// ```
#[derive(Clone)]
pub struct Runtime {
    shared: Arc<Shared>,
}

impl Runtime {
    /// Create a runtime with no contexts
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        set_stuck_waiter_threshold(config.stuck_waiter_warn_spins);

        let events = EventLog::new(EventLogConfig::from(&config));
        log::debug!("isola runtime created: {:?}", config);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                registry: VersionedPtr::new(ContextSet::new()),
                turns: TurnSequencer::new(),
                world: WorldStopper::new(),
                ids: IdGenerator::new(),
                heap: SharedHeap::new(),
                stats: RuntimeStats::new(),
                events,
            }),
        })
    }

    /// Register a context hosted by the calling thread
    pub fn enter(&self) -> Result<ContextHandle> {
        if let Some(id) = current_context_id() {
            return Err(IsolaError::ThreadOccupied(id));
        }
        let context = self.create_context(None)?;
        Ok(ContextHandle::start(self.clone(), context))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    pub fn heap(&self) -> &SharedHeap {
        &self.shared.heap
    }

    pub fn stats(&self) -> &RuntimeStats {
        &self.shared.stats
    }

    pub fn events(&self) -> &EventLog {
        &self.shared.events
    }

    /// Exclusive turns shared by versioned-pointer updates and world stops
    pub fn turns(&self) -> &TurnSequencer {
        &self.shared.turns
    }

    pub fn world(&self) -> &WorldStopper {
        &self.shared.world
    }

    /// Versioned pointer holding the registry
    pub fn registry(&self) -> &VersionedPtr<ContextSet> {
        &self.shared.registry
    }

    /// Snapshot of registered contexts
    pub fn contexts(&self) -> Arc<ContextSet> {
        self.shared.registry.read()
    }

    /// Registered context with id `id`
    pub fn context(&self, id: ContextId) -> Option<Arc<Context>> {
        self.contexts().get(id).cloned()
    }

    /// Id carried by a context's self value
    pub fn context_id_of(&self, value: GlobalRef) -> Result<ContextId> {
        let object = self.heap().get(value)?;
        match (object.header().tag(), object.field(0)?) {
            (ABSTRACT_TAG, Value::Int(id)) if id >= 0 => Ok(id as ContextId),
            _ => Err(IsolaError::InvalidHandle {
                heap: "shared",
                index: value.0,
            }),
        }
    }

    /// Allocate, identify and register a new context
    ///
    /// The context is visible in the registry but has no thread yet.
    pub(crate) fn create_context(&self, creator: Option<&ContextHandle>) -> Result<Arc<Context>> {
        let id = self.shared.ids.next();
        let self_value = self.heap().alloc_with(ABSTRACT_TAG, &[Value::int(id as i64)])?;
        let context = Arc::new(Context::new(id, self_value));

        let update = self.shared.registry.begin_update_from(self, creator);
        let next = update.current().with(Arc::clone(&context));
        update.commit(next);

        self.stats().record_context_created();
        self.events().log(RuntimeEvent::ContextCreated { context: id });
        Ok(context)
    }

    /// Unregister context `id`
    pub(crate) fn remove_context(&self, from: Option<&ContextHandle>, id: ContextId) {
        let update = self.shared.registry.begin_update_from(self, from);
        let next = update.current().without(id);
        update.commit(next);
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("contexts", &self.contexts().ids())
            .field("turns", &self.shared.turns)
            .field("world", &self.shared.world)
            .field("heap", &self.shared.heap)
            .finish()
    }
}
