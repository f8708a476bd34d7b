//! Stats Module - Runtime Counters
//!
//! Cheap relaxed counters bumped on every coordination step. They are for
//! monitoring and tests; no protocol decision reads them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// RuntimeStats - counters shared by every context of a runtime
pub struct RuntimeStats {
    contexts_created: AtomicU64,
    contexts_shutdown: AtomicU64,
    messages_sent: AtomicU64,
    messages_consumed: AtomicU64,
    messages_run_locally: AtomicU64,
    messages_abandoned: AtomicU64,
    callback_failures: AtomicU64,
    pointer_updates: AtomicU64,
    world_stops: AtomicU64,
    objects_promoted: AtomicU64,
    words_promoted: AtomicU64,
    start_time: Instant,
}

impl RuntimeStats {
    pub fn new() -> Self {
        Self {
            contexts_created: AtomicU64::new(0),
            contexts_shutdown: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_consumed: AtomicU64::new(0),
            messages_run_locally: AtomicU64::new(0),
            messages_abandoned: AtomicU64::new(0),
            callback_failures: AtomicU64::new(0),
            pointer_updates: AtomicU64::new(0),
            world_stops: AtomicU64::new(0),
            objects_promoted: AtomicU64::new(0),
            words_promoted: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub(crate) fn record_context_created(&self) {
        self.contexts_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_context_shutdown(&self) {
        self.contexts_shutdown.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_send(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_consumed(&self, n: u64) {
        self.messages_consumed.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_local_execution(&self) {
        self.messages_run_locally.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abandoned(&self) {
        self.messages_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_callback_failure(&self) {
        self.callback_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pointer_update(&self) {
        self.pointer_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_world_stop(&self) {
        self.world_stops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_promotion(&self, objects: u64, words: u64) {
        self.objects_promoted.fetch_add(objects, Ordering::Relaxed);
        self.words_promoted.fetch_add(words, Ordering::Relaxed);
    }

    /// Get summary statistics
    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            contexts_created: self.contexts_created.load(Ordering::Relaxed),
            contexts_shutdown: self.contexts_shutdown.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_consumed: self.messages_consumed.load(Ordering::Relaxed),
            messages_run_locally: self.messages_run_locally.load(Ordering::Relaxed),
            messages_abandoned: self.messages_abandoned.load(Ordering::Relaxed),
            callback_failures: self.callback_failures.load(Ordering::Relaxed),
            pointer_updates: self.pointer_updates.load(Ordering::Relaxed),
            world_stops: self.world_stops.load(Ordering::Relaxed),
            objects_promoted: self.objects_promoted.load(Ordering::Relaxed),
            words_promoted: self.words_promoted.load(Ordering::Relaxed),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for RuntimeStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSummary {
    pub contexts_created: u64,
    pub contexts_shutdown: u64,
    pub messages_sent: u64,
    pub messages_consumed: u64,
    /// Awaits executed by a sender on behalf of a sleeping or finished target
    pub messages_run_locally: u64,
    /// Synchronous sends released because the target shut down
    pub messages_abandoned: u64,
    pub callback_failures: u64,
    pub pointer_updates: u64,
    pub world_stops: u64,
    pub objects_promoted: u64,
    pub words_promoted: u64,
    pub uptime_secs: u64,
}

impl StatsSummary {
    /// Contexts created and not yet shut down
    pub fn live_contexts(&self) -> u64 {
        self.contexts_created.saturating_sub(self.contexts_shutdown)
    }
}
