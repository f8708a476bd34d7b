//! Test Utilities for the isola integration suite
//!
//! Fixtures build a runtime whose event log records in memory, so tests can
//! assert on protocol order as well as on results.

#![allow(dead_code)]

use isola::logging::RuntimeEvent;
use isola::{Context, ContextHandle, Runtime, RuntimeConfig};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// ============================================================================
/// RUNTIME FIXTURE
/// ============================================================================

/// Runtime plus the calling thread's context
pub struct RuntimeFixture {
    pub runtime: Runtime,
    pub main: ContextHandle,
}

impl RuntimeFixture {
    /// Fixture with recording enabled and otherwise default configuration
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig {
            record_events: true,
            ..Default::default()
        })
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let runtime = Runtime::new(config).expect("valid config");
        let main = runtime.enter().expect("test thread hosts no context");
        Self { runtime, main }
    }

    /// Recorded events matching `pred`
    pub fn events_where<F>(&self, pred: F) -> Vec<RuntimeEvent>
    where
        F: Fn(&RuntimeEvent) -> bool,
    {
        self.runtime
            .events()
            .events()
            .into_iter()
            .filter(|e| pred(e))
            .collect()
    }

    /// Wait for every context in `workers` to finish, failing on panics
    pub fn join_all(&self, workers: &[Arc<Context>]) {
        for worker in workers {
            self.main
                .await_shutdown(worker)
                .unwrap_or_else(|e| panic!("context {} failed: {}", worker.id(), e));
        }
    }
}

/// ============================================================================
/// WORKERS
/// ============================================================================

/// Flag and progress counter shared with a polling worker
#[derive(Clone, Default)]
pub struct WorkerControl {
    pub stop: Arc<AtomicBool>,
    pub progress: Arc<AtomicU64>,
}

impl WorkerControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn progress(&self) -> u64 {
        self.progress.load(Ordering::Acquire)
    }
}

/// Spawn a context that polls in a loop, counting rounds, until stopped
pub fn spawn_polling_worker(main: &ContextHandle, control: &WorkerControl) -> Arc<Context> {
    let control = control.clone();
    main.spawn(move |ctx| {
        while !control.stop.load(Ordering::Acquire) {
            ctx.poll();
            control.progress.fetch_add(1, Ordering::AcqRel);
            std::hint::spin_loop();
        }
    })
    .expect("spawn polling worker")
}

/// Keep draining `ctx`'s queue until `worker` has made `rounds` more rounds
pub fn wait_for_progress(ctx: &ContextHandle, control: &WorkerControl, rounds: u64) {
    let start = control.progress();
    ctx.poll_until(|| control.progress() >= start + rounds);
}
