//! Runtime Logging and Events
//!
//! Every coordination step of the runtime is reported as a [`RuntimeEvent`]:
//! context life-cycle, versioned-pointer updates, world stops, promotions
//! and failed callbacks.
//!
//! Events always go to the `log` facade. The [`EventLog`] can additionally
//! print them to the console (text or JSON lines) and keep the most recent
//! ones in memory, which tests use to assert on protocol order.
//!
//! Log Levels:
//! - ERROR: Context panics
//! - WARN: Failed callbacks
//! - INFO: Context life-cycle
//! - DEBUG: World stops, pointer updates, promotions
//! - TRACE: Individual messages (logged at the call site)

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::RuntimeConfig;
use crate::context::ContextId;

/// Runtime event types
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// Context registered
    ContextCreated { context: ContextId },

    /// Context bound to its thread
    ContextStarted { context: ContextId },

    /// Context released its sleep lock
    ContextSlept { context: ContextId },

    /// Context reacquired its sleep lock
    ContextWoke { context: ContextId },

    /// Context unregistered and released
    ContextShutdown { context: ContextId },

    /// Context entry closure panicked
    ContextPanicked { context: ContextId, message: String },

    /// Versioned pointer update committed
    PointerUpdated { generation: u64 },

    /// World stopped
    WorldStopped { by: ContextId, generation: u64 },

    /// World resumed
    WorldResumed { by: ContextId, generation: u64 },

    /// Private graph promoted
    Promoted {
        context: ContextId,
        objects: u64,
        words: u64,
    },

    /// Callback returned an error
    CallbackFailed { context: ContextId, error: String },
}

impl RuntimeEvent {
    /// Level the event is reported at
    pub fn level(&self) -> log::Level {
        match self {
            RuntimeEvent::ContextPanicked { .. } => log::Level::Error,
            RuntimeEvent::CallbackFailed { .. } => log::Level::Warn,
            RuntimeEvent::ContextCreated { .. }
            | RuntimeEvent::ContextStarted { .. }
            | RuntimeEvent::ContextShutdown { .. } => log::Level::Info,
            RuntimeEvent::ContextSlept { .. }
            | RuntimeEvent::ContextWoke { .. }
            | RuntimeEvent::PointerUpdated { .. }
            | RuntimeEvent::WorldStopped { .. }
            | RuntimeEvent::WorldResumed { .. }
            | RuntimeEvent::Promoted { .. } => log::Level::Debug,
        }
    }
}

impl std::fmt::Display for RuntimeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeEvent::ContextCreated { context } => write!(f, "context {} created", context),
            RuntimeEvent::ContextStarted { context } => write!(f, "context {} started", context),
            RuntimeEvent::ContextSlept { context } => write!(f, "context {} asleep", context),
            RuntimeEvent::ContextWoke { context } => write!(f, "context {} awake", context),
            RuntimeEvent::ContextShutdown { context } => {
                write!(f, "context {} shut down", context)
            },
            RuntimeEvent::ContextPanicked { context, message } => {
                write!(f, "context {} panicked: {}", context, message)
            },
            RuntimeEvent::PointerUpdated { generation } => {
                write!(f, "versioned pointer generation {} committed", generation)
            },
            RuntimeEvent::WorldStopped { by, generation } => {
                write!(f, "world stopped by context {} (generation {})", by, generation)
            },
            RuntimeEvent::WorldResumed { by, generation } => {
                write!(f, "world resumed by context {} (generation {})", by, generation)
            },
            RuntimeEvent::Promoted {
                context,
                objects,
                words,
            } => write!(
                f,
                "context {} promoted {} objects ({} words)",
                context, objects, words
            ),
            RuntimeEvent::CallbackFailed { context, error } => {
                write!(f, "callback on context {} failed: {}", context, error)
            },
        }
    }
}

/// Default bound on recorded events
pub const DEFAULT_MAX_RECORDED: usize = 10_000;

/// Event log configuration
#[derive(Debug, Clone)]
pub struct EventLogConfig {
    /// Print events to stdout
    pub console: bool,

    /// Print JSON lines instead of text
    pub json: bool,

    /// Keep events in memory
    pub record: bool,

    /// Most events kept; older ones are dropped
    pub max_recorded: usize,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            console: false,
            json: false,
            record: false,
            max_recorded: DEFAULT_MAX_RECORDED,
        }
    }
}

impl From<&RuntimeConfig> for EventLogConfig {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            console: config.verbose,
            json: config.json_events,
            record: config.record_events,
            max_recorded: config.max_recorded_events,
        }
    }
}

/// EventLog - sink for runtime events
///
/// Recording is a test aid: memory is bounded by `max_recorded`, the oldest
/// events are discarded first and counted in [`dropped_events`](Self::dropped_events).
pub struct EventLog {
    config: EventLogConfig,
    events: Mutex<VecDeque<(Instant, RuntimeEvent)>>,
    dropped: AtomicU64,
}

impl EventLog {
    pub fn new(config: EventLogConfig) -> Self {
        Self {
            config,
            events: Mutex::new(VecDeque::new()),
            dropped: AtomicU64::new(0),
        }
    }

    /// Report an event
    pub fn log(&self, event: RuntimeEvent) {
        log::log!(event.level(), "{}", event);

        if self.config.console {
            self.output_console(&event);
        }

        if self.config.record {
            let mut events = self.events.lock();
            while events.len() >= self.config.max_recorded.max(1) {
                events.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            events.push_back((Instant::now(), event));
        }
    }

    fn output_console(&self, event: &RuntimeEvent) {
        let now = chrono::Local::now();
        if self.config.json {
            match serde_json::to_value(event) {
                Ok(mut json) => {
                    if let Some(map) = json.as_object_mut() {
                        map.insert(
                            "timestamp".to_string(),
                            serde_json::Value::String(now.to_rfc3339()),
                        );
                    }
                    println!("{}", json);
                },
                Err(e) => log::warn!("failed to serialize runtime event: {}", e),
            }
        } else {
            println!("[{}] [isola] {}", now.format("%Y-%m-%d %H:%M:%S%.3f"), event);
        }
    }

    /// Recorded events, oldest first
    pub fn events(&self) -> Vec<RuntimeEvent> {
        self.events.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    /// Recorded events with their timestamps
    pub fn timed_events(&self) -> Vec<(Instant, RuntimeEvent)> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    /// Events discarded because the recording was full
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(EventLogConfig::default())
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("config", &self.config)
            .field("recorded", &self.event_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_only_when_enabled() {
        let log = EventLog::default();
        log.log(RuntimeEvent::ContextCreated { context: 1 });
        assert_eq!(log.event_count(), 0);

        let log = EventLog::new(EventLogConfig {
            record: true,
            ..Default::default()
        });
        log.log(RuntimeEvent::ContextCreated { context: 1 });
        log.log(RuntimeEvent::ContextShutdown { context: 1 });
        assert_eq!(
            log.events(),
            vec![
                RuntimeEvent::ContextCreated { context: 1 },
                RuntimeEvent::ContextShutdown { context: 1 },
            ]
        );
        log.clear_events();
        assert_eq!(log.event_count(), 0);
    }

    #[test]
    fn test_recording_keeps_most_recent() {
        let log = EventLog::new(EventLogConfig {
            record: true,
            max_recorded: 3,
            ..Default::default()
        });
        for context in 0..5 {
            log.log(RuntimeEvent::ContextCreated { context });
        }
        assert_eq!(log.event_count(), 3);
        assert_eq!(log.dropped_events(), 2);
        assert_eq!(
            log.events(),
            (2..5)
                .map(|context| RuntimeEvent::ContextCreated { context })
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(RuntimeEvent::WorldStopped { by: 2, generation: 6 })
            .unwrap();
        assert_eq!(json["type"], "world_stopped");
        assert_eq!(json["by"], 2);
        assert_eq!(json["generation"], 6);
    }

    #[test]
    fn test_levels_and_display() {
        let event = RuntimeEvent::CallbackFailed {
            context: 3,
            error: "boom".into(),
        };
        assert_eq!(event.level(), log::Level::Warn);
        assert_eq!(event.to_string(), "callback on context 3 failed: boom");
    }

    #[test]
    fn test_config_from_runtime_config() {
        let config = RuntimeConfig {
            verbose: true,
            record_events: true,
            max_recorded_events: 64,
            ..Default::default()
        };
        let events = EventLogConfig::from(&config);
        assert!(events.console && events.record && !events.json);
        assert_eq!(events.max_recorded, 64);
    }
}
