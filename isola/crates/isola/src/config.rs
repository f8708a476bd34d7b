//! Configuration Module - Runtime Tuning Parameters
//!
//! Manages the few knobs the runtime core exposes. None of them change
//! protocol semantics: they size the forwarding table, name and size context
//! threads, and control diagnostics.

use serde::{Deserialize, Serialize};

/// Main configuration for the isola runtime
///
/// # Examples
///
/// ```rust
/// use isola::RuntimeConfig;
///
/// let config = RuntimeConfig {
///     forward_table_max_chain: 16,
///     verbose: true,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Slots allocated by the first insertion into a forwarding table
    ///
    /// Must be a power of two.
    /// Default: 256
    pub forward_table_initial_capacity: usize,

    /// Longest linear-probe chain before the forwarding table doubles
    ///
    /// Default: 100
    pub forward_table_max_chain: usize,

    /// Spin rounds after which a waiter logs a stuck-waiter warning
    ///
    /// Purely diagnostic: waits never time out. 0 disables the warning.
    /// Default: 4_194_304
    pub stuck_waiter_warn_spins: u64,

    /// Stack size for context threads in bytes
    ///
    /// If None, the platform default is used.
    pub thread_stack_size: Option<usize>,

    /// Prefix of context thread names (`<prefix>-<id>`)
    ///
    /// Default: "isola-ctx"
    pub thread_name_prefix: String,

    /// Print runtime events to the console
    ///
    /// Default: false
    pub verbose: bool,

    /// Emit console events as JSON lines instead of text
    ///
    /// Default: false
    pub json_events: bool,

    /// Keep runtime events in memory for inspection
    ///
    /// Meant for tests; the oldest events are dropped past
    /// `max_recorded_events`.
    ///
    /// Default: false
    pub record_events: bool,

    /// Most events kept in memory when recording
    ///
    /// Default: 10000
    pub max_recorded_events: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            forward_table_initial_capacity: 256,
            forward_table_max_chain: 100,
            stuck_waiter_warn_spins: 1 << 22,
            thread_stack_size: None,
            thread_name_prefix: "isola-ctx".to_string(),
            verbose: false,
            json_events: false,
            record_events: false,
            max_recorded_events: 10_000,
        }
    }
}

impl RuntimeConfig {
    /// Validate configuration
    ///
    /// ```rust
    /// use isola::RuntimeConfig;
    ///
    /// let config = RuntimeConfig {
    ///     forward_table_initial_capacity: 100, // not a power of two
    ///     ..Default::default()
    /// };
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacity = self.forward_table_initial_capacity;
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(ConfigError::InvalidCapacity(format!(
                "forward_table_initial_capacity must be a non-zero power of two, got {}",
                capacity
            )));
        }

        if self.forward_table_max_chain == 0 {
            return Err(ConfigError::InvalidChain(
                "forward_table_max_chain must be > 0".to_string(),
            ));
        }

        if let Some(stack) = self.thread_stack_size {
            if stack < MIN_STACK_SIZE {
                return Err(ConfigError::InvalidStackSize(format!(
                    "thread_stack_size must be at least {} bytes, got {}",
                    MIN_STACK_SIZE, stack
                )));
            }
        }

        if self.thread_name_prefix.is_empty() || self.thread_name_prefix.contains('\0') {
            return Err(ConfigError::InvalidThreadName(
                "thread_name_prefix must be non-empty and contain no NUL".to_string(),
            ));
        }

        if self.max_recorded_events == 0 {
            return Err(ConfigError::InvalidEventCapacity(
                "max_recorded_events must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with:
    /// - ISOLA_FWD_CAPACITY
    /// - ISOLA_FWD_MAX_CHAIN
    /// - ISOLA_STUCK_SPINS
    /// - ISOLA_STACK_SIZE
    /// - ISOLA_VERBOSE
    /// - ISOLA_JSON_EVENTS
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse::<usize>("ISOLA_FWD_CAPACITY") {
            config.forward_table_initial_capacity = v;
        }
        if let Some(v) = env_parse::<usize>("ISOLA_FWD_MAX_CHAIN") {
            config.forward_table_max_chain = v;
        }
        if let Some(v) = env_parse::<u64>("ISOLA_STUCK_SPINS") {
            config.stuck_waiter_warn_spins = v;
        }
        if let Some(v) = env_parse::<usize>("ISOLA_STACK_SIZE") {
            config.thread_stack_size = Some(v);
        }
        if let Ok(val) = std::env::var("ISOLA_VERBOSE") {
            config.verbose = env_flag(&val);
        }
        if let Ok(val) = std::env::var("ISOLA_JSON_EVENTS") {
            config.json_events = env_flag(&val);
        }

        config
    }

    /// Parse a JSON configuration, missing fields take their defaults
    pub fn from_json(text: &str) -> crate::Result<Self> {
        let config: RuntimeConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid forwarding table capacity: {0}")]
    InvalidCapacity(String),

    #[error("Invalid forwarding table chain length: {0}")]
    InvalidChain(String),

    #[error("Invalid thread stack size: {0}")]
    InvalidStackSize(String),

    #[error("Invalid thread name: {0}")]
    InvalidThreadName(String),

    #[error("Invalid event log capacity: {0}")]
    InvalidEventCapacity(String),
}

const MIN_STACK_SIZE: usize = 64 * 1024;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}

fn env_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.forward_table_initial_capacity, 256);
        assert_eq!(config.forward_table_max_chain, 100);
    }

    #[test]
    fn test_invalid_capacity() {
        for capacity in [0, 3, 100] {
            let config = RuntimeConfig {
                forward_table_initial_capacity: capacity,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidCapacity(_))
            ));
        }
    }

    #[test]
    fn test_invalid_chain_and_stack() {
        let config = RuntimeConfig {
            forward_table_max_chain: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RuntimeConfig {
            thread_stack_size: Some(1024),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidStackSize(_))
        ));
    }

    #[test]
    fn test_invalid_event_capacity() {
        let config = RuntimeConfig {
            max_recorded_events: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEventCapacity(_))
        ));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = RuntimeConfig::from_json(r#"{ "forward_table_max_chain": 8 }"#)
            .expect("valid config");
        assert_eq!(config.forward_table_max_chain, 8);
        assert_eq!(config.forward_table_initial_capacity, 256);
        assert_eq!(config.thread_name_prefix, "isola-ctx");
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        assert!(RuntimeConfig::from_json("not json").is_err());
        assert!(RuntimeConfig::from_json(r#"{ "forward_table_initial_capacity": 12 }"#).is_err());
    }
}
