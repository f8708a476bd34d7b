//! Error Module - Isola Error Types
//!
//! Two kinds of failure exist in the runtime core.
//!
//! ## Recoverable errors
//! Returned as [`IsolaError`] through the crate [`Result`] alias:
//! - `Configuration` - invalid runtime configuration
//! - `ThreadSpawn` - the OS refused to start a context thread
//! - `ContextPanicked` - a context's entry closure panicked
//! - `InvalidHandle` / `FieldOutOfBounds` - bad heap handles from the embedder
//! - `IntOutOfRange` - an immediate integer wider than a tagged word
//!
//! ## Programming errors
//! Corrupted concurrent state (messages sent to a destroyed context, broken
//! chunk chaining, duplicate forwarding keys, a foreign `resume_the_world`)
//! is never returned. [`fatal`] logs the condition and aborts the process.

use thiserror::Error;

use crate::config::ConfigError;

/// Main error type for all isola operations
#[derive(Debug, Error)]
pub enum IsolaError {
    /// Configuration error
    ///
    /// **When returned:** `RuntimeConfig::validate` rejected a value
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Configuration text could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// OS thread for a context could not be created
    ///
    /// **When returned:** `ContextHandle::spawn` when `std::thread::Builder`
    /// fails (thread limit, out of memory for the stack)
    ///
    /// **Recovery strategy:** The context is already registered; it is shut
    /// down again before this error is returned.
    #[error("Failed to spawn thread for context {context}: {source}")]
    ThreadSpawn {
        context: u64,
        #[source]
        source: std::io::Error,
    },

    /// The entry closure of a context panicked
    ///
    /// **When returned:** `ContextHandle::await_shutdown` after joining
    #[error("Context {0} panicked")]
    ContextPanicked(u64),

    /// The calling thread already hosts a context
    ///
    /// **When returned:** `Runtime::enter` on a thread with a live
    /// `ContextHandle`
    #[error("Thread already hosts context {0}")]
    ThreadOccupied(u64),

    /// Heap handle does not address an object
    #[error("Invalid {heap} heap handle: {index}")]
    InvalidHandle { heap: &'static str, index: u32 },

    /// Field index past the end of an object
    #[error("Field {field} out of bounds for object of {size} words")]
    FieldOutOfBounds { field: usize, size: usize },

    /// Object size does not fit in a header
    #[error("Object size {0} exceeds the maximum header size")]
    ObjectTooLarge(usize),

    /// Integer does not fit in a tagged word
    ///
    /// **When returned:** storing a `Value::Int` outside
    /// `MIN_INT..=MAX_INT` into either heap
    #[error("Integer {0} does not fit in 63 bits")]
    IntOutOfRange(i64),
}

impl IsolaError {
    /// Check if this error is caused by caller input rather than runtime state
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            IsolaError::Configuration(_)
                | IsolaError::ConfigParse(_)
                | IsolaError::InvalidHandle { .. }
                | IsolaError::FieldOutOfBounds { .. }
                | IsolaError::ObjectTooLarge(_)
                | IsolaError::IntOutOfRange(_)
                | IsolaError::ThreadOccupied(_)
        )
    }
}

/// Result type alias for isola operations
pub type Result<T> = std::result::Result<T, IsolaError>;

/// Terminate the process on a violated runtime invariant
///
/// Continuing after a protocol invariant breaks would run other contexts
/// against corrupted shared state, so there is no unwinding here.
#[cold]
#[inline(never)]
pub fn fatal(message: std::fmt::Arguments<'_>) -> ! {
    log::error!("fatal runtime error: {}", message);
    eprintln!("isola: fatal runtime error: {}", message);
    std::process::abort()
}

/// Abort the process with a formatted message, see [`fatal`]
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::error::fatal(format_args!($($arg)*))
    };
}

/// Abort unless the condition holds, see [`fatal`]
#[macro_export]
macro_rules! ensure_invariant {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            $crate::fatal!($($arg)*);
        }
    };
}
