//! Util Module - Shared Utilities
//!
//! Low-level helpers used throughout isola.

pub mod atomic;

pub use atomic::{load_wait_ptr, Counter, SpinWait};
