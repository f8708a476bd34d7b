//! Promote Module - Moving private objects into the shared heap
//!
//! A private object must be promoted before another context can see it.
//! Promotion copies the whole reachable private graph and remembers, per
//! context, which private object maps to which shared copy.

pub mod forwarding;
pub mod globalize;

pub use forwarding::{ForwardKey, ForwardingTable};
pub use globalize::{
    canonicalize, get_global_version, globalize, globalize_with_stats, PromotionStats,
};
