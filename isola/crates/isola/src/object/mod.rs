//! Object Module - Values and Object Handles
//!
//! A [`Value`] is either an immediate integer or a reference to an object in
//! one of two heaps:
//!
//! - a context's [`PrivateHeap`](crate::heap::PrivateHeap), addressed by
//!   [`LocalRef`]. Only the owning context may touch these objects.
//! - the process-wide [`SharedHeap`](crate::heap::SharedHeap), addressed by
//!   [`GlobalRef`]. Any context may read or write them.
//!
//! Values are stored in shared-heap fields as tagged words:
//!
//! ```text
//! ┌──────────────────────────────────────────────────┬────┐
//! │ 63-bit signed integer                            │  1 │  immediate
//! ├──────────────────────────────────────────────┬───┼────┤
//! │ shared-heap index                            │ 0 │  0 │  Global
//! ├──────────────────────────────────────────────┼───┼────┤
//! │ private-heap index                           │ 1 │  0 │  Local
//! └──────────────────────────────────────────────┴───┴────┘
//! ```

pub mod header;

pub use header::{Color, Header, ABSTRACT_TAG, MAX_WOSIZE};

use isola_util::define_idx;

use crate::error::{IsolaError, Result};

define_idx!(
    /// Handle to an object in a context's private heap
    LocalRef
);

define_idx!(
    /// Handle to an object in the shared heap
    GlobalRef
);

/// Largest immediate integer representable in a tagged word
pub const MAX_INT: i64 = i64::MAX >> 1;
/// Smallest immediate integer representable in a tagged word
pub const MIN_INT: i64 = i64::MIN >> 1;

/// Value - an immediate or a heap reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    /// 63-bit immediate integer
    Int(i64),
    /// Private-heap object
    Local(LocalRef),
    /// Shared-heap object
    Global(GlobalRef),
}

impl Value {
    /// The unit value, used to fill fresh fields
    pub const UNIT: Value = Value::Int(0);

    /// Immediate integer
    #[inline]
    pub fn int(n: i64) -> Self {
        debug_assert!((MIN_INT..=MAX_INT).contains(&n), "{} exceeds 63 bits", n);
        Value::Int(n)
    }

    /// Immediate integer, rejecting values wider than a tagged word
    pub fn try_int(n: i64) -> Result<Self> {
        Value::Int(n).checked()
    }

    /// Pass the value through if it can be stored in a heap field
    ///
    /// `Value::Int` is public, so an out-of-range integer can reach the heaps
    /// without going through [`Value::int`]; every store checks here first.
    #[inline]
    pub fn checked(self) -> Result<Self> {
        match self {
            Value::Int(n) if !(MIN_INT..=MAX_INT).contains(&n) => {
                Err(IsolaError::IntOutOfRange(n))
            },
            other => Ok(other),
        }
    }

    /// Whether this value points into a heap
    #[inline]
    pub fn is_block(self) -> bool {
        !matches!(self, Value::Int(_))
    }

    #[inline]
    pub fn as_int(self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_local(self) -> Option<LocalRef> {
        match self {
            Value::Local(r) => Some(r),
            _ => None,
        }
    }

    #[inline]
    pub fn as_global(self) -> Option<GlobalRef> {
        match self {
            Value::Global(r) => Some(r),
            _ => None,
        }
    }

    /// Encode as a tagged word
    #[inline]
    pub fn to_bits(self) -> u64 {
        match self {
            Value::Int(n) => ((n as u64) << 1) | 1,
            Value::Global(r) => (r.0 as u64) << 2,
            Value::Local(r) => ((r.0 as u64) << 2) | 0b10,
        }
    }

    /// Decode a tagged word
    #[inline]
    pub fn from_bits(bits: u64) -> Self {
        if bits & 1 == 1 {
            Value::Int((bits as i64) >> 1)
        } else if bits & 0b10 == 0 {
            Value::Global(GlobalRef((bits >> 2) as u32))
        } else {
            Value::Local(LocalRef((bits >> 2) as u32))
        }
    }
}

impl From<GlobalRef> for Value {
    fn from(r: GlobalRef) -> Self {
        Value::Global(r)
    }
}

impl From<LocalRef> for Value {
    fn from(r: LocalRef) -> Self {
        Value::Local(r)
    }
}
