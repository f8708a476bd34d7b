//! IndexVec - an arena addressed by a typed index.
//!
//! [`IndexVec`] is a `Vec<T>` whose positions are named by a dedicated index
//! type `I` instead of `usize`. Heaps use it so that an object handle from a
//! private heap cannot be confused with a handle into the shared heap.
//!
//! # Example
//!
//! ```
//! use isola_util::define_idx;
//! use isola_util::index_vec::IndexVec;
//!
//! define_idx!(SlotId);
//!
//! let mut slots: IndexVec<SlotId, &str> = IndexVec::new();
//! let id = slots.push("first");
//! assert_eq!(slots[id], "first");
//! assert_eq!(slots.next_index(), SlotId(1));
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// Trait for types that can be used as indices
///
/// Implementations convert to and from `usize` losslessly for every index the
/// arena can hold; `from_usize` may panic when the value does not fit.
pub trait Idx: Copy + Eq + PartialEq {
    /// Convert from usize to index type
    fn from_usize(idx: usize) -> Self;

    /// Convert index to usize for array indexing
    fn index(self) -> usize;
}

/// A vector indexed by a specific type
///
/// Elements are only ever appended through [`IndexVec::push`], which hands
/// back the typed index of the new element. Indices stay valid until the
/// arena is cleared.
#[derive(Clone)]
pub struct IndexVec<I, T> {
    raw: Vec<T>,
    _marker: PhantomData<fn(&I)>,
}

impl<I, T> IndexVec<I, T> {
    /// Create an empty IndexVec
    #[inline]
    pub fn new() -> Self {
        Self {
            raw: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Create an IndexVec with the specified capacity
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            raw: Vec::with_capacity(capacity),
            _marker: PhantomData,
        }
    }

    /// Returns the number of elements in the vector
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns true if the vector contains no elements
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Clear all elements from the vector, keeping the allocated capacity
    ///
    /// Every index previously handed out becomes dangling.
    #[inline]
    pub fn clear(&mut self) {
        self.raw.clear()
    }
}

impl<I: Idx, T> IndexVec<I, T> {
    /// Push an element and return its typed index
    #[inline]
    pub fn push(&mut self, value: T) -> I {
        let index = self.raw.len();
        self.raw.push(value);
        I::from_usize(index)
    }

    /// The index the next `push` will return
    #[inline]
    pub fn next_index(&self) -> I {
        I::from_usize(self.raw.len())
    }

    /// Get a reference to the element at the given index
    ///
    /// Returns `None` if the index is out of bounds.
    #[inline]
    pub fn get(&self, index: I) -> Option<&T> {
        self.raw.get(index.index())
    }

    /// Get a mutable reference to the element at the given index
    ///
    /// Returns `None` if the index is out of bounds.
    #[inline]
    pub fn get_mut(&mut self, index: I) -> Option<&mut T> {
        self.raw.get_mut(index.index())
    }

    /// Iterate over (index, value) pairs
    #[inline]
    pub fn iter_enumerated(&self) -> impl Iterator<Item = (I, &T)> {
        self.raw
            .iter()
            .enumerate()
            .map(|(i, v)| (I::from_usize(i), v))
    }
}

impl<I: Idx, T> Index<I> for IndexVec<I, T> {
    type Output = T;

    #[inline]
    fn index(&self, index: I) -> &T {
        &self.raw[index.index()]
    }
}

impl<I: Idx, T> IndexMut<I> for IndexVec<I, T> {
    #[inline]
    fn index_mut(&mut self, index: I) -> &mut T {
        &mut self.raw[index.index()]
    }
}

impl<I, T> Default for IndexVec<I, T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<I, T: fmt::Debug> fmt::Debug for IndexVec<I, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.raw, f)
    }
}

impl<I: Idx, T> FromIterator<T> for IndexVec<I, T> {
    fn from_iter<It: IntoIterator<Item = T>>(iter: It) -> Self {
        Self {
            raw: iter.into_iter().collect(),
            _marker: PhantomData,
        }
    }
}

/// Macro to define index types easily
///
/// Generates a `u32` newtype implementing [`Idx`] together with the derives
/// an arena handle needs (ordering, hashing, debug).
///
/// ```
/// use isola_util::define_idx;
/// use isola_util::index_vec::{Idx, IndexVec};
///
/// define_idx!(NodeId);
///
/// let mut nodes: IndexVec<NodeId, u8> = IndexVec::new();
/// let id = nodes.push(7);
/// assert_eq!(id.index(), 0);
/// ```
#[macro_export]
macro_rules! define_idx {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $crate::index_vec::Idx for $name {
            #[inline]
            fn from_usize(idx: usize) -> Self {
                assert!(idx <= u32::MAX as usize, "Index {} exceeds u32::MAX", idx);
                $name(idx as u32)
            }

            #[inline]
            fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}
