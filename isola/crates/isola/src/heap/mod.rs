//! Heap Module - Private and Shared Object Stores
//!
//! Each context owns a [`PrivateHeap`] that only its own thread touches.
//! Objects become visible to other contexts by promotion into the
//! process-wide [`SharedHeap`] (see [`crate::promote`]).
//!
//! A private object keeps its identity after promotion: its header turns
//! [`Color::Promoted`] and the heap's forwarding table maps it to the shared
//! copy, so the context can keep using either reference.

pub mod shared;

pub use shared::{GlobalObject, SharedHeap};

use isola_util::IndexVec;

use crate::config::RuntimeConfig;
use crate::error::{IsolaError, Result};
use crate::object::{Color, GlobalRef, Header, LocalRef, Value, MAX_WOSIZE};
use crate::promote::ForwardingTable;

/// LocalObject - a private-heap object
#[derive(Debug, Clone)]
pub struct LocalObject {
    pub(crate) header: Header,
    pub(crate) fields: Vec<Value>,
}

impl LocalObject {
    pub fn header(&self) -> Header {
        self.header
    }

    pub fn fields(&self) -> &[Value] {
        &self.fields
    }
}

/// PrivateHeap - a context's own object arena
///
/// Not `Sync`: reached only through the owning `ContextHandle`.
#[derive(Debug)]
pub struct PrivateHeap {
    objects: IndexVec<LocalRef, LocalObject>,
    forwarding: ForwardingTable<LocalRef, GlobalRef>,
    words: usize,
}

impl PrivateHeap {
    /// Empty heap with the configured forwarding-table sizing
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            objects: IndexVec::new(),
            forwarding: ForwardingTable::with_limits(
                config.forward_table_initial_capacity,
                config.forward_table_max_chain,
            ),
            words: 0,
        }
    }

    /// Allocate an object holding `fields`
    pub fn alloc(&mut self, tag: u8, fields: Vec<Value>) -> Result<LocalRef> {
        if fields.len() > MAX_WOSIZE {
            return Err(IsolaError::ObjectTooLarge(fields.len()));
        }
        for value in &fields {
            value.checked()?;
        }
        self.words += fields.len();
        Ok(self.objects.push(LocalObject {
            header: Header::new(fields.len(), Color::White, tag),
            fields,
        }))
    }

    /// Resolve a handle
    pub fn get(&self, local: LocalRef) -> Result<&LocalObject> {
        self.objects.get(local).ok_or(IsolaError::InvalidHandle {
            heap: "private",
            index: local.0,
        })
    }

    pub fn header(&self, local: LocalRef) -> Result<Header> {
        Ok(self.get(local)?.header)
    }

    pub fn field(&self, local: LocalRef, index: usize) -> Result<Value> {
        let object = self.get(local)?;
        object
            .fields
            .get(index)
            .copied()
            .ok_or(IsolaError::FieldOutOfBounds {
                field: index,
                size: object.fields.len(),
            })
    }

    /// Overwrite a field of a private object
    ///
    /// The shared copy of a promoted object is not updated; promote again or
    /// write through the shared heap.
    pub fn set_field(&mut self, local: LocalRef, index: usize, value: Value) -> Result<()> {
        let value = value.checked()?;
        let object = self.objects.get_mut(local).ok_or(IsolaError::InvalidHandle {
            heap: "private",
            index: local.0,
        })?;
        let size = object.fields.len();
        let slot = object
            .fields
            .get_mut(index)
            .ok_or(IsolaError::FieldOutOfBounds { field: index, size })?;
        *slot = value;
        Ok(())
    }

    /// Whether `local` names an object that has a shared copy
    ///
    /// False for handles that do not name an object.
    pub fn is_promoted(&self, local: LocalRef) -> bool {
        self.objects
            .get(local)
            .map(|object| object.header.is_promoted())
            .unwrap_or(false)
    }

    /// Shared copy of a promoted object, if any
    pub fn forwarded(&self, local: LocalRef) -> Option<GlobalRef> {
        if self.is_promoted(local) {
            Some(self.forwarding.lookup(local))
        } else {
            None
        }
    }

    /// Number of objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Total fields allocated since the last reset
    pub fn words_allocated(&self) -> usize {
        self.words
    }

    /// Entries in the forwarding table
    pub fn forwarded_count(&self) -> usize {
        self.forwarding.len()
    }

    /// Times the forwarding table grew
    pub fn forwarding_rehashes(&self) -> u64 {
        self.forwarding.rehash_count()
    }

    /// Discard every private object and the forwarding table
    ///
    /// All outstanding [`LocalRef`]s become dangling.
    pub fn reset(&mut self) {
        log::debug!(
            "resetting private heap ({} objects, {} forwarded)",
            self.objects.len(),
            self.forwarding.len()
        );
        self.objects.clear();
        self.forwarding.clear();
        self.words = 0;
    }

    pub(crate) fn mark_promoted(&mut self, local: LocalRef) -> Result<()> {
        let object = self.objects.get_mut(local).ok_or(IsolaError::InvalidHandle {
            heap: "private",
            index: local.0,
        })?;
        object.header = object.header.with_color(Color::Promoted);
        Ok(())
    }

    pub(crate) fn forwarding_mut(&mut self) -> &mut ForwardingTable<LocalRef, GlobalRef> {
        &mut self.forwarding
    }

    pub(crate) fn forwarding(&self) -> &ForwardingTable<LocalRef, GlobalRef> {
        &self.forwarding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> PrivateHeap {
        PrivateHeap::new(&RuntimeConfig::default())
    }

    #[test]
    fn test_alloc_and_access() {
        let mut heap = heap();
        let a = heap.alloc(0, vec![Value::int(1), Value::int(2)]).unwrap();
        let b = heap.alloc(0, vec![Value::Local(a)]).unwrap();
        assert_eq!(heap.len(), 2);
        assert_eq!(heap.words_allocated(), 3);
        assert_eq!(heap.field(b, 0).unwrap(), Value::Local(a));
        assert_eq!(heap.header(a).unwrap().color(), Color::White);

        heap.set_field(a, 1, Value::int(5)).unwrap();
        assert_eq!(heap.get(a).unwrap().fields(), &[Value::int(1), Value::int(5)]);
    }

    #[test]
    fn test_invalid_access() {
        let mut heap = heap();
        let a = heap.alloc(0, vec![Value::UNIT]).unwrap();
        assert!(matches!(
            heap.field(a, 1),
            Err(IsolaError::FieldOutOfBounds { field: 1, size: 1 })
        ));
        assert!(heap.set_field(LocalRef(7), 0, Value::UNIT).is_err());
        assert!(!heap.is_promoted(LocalRef(7)));
        assert_eq!(heap.forwarded(a), None);
    }

    /// An integer that needs bit 63 would come back negative from the shared
    /// copy, so the private heap refuses it up front
    #[test]
    fn test_wide_int_rejected() {
        let mut heap = heap();
        assert!(matches!(
            heap.alloc(0, vec![Value::UNIT, Value::Int(1 << 62)]),
            Err(IsolaError::IntOutOfRange(n)) if n == 1 << 62
        ));
        assert!(heap.is_empty());
        assert_eq!(heap.words_allocated(), 0);

        let a = heap.alloc(0, vec![Value::int(7)]).unwrap();
        assert!(matches!(
            heap.set_field(a, 0, Value::Int(i64::MIN)),
            Err(IsolaError::IntOutOfRange(_))
        ));
        assert_eq!(heap.field(a, 0).unwrap(), Value::int(7));
    }

    #[test]
    fn test_reset_discards_everything() {
        let mut heap = heap();
        let a = heap.alloc(0, vec![Value::UNIT]).unwrap();
        heap.mark_promoted(a).unwrap();
        *heap.forwarding_mut().insert_or_get(a) = Some(GlobalRef(0));
        assert_eq!(heap.forwarded(a), Some(GlobalRef(0)));

        heap.reset();
        assert!(heap.is_empty());
        assert_eq!(heap.forwarded_count(), 0);
        assert!(heap.get(a).is_err());
    }
}
