//! Shared Heap - process-wide object store
//!
//! Objects here are visible to every context. Fields are atomic words
//! holding tagged [`Value`]s, so concurrent readers and writers never tear.
//! The heap is append-only: a [`GlobalRef`] stays valid for the life of the
//! heap. Reclamation belongs to the collector, which is outside this crate.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use isola_util::IndexVec;
use parking_lot::RwLock;

use crate::error::{IsolaError, Result};
use crate::object::{Color, GlobalRef, Header, Value, MAX_WOSIZE};

/// GlobalObject - a shared-heap object
pub struct GlobalObject {
    header: Header,
    fields: Box<[AtomicU64]>,
}

impl GlobalObject {
    fn new(wosize: usize, tag: u8) -> Self {
        let unit = Value::UNIT.to_bits();
        Self {
            header: Header::new(wosize, Color::Black, tag),
            fields: (0..wosize).map(|_| AtomicU64::new(unit)).collect(),
        }
    }

    pub fn header(&self) -> Header {
        self.header
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Read a field (acquire)
    pub fn field(&self, index: usize) -> Result<Value> {
        self.slot(index)
            .map(|word| Value::from_bits(word.load(Ordering::Acquire)))
    }

    /// Write a field (release)
    pub fn set_field(&self, index: usize, value: Value) -> Result<()> {
        let bits = value.checked()?.to_bits();
        self.slot(index)?.store(bits, Ordering::Release);
        Ok(())
    }

    /// Snapshot of every field
    pub fn fields(&self) -> Vec<Value> {
        self.fields
            .iter()
            .map(|word| Value::from_bits(word.load(Ordering::Acquire)))
            .collect()
    }

    fn slot(&self, index: usize) -> Result<&AtomicU64> {
        self.fields.get(index).ok_or(IsolaError::FieldOutOfBounds {
            field: index,
            size: self.fields.len(),
        })
    }
}

impl std::fmt::Debug for GlobalObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalObject")
            .field("header", &self.header)
            .field("fields", &self.fields())
            .finish()
    }
}

/// SharedHeap - append-only arena of [`GlobalObject`]s
///
/// Allocation takes a short write lock on the index; objects themselves are
/// reference counted so readers drop the lock before touching fields.
#[derive(Default)]
pub struct SharedHeap {
    objects: RwLock<IndexVec<GlobalRef, Arc<GlobalObject>>>,
    words: AtomicUsize,
}

impl SharedHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an object of `wosize` fields, all initialised to unit
    pub fn alloc_global(&self, wosize: usize, tag: u8) -> Result<GlobalRef> {
        if wosize > MAX_WOSIZE {
            return Err(IsolaError::ObjectTooLarge(wosize));
        }
        let object = Arc::new(GlobalObject::new(wosize, tag));
        let global = self.objects.write().push(object);
        self.words.fetch_add(wosize, Ordering::Relaxed);
        log::trace!("allocated shared object {:?} ({} words, tag {})", global, wosize, tag);
        Ok(global)
    }

    /// Allocate and initialise an object from `fields`
    pub fn alloc_with(&self, tag: u8, fields: &[Value]) -> Result<GlobalRef> {
        for value in fields {
            value.checked()?;
        }
        let global = self.alloc_global(fields.len(), tag)?;
        let object = self.get(global)?;
        for (i, value) in fields.iter().enumerate() {
            object.set_field(i, *value)?;
        }
        Ok(global)
    }

    /// Resolve a handle
    pub fn get(&self, global: GlobalRef) -> Result<Arc<GlobalObject>> {
        self.objects
            .read()
            .get(global)
            .cloned()
            .ok_or(IsolaError::InvalidHandle {
                heap: "shared",
                index: global.0,
            })
    }

    pub fn header(&self, global: GlobalRef) -> Result<Header> {
        Ok(self.get(global)?.header())
    }

    pub fn field(&self, global: GlobalRef, index: usize) -> Result<Value> {
        self.get(global)?.field(index)
    }

    pub fn set_field(&self, global: GlobalRef, index: usize, value: Value) -> Result<()> {
        self.get(global)?.set_field(index, value)
    }

    /// Number of objects allocated
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total fields allocated across all objects
    pub fn words_allocated(&self) -> usize {
        self.words.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for SharedHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedHeap")
            .field("objects", &self.len())
            .field("words", &self.words_allocated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_alloc_initialises_to_unit() {
        let heap = SharedHeap::new();
        let r = heap.alloc_global(3, 0).unwrap();
        let object = heap.get(r).unwrap();
        assert_eq!(object.header().color(), Color::Black);
        assert_eq!(object.fields(), vec![Value::UNIT; 3]);
        assert_eq!(heap.words_allocated(), 3);
    }

    #[test]
    fn test_field_bounds_and_handles() {
        let heap = SharedHeap::new();
        let r = heap.alloc_with(4, &[Value::int(1), Value::int(2)]).unwrap();
        assert_eq!(heap.field(r, 1).unwrap(), Value::int(2));
        assert!(matches!(
            heap.field(r, 2),
            Err(IsolaError::FieldOutOfBounds { field: 2, size: 2 })
        ));
        assert!(matches!(
            heap.get(GlobalRef(99)),
            Err(IsolaError::InvalidHandle { heap: "shared", index: 99 })
        ));
    }

    #[test]
    fn test_wide_int_never_stored() {
        let heap = SharedHeap::new();
        assert!(matches!(
            heap.alloc_with(0, &[Value::Int(1 << 62)]),
            Err(IsolaError::IntOutOfRange(_))
        ));
        assert!(heap.is_empty());

        let r = heap.alloc_with(0, &[Value::int(-3)]).unwrap();
        assert!(matches!(
            heap.set_field(r, 0, Value::Int(i64::MAX)),
            Err(IsolaError::IntOutOfRange(n)) if n == i64::MAX
        ));
        assert_eq!(heap.field(r, 0).unwrap(), Value::int(-3));
    }

    #[test]
    fn test_concurrent_allocation_yields_distinct_handles() {
        let heap = Arc::new(SharedHeap::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let heap = Arc::clone(&heap);
                thread::spawn(move || {
                    (0..100)
                        .map(|i| heap.alloc_with(0, &[Value::int(t * 1000 + i)]).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<GlobalRef> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 400);
        assert_eq!(heap.len(), 400);
    }
}
