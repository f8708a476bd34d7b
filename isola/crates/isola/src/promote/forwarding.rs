//! Forwarding Table - private object to shared copy mapping
//!
//! An open-addressing hash table owned by one context. Promotion records
//! every private object it copies here, so later references to the same
//! object resolve to the same shared copy.
//!
//! Structure:
//! - Power-of-two slot array, allocated lazily on first insertion
//! - Multiplicative hash, linear probing
//! - A probe chain longer than `max_chain` doubles the table and rehashes
//! - Keys are never removed individually; `clear` drops everything
//!
//! Usage:
//! 1. `insert_or_get(key)` to reserve the entry before copying
//! 2. Fill the returned `Option` with the shared copy
//! 3. `lookup(key)` to resolve forwarded references

use crate::object::LocalRef;

/// Keys the table can hash
pub trait ForwardKey: Copy + Eq + std::fmt::Debug {
    /// Word fed to the table's hash function
    fn hash_word(self) -> u64;
}

impl ForwardKey for u64 {
    #[inline]
    fn hash_word(self) -> u64 {
        self
    }
}

impl ForwardKey for LocalRef {
    #[inline]
    fn hash_word(self) -> u64 {
        self.0 as u64
    }
}

const HASH_MULTIPLIER: u64 = 0xcc9e_2d51;

#[derive(Debug, Clone)]
enum Slot<K, V> {
    Empty,
    Occupied { key: K, value: Option<V> },
}

/// ForwardingTable - open-addressing map from private keys to shared copies
///
/// # Examples
///
/// ```rust
/// use isola::promote::ForwardingTable;
///
/// let mut table: ForwardingTable<u64, u32> = ForwardingTable::with_limits(4, 2);
/// *table.insert_or_get(10) = Some(100);
/// assert_eq!(table.insert_or_get(10), &mut Some(100));
/// assert_eq!(table.lookup(10), 100);
/// assert_eq!(table.get(11), None);
/// ```
#[derive(Debug, Clone)]
pub struct ForwardingTable<K, V> {
    slots: Vec<Slot<K, V>>,
    initial_capacity: usize,
    max_chain: usize,
    len: usize,
    rehashes: u64,
}

impl<K: ForwardKey, V: Copy> ForwardingTable<K, V> {
    /// Create a table with the default 256 initial slots and chains of 100
    pub fn new() -> Self {
        Self::with_limits(256, 100)
    }

    /// Create a table with explicit sizing
    ///
    /// `initial_capacity` is rounded up to a power of two.
    pub fn with_limits(initial_capacity: usize, max_chain: usize) -> Self {
        Self {
            slots: Vec::new(),
            initial_capacity: initial_capacity.max(1).next_power_of_two(),
            max_chain: max_chain.max(1),
            len: 0,
            rehashes: 0,
        }
    }

    /// Number of keys present
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated slots (0 before the first insertion)
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// How many times the table has doubled
    pub fn rehash_count(&self) -> u64 {
        self.rehashes
    }

    /// Home slot of `key` in a table of `capacity` slots
    #[inline]
    pub fn home_slot(key: K, capacity: usize) -> usize {
        debug_assert!(capacity.is_power_of_two());
        let mut pos = key.hash_word().wrapping_mul(HASH_MULTIPLIER);
        pos ^= pos >> 17;
        (pos as usize) & (capacity - 1)
    }

    /// Reserve or find the entry for `key`
    ///
    /// A new key gets `None`; the caller fills it in. An existing key
    /// returns its current value.
    pub fn insert_or_get(&mut self, key: K) -> &mut Option<V> {
        if self.slots.is_empty() {
            self.slots = empty_slots(self.initial_capacity);
        }

        let pos = loop {
            if let Some(pos) = self.claim(key) {
                break pos;
            }
            self.grow();
        };

        match &mut self.slots[pos] {
            Slot::Occupied { value, .. } => value,
            Slot::Empty => crate::fatal!("forwarding slot {} empty after claim", pos),
        }
    }

    /// Value for `key`, or `None` if absent or not yet filled
    pub fn get(&self, key: K) -> Option<V> {
        let capacity = self.slots.len();
        if capacity == 0 {
            return None;
        }
        let mut pos = Self::home_slot(key, capacity);
        for _ in 0..capacity {
            match &self.slots[pos] {
                Slot::Empty => return None,
                Slot::Occupied { key: k, value } if *k == key => return *value,
                Slot::Occupied { .. } => pos = (pos + 1) & (capacity - 1),
            }
        }
        None
    }

    /// Value for a key known to be present
    ///
    /// A missing or unfilled key is a runtime invariant violation and
    /// aborts the process.
    pub fn lookup(&self, key: K) -> V {
        match self.get(key) {
            Some(value) => value,
            None => crate::fatal!("forwarding table has no entry for {:?}", key),
        }
    }

    /// Drop every entry and release the slot array
    pub fn clear(&mut self) {
        self.slots = Vec::new();
        self.len = 0;
    }

    /// Probe for `key` within `max_chain` slots, occupying an empty slot if
    /// the key is absent
    fn claim(&mut self, key: K) -> Option<usize> {
        let capacity = self.slots.len();
        let mut pos = Self::home_slot(key, capacity);
        for _ in 0..self.max_chain.min(capacity) {
            match &mut self.slots[pos] {
                slot @ Slot::Empty => {
                    *slot = Slot::Occupied { key, value: None };
                    self.len += 1;
                    return Some(pos);
                },
                Slot::Occupied { key: k, .. } if *k == key => return Some(pos),
                Slot::Occupied { .. } => pos = (pos + 1) & (capacity - 1),
            }
        }
        None
    }

    /// Double the table until every existing entry fits within `max_chain`
    fn grow(&mut self) {
        let old = std::mem::take(&mut self.slots);
        let mut capacity = old.len() * 2;

        'retry: loop {
            self.slots = empty_slots(capacity);
            self.len = 0;
            for slot in &old {
                if let Slot::Occupied { key, value } = slot {
                    let Some(pos) = self.claim(*key) else {
                        capacity *= 2;
                        continue 'retry;
                    };
                    if let Slot::Occupied { value: dest, .. } = &mut self.slots[pos] {
                        crate::ensure_invariant!(
                            dest.is_none(),
                            "duplicate forwarding key {:?} during rehash",
                            key
                        );
                        *dest = *value;
                    }
                }
            }
            break;
        }

        self.rehashes += 1;
        log::debug!(
            "forwarding table grew to {} slots ({} entries)",
            capacity,
            self.len
        );
    }
}

impl<K: ForwardKey, V: Copy> Default for ForwardingTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

fn empty_slots<K, V>(capacity: usize) -> Vec<Slot<K, V>> {
    (0..capacity).map(|_| Slot::Empty).collect()
}
