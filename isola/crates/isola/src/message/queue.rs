//! Message Queue - Wait-free chunked MPSC queue
//!
//! Every context owns one queue. Any number of producers enqueue without
//! locks and without waiting on each other; exactly one consumer (the owning
//! context's thread) dequeues.
//!
//! ```text
//!  consume_chunk                                   produce_chunk
//!       │                                                │
//!       ▼                                                ▼
//!  ┌──────────┐ next ┌──────────┐ next ┌──────────┐ next ┌──────────┐
//!  │ start=4  │─────▶│ start=6  │─────▶│ start=8  │─────▶│ start=10 │─▶ (pre-allocated)
//!  │ [v4][v5] │◀─────│ [v6][v7] │◀─────│ [v8][ ] │◀─────│ [  ][  ] │
//!  └──────────┘ prev └──────────┘ prev └──────────┘ prev └──────────┘
//! ```
//!
//! Slots are claimed with a single fetch-and-increment on `produced`. The
//! producer of a chunk's first slot allocates the following chunk, so that
//! by the time the producer of the last slot needs it, it almost certainly
//! exists. The producer of the last slot republishes `produce_chunk` and then
//! `produce_chunk_start`, so later producers never walk far back along the
//! `prev` links.
//!
//! The consumer frees a chunk only after it has taken every slot in it, has
//! seen the chunk's `next` link, and has seen `produce_chunk_start` move past
//! the chunk. At that point no producer can still hold a pointer into it.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};

use crossbeam::utils::CachePadded;

use crate::ensure_invariant;
use crate::util::atomic::{load_wait_ptr, SpinWait};

/// Slots per chunk
///
/// The first-slot producer allocates the successor chunk and the last-slot
/// producer waits for it, so a chunk needs at least two slots.
pub const CHUNK_SIZE: u64 = 2;

static_assertions::const_assert!(CHUNK_SIZE >= 2);

const LAST_POS: usize = (CHUNK_SIZE - 1) as usize;

struct Entry<T> {
    valid: AtomicBool,
    msg: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Entry<T> {
    fn empty() -> Self {
        Self {
            valid: AtomicBool::new(false),
            msg: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

struct Chunk<T> {
    /// Slot number of `entries[0]`
    start: u64,
    prev: AtomicPtr<Chunk<T>>,
    next: AtomicPtr<Chunk<T>>,
    entries: [Entry<T>; CHUNK_SIZE as usize],
}

impl<T> Chunk<T> {
    fn alloc(start: u64, prev: *mut Chunk<T>) -> *mut Chunk<T> {
        Box::into_raw(Box::new(Chunk {
            start,
            prev: AtomicPtr::new(prev),
            next: AtomicPtr::new(ptr::null_mut()),
            entries: std::array::from_fn(|_| Entry::empty()),
        }))
    }
}

/// MessageQueue - wait-free multi-producer, single-consumer queue
///
/// # Examples
///
/// ```rust
/// use isola::message::MessageQueue;
///
/// let queue = MessageQueue::new();
/// let slot = queue.produce("hello");
/// assert!(!queue.has_consumed(slot));
///
/// // SAFETY: this thread is the only consumer.
/// assert_eq!(unsafe { queue.consume() }, Some("hello"));
/// assert!(queue.has_consumed(slot));
/// ```
pub struct MessageQueue<T> {
    /// Next slot a producer will claim
    produced: CachePadded<AtomicU64>,

    /// `start` of the chunk currently published in `produce_chunk`
    produce_chunk_start: CachePadded<AtomicU64>,
    produce_chunk: CachePadded<AtomicPtr<Chunk<T>>>,

    /// Next slot the consumer will take
    consumed: CachePadded<AtomicU64>,

    /// Only touched by the consumer
    consume_chunk: UnsafeCell<*mut Chunk<T>>,
}

// SAFETY: messages move from producer threads to the consumer thread, which
// needs `T: Send`. All shared mutation goes through atomics; `consume_chunk`
// and message reads are confined to the single consumer by `consume`'s
// contract.
unsafe impl<T: Send> Send for MessageQueue<T> {}
unsafe impl<T: Send> Sync for MessageQueue<T> {}

impl<T> MessageQueue<T> {
    /// Create an empty queue with one chunk
    pub fn new() -> Self {
        let chunk = Chunk::alloc(0, ptr::null_mut());
        Self {
            produced: CachePadded::new(AtomicU64::new(0)),
            produce_chunk_start: CachePadded::new(AtomicU64::new(0)),
            produce_chunk: CachePadded::new(AtomicPtr::new(chunk)),
            consumed: CachePadded::new(AtomicU64::new(0)),
            consume_chunk: UnsafeCell::new(chunk),
        }
    }

    /// Enqueue a message, returning the slot it was assigned
    ///
    /// Slot numbers are the total order in which the consumer will observe
    /// messages.
    pub fn produce(&self, msg: T) -> u64 {
        let slot = self.produced.fetch_add(1, Ordering::SeqCst);
        let pos = (slot % CHUNK_SIZE) as usize;
        let chunk_start = slot - pos as u64;

        // Older chunks may already be freed; only start from a published
        // chunk at or after ours.
        SpinWait::until("queue chunk publication", || {
            self.produce_chunk_start.load(Ordering::Acquire) >= chunk_start
        });

        let mut chunk_ptr = self.produce_chunk.load(Ordering::Acquire);

        // SAFETY: every chunk from the published produce chunk back to the
        // chunk holding `slot` is live. The consumer frees a chunk only after
        // consuming all of its slots, and it cannot get past `slot` until we
        // mark it valid below.
        let chunk = unsafe {
            ensure_invariant!(
                (*chunk_ptr).start >= chunk_start,
                "produce chunk {} is behind slot {}",
                (*chunk_ptr).start,
                slot
            );
            while (*chunk_ptr).start > chunk_start {
                chunk_ptr = (*chunk_ptr).prev.load(Ordering::Acquire);
                ensure_invariant!(
                    !chunk_ptr.is_null(),
                    "stale chunk chaining while locating slot {}",
                    slot
                );
            }
            ensure_invariant!(
                (*chunk_ptr).start == chunk_start,
                "chunk {} found for slot {}",
                (*chunk_ptr).start,
                slot
            );
            &*chunk_ptr
        };

        if pos == LAST_POS {
            // Last slot of this chunk: advance producers to the next one.
            let next = load_wait_ptr(&chunk.next, "next queue chunk");
            // SAFETY: `next` was published with release ordering by the
            // first-slot producer and is only freed after this chunk.
            let next_start = unsafe { (*next).start };
            ensure_invariant!(
                next_start == chunk_start + CHUNK_SIZE,
                "chunk {} linked after chunk {}",
                next_start,
                chunk_start
            );
            self.produce_chunk.store(next, Ordering::Release);
            self.produce_chunk_start.store(next_start, Ordering::Release);
        }

        let entry = &chunk.entries[pos];
        // SAFETY: the slot was claimed exclusively by the fetch_add above and
        // the consumer reads it only after observing `valid`.
        unsafe { (*entry.msg.get()).write(msg) };
        entry.valid.store(true, Ordering::Release);

        if pos == 0 {
            // Allocate early so the last-slot producer rarely waits.
            ensure_invariant!(
                chunk.next.load(Ordering::Acquire).is_null(),
                "chunk {} already has a successor",
                chunk_start
            );
            let next = Chunk::alloc(chunk_start + CHUNK_SIZE, chunk_ptr);
            chunk.next.store(next, Ordering::Release);
        }

        slot
    }

    /// Dequeue the next message, if one has been produced
    ///
    /// Spins briefly when a producer has claimed the next slot but not yet
    /// finished writing it.
    ///
    /// # Safety
    ///
    /// At most one thread may be inside `consume` for a given queue at any
    /// time. In the runtime this is the owning context's thread.
    pub unsafe fn consume(&self) -> Option<T> {
        let slot = self.consumed.load(Ordering::Acquire);
        if slot >= self.produced.load(Ordering::Acquire) {
            return None;
        }

        let pos = (slot % CHUNK_SIZE) as usize;
        let chunk_start = slot - pos as u64;
        // SAFETY (whole block): `consume_chunk` is owned by the single
        // consumer and always points at the live chunk holding `slot`.
        unsafe {
            let chunk_ptr = *self.consume_chunk.get();
            let chunk = &*chunk_ptr;
            ensure_invariant!(
                chunk.start == chunk_start,
                "consumer at chunk {} but slot {} expected chunk {}",
                chunk.start,
                slot,
                chunk_start
            );

            let entry = &chunk.entries[pos];
            SpinWait::until("queue slot write", || entry.valid.load(Ordering::Acquire));
            let msg = (*entry.msg.get()).assume_init_read();

            if pos == LAST_POS {
                ensure_invariant!(
                    chunk.prev.load(Ordering::Acquire).is_null(),
                    "consumed chunk {} still linked to a predecessor",
                    chunk.start
                );

                // The successor link is published after the first message,
                // it may still be in flight.
                let next = load_wait_ptr(&chunk.next, "next queue chunk");
                *self.consume_chunk.get() = next;

                // Once a producer has moved past this chunk, no producer can
                // reach it any more.
                SpinWait::until("producers leaving queue chunk", || {
                    self.produce_chunk_start.load(Ordering::Acquire) > chunk.start
                });

                ensure_invariant!(
                    (*next).prev.load(Ordering::Acquire) == chunk_ptr,
                    "chunk {} does not link back to chunk {}",
                    (*next).start,
                    chunk.start
                );
                (*next).prev.store(ptr::null_mut(), Ordering::Release);
                drop(Box::from_raw(chunk_ptr));
            }

            self.consumed.store(slot + 1, Ordering::Release);
            Some(msg)
        }
    }

    /// Whether the consumer has taken the message in `slot`
    #[inline]
    pub fn has_consumed(&self, slot: u64) -> bool {
        self.consumed.load(Ordering::Acquire) > slot
    }

    /// Total slots claimed by producers
    pub fn produced(&self) -> u64 {
        self.produced.load(Ordering::Acquire)
    }

    /// Total messages taken by the consumer
    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Acquire)
    }

    /// Messages claimed but not yet consumed (approximate under concurrency)
    pub fn pending(&self) -> u64 {
        self.produced().saturating_sub(self.consumed())
    }
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for MessageQueue<T> {
    fn drop(&mut self) {
        let produced = *self.produced.get_mut();
        let mut slot = *self.consumed.get_mut();
        let first = *self.consume_chunk.get_mut();

        // SAFETY: `&mut self` means no producer or consumer is active. Every
        // chunk reachable through `next` from the consume chunk is live and
        // owned by the queue; slots in [consumed, produced) hold written
        // messages that were never moved out.
        unsafe {
            let mut chunk = first;
            while slot < produced && !chunk.is_null() {
                let pos = (slot % CHUNK_SIZE) as usize;
                let entry = &(*chunk).entries[pos];
                if entry.valid.load(Ordering::Acquire) {
                    (*entry.msg.get()).assume_init_drop();
                }
                if pos == LAST_POS {
                    chunk = (*chunk).next.load(Ordering::Acquire);
                }
                slot += 1;
            }

            let mut chunk = first;
            while !chunk.is_null() {
                let next = (*chunk).next.load(Ordering::Acquire);
                drop(Box::from_raw(chunk));
                chunk = next;
            }
        }
    }
}

impl<T> std::fmt::Debug for MessageQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("produced", &self.produced())
            .field("consumed", &self.consumed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_empty_queue() {
        let queue: MessageQueue<u32> = MessageQueue::new();
        assert_eq!(unsafe { queue.consume() }, None);
        assert_eq!(queue.pending(), 0);
        assert!(!queue.has_consumed(0));
    }

    #[test]
    fn test_fifo_across_chunks() {
        let queue = MessageQueue::new();
        for i in 0..10u32 {
            assert_eq!(queue.produce(i), i as u64);
        }
        assert_eq!(queue.pending(), 10);

        for i in 0..10u32 {
            assert_eq!(unsafe { queue.consume() }, Some(i));
            assert!(queue.has_consumed(i as u64));
            assert!(!queue.has_consumed(i as u64 + 1));
        }
        assert_eq!(unsafe { queue.consume() }, None);
    }

    #[test]
    fn test_interleaved_produce_consume() {
        let queue = MessageQueue::new();
        let mut expected = 0u64;
        for round in 0..50u64 {
            for _ in 0..(round % 3 + 1) {
                queue.produce(queue.produced());
            }
            while let Some(v) = unsafe { queue.consume() } {
                assert_eq!(v, expected);
                expected += 1;
            }
        }
        assert_eq!(queue.consumed(), queue.produced());
    }

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_drop_releases_unconsumed_messages() {
        let drops = Arc::new(AtomicUsize::new(0));
        {
            let queue = MessageQueue::new();
            for _ in 0..7 {
                queue.produce(DropCounter(Arc::clone(&drops)));
            }
            let taken = unsafe { queue.consume() };
            assert!(taken.is_some());
            drop(taken);
            assert_eq!(drops.load(Ordering::SeqCst), 1);
        }
        assert_eq!(drops.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_concurrent_producers_single_consumer() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 2_000;

        let queue = Arc::new(MessageQueue::new());
        let barrier = Arc::new(Barrier::new(PRODUCERS + 1));

        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = Arc::clone(&queue);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for seq in 0..PER_PRODUCER {
                        queue.produce((p, seq));
                    }
                })
            })
            .collect();

        barrier.wait();
        let mut next_seq = [0usize; PRODUCERS];
        let mut received = 0;
        while received < PRODUCERS * PER_PRODUCER {
            if let Some((p, seq)) = unsafe { queue.consume() } {
                assert_eq!(seq, next_seq[p], "producer {} out of order", p);
                next_seq[p] += 1;
                received += 1;
            } else {
                std::hint::spin_loop();
            }
        }

        for handle in handles {
            handle.join().expect("producer panicked");
        }
        assert_eq!(unsafe { queue.consume() }, None);
        assert!(next_seq.iter().all(|&n| n == PER_PRODUCER));
    }
}
