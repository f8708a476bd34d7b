//! Globalize - deep copy of a private object graph into the shared heap
//!
//! Algorithm (iterative depth-first copy):
//! 1. On first visit of a private object, allocate its shared copy, color
//!    the private object Promoted and record the mapping in the forwarding
//!    table. This happens before any field is copied, so a cycle back to an
//!    object under construction resolves to its (partially filled) copy.
//! 2. Copy fields left to right. Immediates and shared references are
//!    copied as-is; private references are either already forwarded or are
//!    descended into.
//! 3. When an object's last field is written, pop it and store its shared
//!    reference into the parent's pending field.
//!
//! An explicit stack of frames replaces recursion, so graph depth is bounded
//! by heap memory rather than thread stack.

use std::sync::Arc;

use crate::error::Result;
use crate::heap::{GlobalObject, PrivateHeap, SharedHeap};
use crate::object::{GlobalRef, LocalRef, Value};

/// Counters for one promotion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromotionStats {
    /// Private objects copied
    pub objects: u64,
    /// Fields copied
    pub words: u64,
}

struct Frame {
    local: LocalRef,
    global: GlobalRef,
    copy: Arc<GlobalObject>,
    next_field: usize,
}

struct Promoter<'a> {
    heap: &'a mut PrivateHeap,
    shared: &'a SharedHeap,
    stats: PromotionStats,
}

impl Promoter<'_> {
    /// Allocate the shared copy and publish the mapping
    fn enter(&mut self, local: LocalRef) -> Result<Frame> {
        let header = self.heap.header(local)?;
        let global = self.shared.alloc_global(header.wosize(), header.tag())?;
        let copy = self.shared.get(global)?;

        self.heap.mark_promoted(local)?;
        let entry = self.heap.forwarding_mut().insert_or_get(local);
        crate::ensure_invariant!(entry.is_none(), "private object {:?} promoted twice", local);
        *entry = Some(global);

        self.stats.objects += 1;
        self.stats.words += header.wosize() as u64;

        Ok(Frame {
            local,
            global,
            copy,
            next_field: 0,
        })
    }

    fn run(mut self, root: LocalRef) -> Result<(GlobalRef, PromotionStats)> {
        let mut stack = vec![self.enter(root)?];

        while let Some(frame) = stack.last_mut() {
            if frame.next_field < frame.copy.len() {
                let value = self.heap.field(frame.local, frame.next_field)?;
                match value {
                    Value::Local(child) => {
                        if let Some(global) = self.heap.forwarded(child) {
                            frame.copy.set_field(frame.next_field, Value::Global(global))?;
                            frame.next_field += 1;
                        } else {
                            let child_frame = self.enter(child)?;
                            stack.push(child_frame);
                        }
                    },
                    other => {
                        frame.copy.set_field(frame.next_field, other)?;
                        frame.next_field += 1;
                    },
                }
                continue;
            }

            let done = match stack.pop() {
                Some(done) => done,
                None => break,
            };
            match stack.last_mut() {
                Some(parent) => {
                    parent.copy.set_field(parent.next_field, Value::Global(done.global))?;
                    parent.next_field += 1;
                },
                None => return Ok((done.global, self.stats)),
            }
        }

        crate::fatal!("promotion of {:?} ended without a root", root)
    }
}

/// Make `value` safe to share across contexts
///
/// Immediates and shared references are returned unchanged. A private
/// reference that is already promoted returns its existing copy. Otherwise
/// the reachable private graph is copied into `shared`, preserving sharing
/// and cycles.
pub fn globalize(heap: &mut PrivateHeap, shared: &SharedHeap, value: Value) -> Result<Value> {
    globalize_with_stats(heap, shared, value).map(|(value, _)| value)
}

/// [`globalize`], also reporting how much was copied
pub fn globalize_with_stats(
    heap: &mut PrivateHeap,
    shared: &SharedHeap,
    value: Value,
) -> Result<(Value, PromotionStats)> {
    let root = match value {
        Value::Local(local) => local,
        other => return Ok((other, PromotionStats::default())),
    };

    if let Some(global) = heap.forwarded(root) {
        return Ok((Value::Global(global), PromotionStats::default()));
    }

    let promoter = Promoter {
        heap,
        shared,
        stats: PromotionStats::default(),
    };
    let (global, stats) = promoter.run(root)?;
    log::debug!(
        "promoted {:?} to {:?} ({} objects, {} words)",
        root,
        global,
        stats.objects,
        stats.words
    );
    Ok((Value::Global(global), stats))
}

/// Replace a promoted private reference with its shared copy
///
/// Everything else is returned unchanged.
pub fn canonicalize(heap: &PrivateHeap, value: Value) -> Value {
    match value {
        Value::Local(local) => heap.forwarded(local).map(Value::Global).unwrap_or(value),
        other => other,
    }
}

/// Shared copy of a private object known to be promoted
///
/// Asking for an object that was never promoted aborts the process.
pub fn get_global_version(heap: &PrivateHeap, local: LocalRef) -> GlobalRef {
    crate::ensure_invariant!(
        heap.is_promoted(local),
        "{:?} has no shared version",
        local
    );
    heap.forwarding().lookup(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::object::Color;

    fn heaps() -> (PrivateHeap, SharedHeap) {
        (PrivateHeap::new(&RuntimeConfig::default()), SharedHeap::new())
    }

    #[test]
    fn test_immediates_and_globals_pass_through() {
        let (mut heap, shared) = heaps();
        assert_eq!(globalize(&mut heap, &shared, Value::int(4)).unwrap(), Value::int(4));
        let g = shared.alloc_global(0, 0).unwrap();
        assert_eq!(
            globalize(&mut heap, &shared, Value::Global(g)).unwrap(),
            Value::Global(g)
        );
        assert_eq!(shared.len(), 1);
    }

    #[test]
    fn test_single_object_copy() {
        let (mut heap, shared) = heaps();
        let a = heap.alloc(3, vec![Value::int(1), Value::int(2)]).unwrap();

        let (g, stats) = globalize_with_stats(&mut heap, &shared, Value::Local(a)).unwrap();
        let g = g.as_global().unwrap();
        assert_eq!(stats, PromotionStats { objects: 1, words: 2 });
        assert_eq!(shared.get(g).unwrap().fields(), vec![Value::int(1), Value::int(2)]);
        assert_eq!(shared.header(g).unwrap().tag(), 3);
        assert_eq!(heap.header(a).unwrap().color(), Color::Promoted);
        assert_eq!(get_global_version(&heap, a), g);
    }

    #[test]
    fn test_promotion_is_idempotent() {
        let (mut heap, shared) = heaps();
        let a = heap.alloc(0, vec![Value::int(1)]).unwrap();
        let first = globalize(&mut heap, &shared, Value::Local(a)).unwrap();
        let (second, stats) = globalize_with_stats(&mut heap, &shared, Value::Local(a)).unwrap();
        assert_eq!(first, second);
        assert_eq!(stats.objects, 0);
        assert_eq!(shared.len(), 1);
    }

    #[test]
    fn test_sharing_preserved() {
        let (mut heap, shared) = heaps();
        let leaf = heap.alloc(0, vec![Value::int(9)]).unwrap();
        let root = heap
            .alloc(0, vec![Value::Local(leaf), Value::Local(leaf)])
            .unwrap();

        let g = globalize(&mut heap, &shared, Value::Local(root))
            .unwrap()
            .as_global()
            .unwrap();
        let fields = shared.get(g).unwrap().fields();
        assert_eq!(fields[0], fields[1]);
        assert_eq!(shared.len(), 2);
    }

    #[test]
    fn test_cycle_preserved() {
        let (mut heap, shared) = heaps();
        let a = heap.alloc(0, vec![Value::UNIT]).unwrap();
        let b = heap.alloc(0, vec![Value::Local(a)]).unwrap();
        heap.set_field(a, 0, Value::Local(b)).unwrap();

        let ga = globalize(&mut heap, &shared, Value::Local(a))
            .unwrap()
            .as_global()
            .unwrap();
        let gb = shared.field(ga, 0).unwrap().as_global().unwrap();
        assert_eq!(shared.field(gb, 0).unwrap(), Value::Global(ga));
        assert_eq!(canonicalize(&heap, Value::Local(b)), Value::Global(gb));
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let (mut heap, shared) = heaps();
        let mut head = heap.alloc(0, vec![Value::UNIT]).unwrap();
        for i in 0..100_000 {
            head = heap.alloc(0, vec![Value::int(i), Value::Local(head)]).unwrap();
        }
        let (_, stats) = globalize_with_stats(&mut heap, &shared, Value::Local(head)).unwrap();
        assert_eq!(stats.objects, 100_001);
    }

    #[test]
    fn test_canonicalize_leaves_unpromoted() {
        let (mut heap, _) = heaps();
        let a = heap.alloc(0, vec![]).unwrap();
        assert_eq!(canonicalize(&heap, Value::Local(a)), Value::Local(a));
        assert_eq!(canonicalize(&heap, Value::int(3)), Value::int(3));
    }
}
