//! Promotion Tests
//!
//! Graphs promoted on one context and read on another:
//! - Shape, sharing and cycles survive the copy
//! - Promotion is reported through stats and events
//! - Large promotions grow the forwarding table without losing entries
//! - Integers wider than a tagged word never reach either heap

mod common;

use common::RuntimeFixture;
use crossbeam::channel;
use isola::logging::RuntimeEvent;
use isola::object::{Color, ABSTRACT_TAG, MAX_INT};
use isola::{IsolaError, RuntimeConfig, Value};

/// ============================================================================
/// CROSS-CONTEXT SHARING
/// ============================================================================

/// A worker builds and promotes `root -> [a, a, root]`, main reads the copy
///
/// **Invariant verified:** the shared copy has the private graph's shape,
/// including the shared child and the back edge
#[test]
fn test_promoted_graph_readable_from_other_context() {
    let fx = RuntimeFixture::new();
    let (tx, rx) = channel::bounded(1);

    let worker = fx
        .main
        .spawn(move |ctx| {
            let heap = ctx.heap_mut();
            let a = heap.alloc(3, vec![Value::int(42)]).unwrap();
            let root = heap
                .alloc(
                    0,
                    vec![Value::Local(a), Value::Local(a), Value::UNIT],
                )
                .unwrap();
            heap.set_field(root, 2, Value::Local(root)).unwrap();

            let shared = ctx.globalize(Value::Local(root)).unwrap();
            assert_eq!(ctx.canonicalize(Value::Local(root)), shared);
            assert_eq!(ctx.globalize(shared).unwrap(), shared);
            assert!(ctx.heap().is_promoted(a));
            tx.send(shared).unwrap();
        })
        .unwrap();

    let shared = rx.recv().unwrap().as_global().expect("promoted to the shared heap");
    fx.join_all(&[worker]);

    let heap = fx.runtime.heap();
    let root = heap.get(shared).unwrap();
    assert_eq!(root.header().wosize(), 3);
    assert_eq!(root.header().color(), Color::Black);

    let first = root.field(0).unwrap().as_global().unwrap();
    let second = root.field(1).unwrap().as_global().unwrap();
    assert_eq!(first, second);
    assert_eq!(root.field(2).unwrap(), Value::Global(shared));

    assert_eq!(heap.header(first).unwrap().tag(), 3);
    assert_eq!(heap.field(first, 0).unwrap(), Value::int(42));
}

/// **Invariant verified:** each promotion is counted once, repeated
/// promotion of the same root copies nothing
#[test]
fn test_promotion_stats_and_events() {
    let mut fx = RuntimeFixture::new();
    let before = fx.runtime.heap().len();

    let heap = fx.main.heap_mut();
    let leaf = heap.alloc(0, vec![Value::int(1), Value::int(2)]).unwrap();
    let root = heap.alloc(0, vec![Value::Local(leaf)]).unwrap();

    let shared = fx.main.globalize(Value::Local(root)).unwrap();
    let again = fx.main.globalize(Value::Local(root)).unwrap();
    assert_eq!(shared, again);
    assert_eq!(fx.runtime.heap().len(), before + 2);

    let summary = fx.runtime.stats().summary();
    assert_eq!(summary.objects_promoted, 2);
    assert_eq!(summary.words_promoted, 3);

    let promoted = fx.events_where(|e| matches!(e, RuntimeEvent::Promoted { .. }));
    assert_eq!(
        promoted,
        vec![RuntimeEvent::Promoted {
            context: fx.main.id(),
            objects: 2,
            words: 3,
        }]
    );
}

/// Self values of contexts are abstract shared objects carrying the id
#[test]
fn test_context_self_values() {
    let fx = RuntimeFixture::new();
    let worker = fx.main.spawn(|_ctx| {}).unwrap();
    fx.join_all(&[std::sync::Arc::clone(&worker)]);

    for (value, id) in [
        (fx.main.self_value(), fx.main.id()),
        (worker.self_value(), worker.id()),
    ] {
        assert_eq!(fx.runtime.heap().header(value).unwrap().tag(), ABSTRACT_TAG);
        assert_eq!(fx.runtime.context_id_of(value).unwrap(), id);
    }
}

/// ============================================================================
/// FORWARDING TABLE GROWTH
/// ============================================================================

/// A long list promoted through a tiny forwarding table
///
/// **Invariant verified:** the table rehashes and every object still maps
/// to its own copy
#[test]
fn test_large_promotion_rehashes_forwarding_table() {
    const LEN: usize = 5_000;

    let mut fx = RuntimeFixture::with_config(RuntimeConfig {
        forward_table_initial_capacity: 4,
        forward_table_max_chain: 2,
        record_events: true,
        ..Default::default()
    });

    let heap = fx.main.heap_mut();
    let mut nodes = Vec::with_capacity(LEN);
    let mut next = Value::UNIT;
    for i in 0..LEN {
        let node = heap.alloc(0, vec![Value::int(i as i64), next]).unwrap();
        nodes.push(node);
        next = Value::Local(node);
    }

    let shared = fx.main.globalize(next).unwrap();
    assert!(fx.main.heap().forwarding_rehashes() > 0);
    assert_eq!(fx.main.heap().forwarded_count(), LEN);

    let heap = fx.runtime.heap();
    let mut cursor = shared;
    for (i, node) in nodes.iter().enumerate().rev() {
        let global = cursor.as_global().unwrap();
        assert_eq!(fx.main.canonicalize(Value::Local(*node)), cursor);
        assert_eq!(heap.field(global, 0).unwrap(), Value::int(i as i64));
        cursor = heap.field(global, 1).unwrap();
    }
    assert_eq!(cursor, Value::UNIT);
}

/// ============================================================================
/// IMMEDIATE RANGE
/// ============================================================================

/// `Value::Int` is public, so a 64-bit integer can be built directly
///
/// **Invariant verified:** it is refused when stored, so no shared copy ever
/// reads back a truncated integer
#[test]
fn test_wide_int_cannot_reach_shared_copy() {
    let mut fx = RuntimeFixture::new();
    let before = fx.runtime.heap().len();

    let heap = fx.main.heap_mut();
    assert!(matches!(
        heap.alloc(0, vec![Value::Int(1 << 62)]),
        Err(IsolaError::IntOutOfRange(_))
    ));
    let node = heap.alloc(0, vec![Value::int(MAX_INT)]).unwrap();
    assert!(heap.set_field(node, 0, Value::Int(1 << 62)).is_err());

    let shared = fx.main.globalize(Value::Local(node)).unwrap().as_global().unwrap();
    assert_eq!(fx.runtime.heap().len(), before + 1);
    assert_eq!(fx.runtime.heap().field(shared, 0).unwrap(), Value::int(MAX_INT));
    assert!(fx.runtime.heap().set_field(shared, 0, Value::Int(1 << 62)).is_err());
}
