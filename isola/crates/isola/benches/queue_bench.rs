//! isola Benchmarks
//!
//! Message queue throughput and promotion cost.
//! Run with: `cargo bench --package isola`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use isola::heap::{PrivateHeap, SharedHeap};
use isola::message::MessageQueue;
use isola::promote::globalize;
use isola::{RuntimeConfig, Value};
use std::sync::Arc;
use std::thread;

fn bench_queue_single_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_single_thread");

    for &batch in &[1usize, 64, 1024] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("produce_consume", batch), &batch, |b, &n| {
            let queue = MessageQueue::new();
            b.iter(|| {
                for i in 0..n {
                    queue.produce(i);
                }
                for _ in 0..n {
                    // SAFETY: the benchmark thread is the only consumer.
                    black_box(unsafe { queue.consume() });
                }
            })
        });
    }

    group.finish();
}

fn bench_queue_multi_producer(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_multi_producer");
    const PER_PRODUCER: usize = 10_000;

    for &producers in &[2usize, 4, 8] {
        group.throughput(Throughput::Elements((producers * PER_PRODUCER) as u64));
        group.bench_with_input(
            BenchmarkId::new("producers", producers),
            &producers,
            |b, &producers| {
                b.iter(|| {
                    let queue = Arc::new(MessageQueue::new());
                    let handles: Vec<_> = (0..producers)
                        .map(|_| {
                            let queue = Arc::clone(&queue);
                            thread::spawn(move || {
                                for i in 0..PER_PRODUCER {
                                    queue.produce(i);
                                }
                            })
                        })
                        .collect();

                    let mut received = 0;
                    while received < producers * PER_PRODUCER {
                        // SAFETY: the benchmark thread is the only consumer.
                        if unsafe { queue.consume() }.is_some() {
                            received += 1;
                        }
                    }
                    for handle in handles {
                        handle.join().unwrap();
                    }
                })
            },
        );
    }

    group.finish();
}

fn bench_promotion(c: &mut Criterion) {
    let mut group = c.benchmark_group("promotion");
    let config = RuntimeConfig::default();

    for &len in &[16usize, 1024] {
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::new("list", len), &len, |b, &len| {
            let shared = SharedHeap::new();
            let mut heap = PrivateHeap::new(&config);
            b.iter(|| {
                heap.reset();
                let mut next = Value::UNIT;
                for i in 0..len {
                    let node = heap.alloc(0, vec![Value::int(i as i64), next]).unwrap();
                    next = Value::Local(node);
                }
                black_box(globalize(&mut heap, &shared, next).unwrap())
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_queue_single_thread,
    bench_queue_multi_producer,
    bench_promotion
);
criterion_main!(benches);
