use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use amorph::alloc::PagePool;
use amorph::concurrency::worklist::{ChunkedFifo, Fifo, Lifo, SharedChunkedFifo};
use amorph::runtime::{for_each, LoopConfig, Runtime};
use amorph::Worklist;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const BATCH: u32 = 1024;

fn bench_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("worklist_push_pop");

    group.bench_function("lifo", |b| {
        let q = Lifo::new();
        b.iter(|| {
            for i in 0..BATCH {
                q.push(black_box(i));
            }
            while q.pop().is_some() {}
        });
    });

    group.bench_function("fifo", |b| {
        let q = Fifo::new();
        b.iter(|| {
            for i in 0..BATCH {
                q.push(black_box(i));
            }
            while q.pop().is_some() {}
        });
    });

    group.bench_function("chunked_fifo", |b| {
        let q: ChunkedFifo<u32> = ChunkedFifo::with_pool(1, Arc::new(PagePool::new(1)));
        b.iter(|| {
            for i in 0..BATCH {
                q.push(black_box(i));
            }
            while q.pop().is_some() {}
        });
    });

    group.bench_function("shared_chunked_fifo", |b| {
        let q: SharedChunkedFifo<u32> = SharedChunkedFifo::with_pool(Arc::new(PagePool::new(1)));
        b.iter(|| {
            for i in 0..BATCH {
                q.push(black_box(i));
            }
            while q.pop().is_some() {}
        });
    });

    group.finish();
}

fn bench_for_each(c: &mut Criterion) {
    let rt = Runtime::builder().workers(4).build();
    c.bench_function("for_each_sum_10k", |b| {
        b.iter(|| {
            let sum = AtomicU64::new(0);
            for_each(
                &rt,
                0..10_000u64,
                |&x, _| {
                    sum.fetch_add(x, Ordering::Relaxed);
                    Ok(())
                },
                LoopConfig::new()
                    .loopname("bench_sum")
                    .disable_conflict_detection()
                    .no_pushes(),
            );
            black_box(sum.load(Ordering::Relaxed))
        });
    });
}

criterion_group!(benches, bench_push_pop, bench_for_each);
criterion_main!(benches);
