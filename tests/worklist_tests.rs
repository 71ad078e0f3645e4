use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use amorph::alloc::PagePool;
use amorph::concurrency::worklist::{
    ChunkedFifo, Fifo, Lifo, LocalQueues, LogOrdered, OrderedByMetric, PriorityQueue, SeqFifo,
    SharedChunkedFifo,
};
use amorph::Worklist;
use proptest::prelude::*;

#[test]
fn variants_respect_their_order() {
    let lifo = Lifo::new();
    lifo.push_initial(0..8);
    assert_eq!(
        std::iter::from_fn(|| lifo.pop()).collect::<Vec<_>>(),
        (0..8).rev().collect::<Vec<_>>()
    );

    let fifo = Fifo::new();
    fifo.push_initial(0..8);
    assert_eq!(
        std::iter::from_fn(|| fifo.pop()).collect::<Vec<_>>(),
        (0..8).collect::<Vec<_>>()
    );

    let heap = PriorityQueue::new();
    heap.push_initial([3, 1, 4, 1, 5, 9, 2, 6]);
    assert_eq!(
        std::iter::from_fn(|| heap.pop()).collect::<Vec<_>>(),
        vec![9, 6, 5, 4, 3, 2, 1, 1]
    );
}

#[test]
fn structures_nest() {
    // A local/global layering whose global side buckets by log2 into
    // locked FIFOs.
    let global = LogOrdered::new(1, |x: &usize| *x, Fifo::<usize>::new);
    let q: LocalQueues<usize, SeqFifo<usize>, _> = LocalQueues::new(1, global);
    q.push_initial(0..100);
    let mut drained: Vec<usize> = std::iter::from_fn(|| q.pop()).collect();
    drained.sort_unstable();
    assert_eq!(drained, (0..100).collect::<Vec<_>>());
    assert!(q.is_empty());
}

#[derive(Clone, Debug)]
enum Op {
    Push(u16),
    Pop,
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![(0u16..512).prop_map(Op::Push), Just(Op::Pop)],
        0..200,
    )
}

proptest! {
    #[test]
    fn lifo_matches_stack_model(ops in ops()) {
        let q = Lifo::new();
        let mut model: Vec<u16> = Vec::new();
        for op in ops {
            match op {
                Op::Push(v) => {
                    q.push(v);
                    model.push(v);
                }
                Op::Pop => prop_assert_eq!(q.pop(), model.pop()),
            }
        }
        prop_assert_eq!(q.is_empty(), model.is_empty());
    }

    #[test]
    fn fifo_matches_queue_model(ops in ops()) {
        let q = Fifo::new();
        let mut model: VecDeque<u16> = VecDeque::new();
        for op in ops {
            match op {
                Op::Push(v) => {
                    q.push(v);
                    model.push_back(v);
                }
                Op::Pop => prop_assert_eq!(q.pop(), model.pop_front()),
            }
        }
        prop_assert_eq!(q.is_empty(), model.is_empty());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn shared_chunked_fifo_matches_queue_model(ops in ops()) {
        let q: SharedChunkedFifo<u16, 4> =
            SharedChunkedFifo::with_pool(Arc::new(PagePool::new(1)));
        let mut model: VecDeque<u16> = VecDeque::new();
        for op in ops {
            match op {
                Op::Push(v) => {
                    q.push(v);
                    model.push_back(v);
                }
                Op::Pop => prop_assert_eq!(q.pop(), model.pop_front()),
            }
        }
        prop_assert_eq!(q.is_empty(), model.is_empty());
    }

    /// Single-worker chunked FIFO against a bag model: the chunk handoff
    /// order is not globally FIFO, but nothing may be lost or duplicated.
    #[test]
    fn chunked_fifo_loses_nothing(ops in ops()) {
        let q: ChunkedFifo<u16, 4> = ChunkedFifo::with_pool(1, Arc::new(PagePool::new(1)));
        let mut pushed: Vec<u16> = Vec::new();
        let mut popped: Vec<u16> = Vec::new();
        for op in ops {
            match op {
                Op::Push(v) => {
                    q.push(v);
                    pushed.push(v);
                }
                Op::Pop => {
                    if let Some(v) = q.pop() {
                        popped.push(v);
                    }
                }
            }
        }
        while let Some(v) = q.pop() {
            popped.push(v);
        }
        pushed.sort_unstable();
        popped.sort_unstable();
        prop_assert_eq!(pushed, popped);
    }

    /// Bucket monotonicity: with a single worker, pops always take from
    /// the smallest populated bucket, matching an ordered reference.
    #[test]
    fn ordered_by_metric_matches_min_bucket_model(ops in ops()) {
        let q = OrderedByMetric::new(1, 512, |x: &u16| usize::from(*x), Fifo::new);
        let mut model: BTreeMap<u16, VecDeque<u16>> = BTreeMap::new();
        for op in ops {
            match op {
                Op::Push(v) => {
                    q.push(v);
                    model.entry(v).or_default().push_back(v);
                }
                Op::Pop => {
                    let expect = model.iter_mut().next().map(|(_, bucket)| {
                        bucket.pop_front().expect("empty buckets are removed")
                    });
                    model.retain(|_, bucket| !bucket.is_empty());
                    prop_assert_eq!(q.pop(), expect);
                }
            }
        }
    }
}
