//! Property tests for the lock-free and persistent queues.

#[macro_use]
mod common;

use common::*;
use foldsync::{LockFreeQueue, PersistentQueue};
use proptest::prelude::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Enqueue(u16),
    Dequeue,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![any::<u16>().prop_map(Op::Enqueue), Just(Op::Dequeue)]
}

/// Runs `producers` x `per_producer` enqueues against `consumers` dequeuers.
fn mpmc_round(producers: usize, consumers: usize, per_producer: usize) -> Vec<(usize, usize)> {
    let queue = Arc::new(LockFreeQueue::new());
    let remaining = Arc::new(AtomicUsize::new(producers * per_producer));
    std::thread::scope(|scope| {
        for p in 0..producers {
            let queue = Arc::clone(&queue);
            scope.spawn(move || {
                for i in 0..per_producer {
                    queue.enqueue((p, i));
                }
            });
        }
        let takers: Vec<_> = (0..consumers)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let remaining = Arc::clone(&remaining);
                scope.spawn(move || {
                    let mut taken = Vec::new();
                    while remaining.load(Ordering::SeqCst) > 0 {
                        if let Some(item) = queue.dequeue() {
                            remaining.fetch_sub(1, Ordering::SeqCst);
                            taken.push(item);
                        } else {
                            std::thread::yield_now();
                        }
                    }
                    taken
                })
            })
            .collect();
        let per_consumer: Vec<Vec<(usize, usize)>> = takers
            .into_iter()
            .map(|t| t.join().expect("consumer panicked"))
            .collect();
        for taken in &per_consumer {
            for p in 0..producers {
                let order: Vec<usize> = taken
                    .iter()
                    .filter(|(from, _)| *from == p)
                    .map(|(_, i)| *i)
                    .collect();
                assert!(
                    order.windows(2).all(|w| w[0] < w[1]),
                    "producer {p} reordered within one consumer"
                );
            }
        }
        per_consumer.concat()
    })
}

proptest! {
    #![proptest_config(test_proptest_config(64))]

    #[test]
    fn persistent_queue_matches_vecdeque(ops in prop::collection::vec(op(), 0..200)) {
        init_test_logging();
        let mut model = VecDeque::new();
        let mut queue = PersistentQueue::new();
        let mut versions = Vec::new();
        for op in ops {
            match op {
                Op::Enqueue(v) => {
                    versions.push((queue.clone(), model.clone()));
                    queue = queue.enqueue(v);
                    model.push_back(v);
                }
                Op::Dequeue => match queue.dequeue() {
                    Some((v, rest)) => {
                        prop_assert_eq!(Some(v), model.pop_front());
                        queue = rest;
                    }
                    None => prop_assert!(model.is_empty()),
                },
            }
            prop_assert_eq!(queue.len(), model.len());
            prop_assert_eq!(queue.peek(), model.front());
        }
        // Older versions are untouched by later operations.
        for (old, snapshot) in versions {
            let contents: Vec<u16> = old.iter().copied().collect();
            prop_assert_eq!(contents, snapshot.into_iter().collect::<Vec<_>>());
        }
    }

    #[test]
    fn lock_free_queue_matches_vecdeque_single_threaded(ops in prop::collection::vec(op(), 0..200)) {
        let mut model = VecDeque::new();
        let queue = LockFreeQueue::new();
        for op in ops {
            match op {
                Op::Enqueue(v) => {
                    queue.enqueue(v);
                    model.push_back(v);
                }
                Op::Dequeue => prop_assert_eq!(queue.dequeue(), model.pop_front()),
            }
            prop_assert_eq!(queue.is_empty(), model.is_empty());
        }
    }
}

proptest! {
    #![proptest_config(test_proptest_config(16))]

    #[test]
    fn lock_free_queue_conserves_values_under_contention(
        producers in 1_usize..5,
        consumers in 1_usize..5,
        per_producer in 1_usize..400,
    ) {
        init_test_logging();
        let mut taken = mpmc_round(producers, consumers, per_producer);
        taken.sort_unstable();
        let expected: Vec<(usize, usize)> = (0..producers)
            .flat_map(|p| (0..per_producer).map(move |i| (p, i)))
            .collect();
        prop_assert_eq!(taken, expected);
    }
}

#[test]
fn drain_empties_the_queue_in_order() {
    init_test_logging();
    test_phase!("drain_empties_the_queue_in_order");
    let queue = LockFreeQueue::new();
    for i in 0..10 {
        queue.enqueue(i);
    }
    assert_eq!(queue.drain().collect::<Vec<_>>(), (0..10).collect::<Vec<_>>());
    assert!(queue.is_empty());
    test_complete!("drain_empties_the_queue_in_order");
}
