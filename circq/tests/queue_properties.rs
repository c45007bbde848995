//! Property-based tests for the queue invariants.
//! Arbitrary operation sequences are checked against a `VecDeque` model.

use std::collections::VecDeque;

use circq::{CircularQueue, MpQueue};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Push(u32),
    PushN(Vec<u32>),
    Pop,
    PopN(usize),
    Flush,
    Resize(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => any::<u32>().prop_map(Op::Push),
        2 => proptest::collection::vec(any::<u32>(), 0..12).prop_map(Op::PushN),
        4 => Just(Op::Pop),
        2 => (0usize..12).prop_map(Op::PopN),
        1 => Just(Op::Flush),
        1 => (0usize..24).prop_map(Op::Resize),
    ]
}

proptest::proptest! {
    /// Owner API matches a bounded FIFO model and keeps the slot accounting exact.
    #[test]
    fn circular_queue_matches_model(capacity in 0usize..16, ops in proptest::collection::vec(op(), 0..200)) {
        let mut queue = CircularQueue::with_capacity(capacity);
        let mut model = VecDeque::new();
        let mut capacity = capacity;

        for op in ops {
            match op {
                Op::Push(v) => {
                    let accepted = queue.push(v).is_ok();
                    prop_assert_eq!(accepted, model.len() < capacity);
                    if accepted {
                        model.push_back(v);
                    }
                }
                Op::PushN(items) => {
                    let n = queue.push_n(&items);
                    prop_assert_eq!(n, items.len().min(capacity - model.len()));
                    model.extend(items.iter().take(n).copied());
                }
                Op::Pop => prop_assert_eq!(queue.pop(), model.pop_front()),
                Op::PopN(len) => {
                    let mut dst = vec![0u32; len];
                    let n = queue.pop_n(&mut dst);
                    let expected: Vec<u32> = model.drain(..len.min(model.len())).collect();
                    prop_assert_eq!(&dst[..n], expected.as_slice());
                }
                Op::Flush => {
                    queue.flush();
                    model.clear();
                }
                Op::Resize(new_capacity) => {
                    let result = queue.set_capacity(new_capacity);
                    prop_assert_eq!(result.is_ok(), model.len() <= new_capacity);
                    if result.is_ok() {
                        capacity = new_capacity;
                    }
                }
            }

            prop_assert_eq!(queue.capacity(), capacity);
            prop_assert_eq!(queue.available(), model.len());
            prop_assert_eq!(queue.available() + queue.available_for_push(), capacity);
            prop_assert_eq!(queue.peek(), model.front());
        }
    }

    /// Resizing to the current capacity never changes contents.
    #[test]
    fn resize_to_same_capacity_is_identity(capacity in 1usize..32, fill in 0usize..32, shift in 0usize..32) {
        let mut queue = CircularQueue::with_capacity(capacity);
        // Move the cursors so the contents may wrap.
        for i in 0..shift.min(capacity) {
            queue.push(i).unwrap();
        }
        while queue.pop().is_some() {}
        let fill = fill.min(capacity);
        for i in 0..fill {
            queue.push(i).unwrap();
        }

        queue.set_capacity(capacity).unwrap();
        prop_assert_eq!(queue.capacity(), capacity);
        let mut drained = Vec::new();
        queue.for_each(|v| drained.push(v));
        prop_assert_eq!(drained, (0..fill).collect::<Vec<_>>());
    }

    /// A requeue pass keeps survivors in their original relative order.
    #[test]
    fn requeue_pass_preserves_survivor_order(items in proptest::collection::vec(any::<u16>(), 0..20), modulus in 1u16..5) {
        let queue = MpQueue::with_capacity(items.len().max(1));
        for &item in &items {
            queue.push(item).unwrap();
        }

        let mut consumer = queue.consumer().unwrap();
        let mut visited = Vec::new();
        consumer.for_each_requeue(|item| {
            visited.push(*item);
            *item % modulus != 0
        });
        prop_assert_eq!(&visited, &items);

        let mut survivors = Vec::new();
        consumer.for_each(|v| survivors.push(v));
        let expected: Vec<u16> = items.iter().copied().filter(|v| v % modulus != 0).collect();
        prop_assert_eq!(survivors, expected);
    }
}
