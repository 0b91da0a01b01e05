//! Model-based checks: the deque against `VecDeque`, tick and id codecs.

use matchbook_core::arena::Arena;
use matchbook_core::deque::{Deque, Node};
use matchbook_core::{make_order_id, price_to_ticks, symbol_id_of, ticks_to_price};
use proptest::prelude::*;
use std::collections::VecDeque;

/// Single-threaded operation against the reference model. Pushed values
/// are assigned at execution time from a unique counter.
#[derive(Debug, Clone)]
enum Op {
    PushLeft,
    PushRight,
    PopLeft,
    PopRight,
    /// Remove the nth tracked node (modulo the live count).
    Remove(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::PushLeft),
        Just(Op::PushRight),
        Just(Op::PopLeft),
        Just(Op::PopRight),
        any::<usize>().prop_map(Op::Remove),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_deque_matches_vecdeque_model(ops in proptest::collection::vec(op_strategy(), 1..200)) {
        // Proptest runs every case (and shrink) on this thread; retired
        // nodes must go home before each case's arena goes away, even when
        // an assertion bails out early.
        struct FlushOnExit;
        impl Drop for FlushOnExit {
            fn drop(&mut self) {
                matchbook_core::hazard::flush();
            }
        }
        // Drop order (reverse of declaration): deque first, then the flush
        // of this thread's retire list, then the arena the nodes return to.
        let arena: Arena<Node<u64>> = Arena::new(512);
        let _flush = FlushOnExit;
        let deque: Deque<u64> = Deque::new();
        let mut model: VecDeque<u64> = VecDeque::new();
        // Values are renumbered uniquely so model lookups by value are
        // unambiguous. Tracked (value, node) pairs feed removals.
        let mut next_value = 0u64;
        let mut live: Vec<(u64, std::ptr::NonNull<Node<u64>>)> = Vec::new();

        for op in ops {
            match op {
                Op::PushLeft => {
                    let value = next_value;
                    next_value += 1;
                    let node = deque.push_left(value, &arena).expect("arena sized for the run");
                    model.push_front(value);
                    live.push((value, node));
                }
                Op::PushRight => {
                    let value = next_value;
                    next_value += 1;
                    let node = deque.push_right(value, &arena).expect("arena sized for the run");
                    model.push_back(value);
                    live.push((value, node));
                }
                Op::PopLeft => {
                    let got = deque.pop_left();
                    let expected = model.pop_front();
                    prop_assert_eq!(got, expected);
                    if let Some(value) = got {
                        live.retain(|(v, _)| *v != value);
                    }
                }
                Op::PopRight => {
                    let got = deque.pop_right();
                    let expected = model.pop_back();
                    prop_assert_eq!(got, expected);
                    if let Some(value) = got {
                        live.retain(|(v, _)| *v != value);
                    }
                }
                Op::Remove(index) => {
                    if live.is_empty() {
                        continue;
                    }
                    let (value, node) = live.remove(index % live.len());
                    let got = unsafe { deque.remove_node(node.as_ptr()) };
                    prop_assert_eq!(got, Some(value));
                    let position = model.iter().position(|&v| v == value).expect("model desync");
                    model.remove(position);
                }
            }
        }

        // Drain and compare the tail state.
        while let Some(expected) = model.pop_front() {
            prop_assert_eq!(deque.pop_left(), Some(expected));
        }
        prop_assert_eq!(deque.pop_left(), None);
        prop_assert!(deque.is_empty());
    }

    #[test]
    fn prop_tick_conversion_round_trips(ticks in 1u64..1_000_000_000) {
        prop_assert_eq!(price_to_ticks(ticks_to_price(ticks)), ticks);
    }

    #[test]
    fn prop_price_conversion_is_cent_exact(cents in 1u64..100_000_000) {
        let dollars = cents / 100;
        let rem = cents % 100;
        let price = dollars as f64 + rem as f64 / 100.0;
        prop_assert_eq!(price_to_ticks(price), cents);
    }

    #[test]
    fn prop_order_id_codec(symbol in any::<u16>(), seq in any::<u64>()) {
        let id = make_order_id(symbol, seq);
        prop_assert_eq!(symbol_id_of(id), symbol);
        // The low 48 bits are exactly the masked sequence.
        prop_assert_eq!(id & ((1u64 << 48) - 1), seq & ((1u64 << 48) - 1));
    }
}
