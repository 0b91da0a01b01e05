//! Concurrency soaks: the deque under contention, multi-client books,
//! cancel-versus-match races.

use crate::support::{idle, started_book};
use matchbook_core::arena::Arena;
use matchbook_core::deque::{Deque, Node};
use matchbook_core::{OrderHandle, Side, hazard};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deque_concurrent_push_pop() {
        const PRODUCERS: usize = 3;
        const CONSUMERS: usize = 3;
        const PER_PRODUCER: usize = 10_000;
        const TOTAL: usize = PRODUCERS * PER_PRODUCER;

        // Arenas are declared before the deque: nodes flow back into them
        // when the deque drops.
        let arenas: Vec<Arc<Arena<Node<u64>>>> = (0..PRODUCERS)
            .map(|_| Arc::new(Arena::new(PER_PRODUCER + 1)))
            .collect();
        let deque: Arc<Deque<u64>> = Arc::new(Deque::new());
        let popped = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let deque = Arc::clone(&deque);
                let arena = Arc::clone(&arenas[p]);
                std::thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let value = (p * PER_PRODUCER + i) as u64;
                        while deque.push_right(value, &arena).is_none() {
                            // Arena starved until reclamation catches up.
                            hazard::scan();
                            arena.drain_remote_free();
                            std::thread::yield_now();
                        }
                    }
                    hazard::flush();
                })
            })
            .collect();

        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let deque = Arc::clone(&deque);
                let popped = Arc::clone(&popped);
                std::thread::spawn(move || {
                    let mut values = Vec::new();
                    while popped.load(Ordering::SeqCst) < TOTAL {
                        match deque.pop_left() {
                            Some(value) => {
                                values.push(value);
                                popped.fetch_add(1, Ordering::SeqCst);
                            }
                            None => std::thread::yield_now(),
                        }
                    }
                    hazard::flush();
                    values
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        let mut all: Vec<u64> = Vec::new();
        for consumer in consumers {
            all.extend(consumer.join().unwrap());
        }

        assert_eq!(all.len(), TOTAL);
        let unique: HashSet<u64> = all.iter().copied().collect();
        assert_eq!(unique.len(), TOTAL, "a value was popped twice");
        assert!(deque.is_empty());
    }

    #[test]
    fn test_deque_fifo_per_producer() {
        // FIFO is guaranteed for nodes linked by one thread; with a single
        // producer every consumer must see values in increasing order even
        // while racing another consumer for them.
        const TOTAL: usize = 20_000;
        let arena: Arc<Arena<Node<u64>>> = Arc::new(Arena::new(4096));
        let deque: Arc<Deque<u64>> = Arc::new(Deque::new());
        let popped = Arc::new(AtomicUsize::new(0));

        let producer = {
            let deque = Arc::clone(&deque);
            let arena = Arc::clone(&arena);
            std::thread::spawn(move || {
                for value in 0..TOTAL as u64 {
                    while deque.push_right(value, &arena).is_none() {
                        hazard::scan();
                        arena.drain_remote_free();
                        std::thread::yield_now();
                    }
                }
                hazard::flush();
            })
        };

        let consumers: Vec<_> = (0..2)
            .map(|_| {
                let deque = Arc::clone(&deque);
                let popped = Arc::clone(&popped);
                std::thread::spawn(move || {
                    let mut values = Vec::new();
                    while popped.load(Ordering::SeqCst) < TOTAL {
                        match deque.pop_left() {
                            Some(value) => {
                                values.push(value);
                                popped.fetch_add(1, Ordering::SeqCst);
                            }
                            None => std::thread::yield_now(),
                        }
                    }
                    hazard::flush();
                    values
                })
            })
            .collect();

        producer.join().unwrap();
        let sequences: Vec<Vec<u64>> = consumers.into_iter().map(|c| c.join().unwrap()).collect();

        for sequence in &sequences {
            for window in sequence.windows(2) {
                assert!(window[0] < window[1], "pop order violated FIFO");
            }
        }
        let total: usize = sequences.iter().map(Vec::len).sum();
        assert_eq!(total, TOTAL);
        let unique: HashSet<u64> = sequences.iter().flatten().copied().collect();
        assert_eq!(unique.len(), total, "a value was popped twice");
        assert!(deque.is_empty());
    }

    #[test]
    fn test_deque_concurrent_middle_removes() {
        // Two threads interleave pushes with removals of their own nodes.
        // Ownership is disjoint and nothing else consumes, so every node is
        // provably alive when its owner removes it — the liveness contract
        // remove_node demands. The contention is real: removals constantly
        // splice around the other thread's nodes.
        const THREADS: usize = 2;
        const PER_THREAD: usize = 8_000;

        let arenas: Vec<Arc<Arena<Node<u64>>>> = (0..THREADS)
            .map(|_| Arc::new(Arena::new(PER_THREAD + 1)))
            .collect();
        let deque: Arc<Deque<u64>> = Arc::new(Deque::new());

        let workers: Vec<_> = (0..THREADS)
            .map(|t| {
                let deque = Arc::clone(&deque);
                let arena = Arc::clone(&arenas[t]);
                std::thread::spawn(move || {
                    let mut owned = Vec::new();
                    let mut removed = Vec::new();
                    for i in 0..PER_THREAD {
                        let value = (t * PER_THREAD + i) as u64;
                        let node = loop {
                            match deque.push_right(value, &arena) {
                                Some(node) => break node,
                                None => {
                                    hazard::scan();
                                    arena.drain_remote_free();
                                    std::thread::yield_now();
                                }
                            }
                        };
                        owned.push((value, node));
                        // Remove an older node of ours every other push.
                        if i % 2 == 1 {
                            let (expect, victim) = owned.remove(owned.len() / 2);
                            let got = unsafe { deque.remove_node(victim.as_ptr()) };
                            assert_eq!(got, Some(expect), "own node vanished");
                            removed.push(expect);
                        }
                    }
                    for (expect, victim) in owned {
                        let got = unsafe { deque.remove_node(victim.as_ptr()) };
                        assert_eq!(got, Some(expect), "own node vanished");
                        removed.push(expect);
                    }
                    hazard::flush();
                    removed
                })
            })
            .collect();

        let mut all = Vec::new();
        for worker in workers {
            all.extend(worker.join().unwrap());
        }
        assert_eq!(all.len(), THREADS * PER_THREAD);
        let unique: HashSet<u64> = all.iter().copied().collect();
        assert_eq!(unique.len(), all.len());
        assert!(deque.is_empty());
    }

    #[test]
    fn test_book_concurrent_clients() {
        const CLIENTS: usize = 4;
        const PER_CLIENT: usize = 1_500;

        let mut book = started_book(3);
        let sym = book.register_symbol("AAPL").unwrap();

        let submitted = std::thread::scope(|scope| {
            let book = &book;
            let handles: Vec<_> = (0..CLIENTS)
                .map(|client| {
                    scope.spawn(move || {
                        let mut submitted_buy = 0u64;
                        let mut submitted_sell = 0u64;
                        let mut mine: Vec<(Side, OrderHandle)> = Vec::new();
                        let mut state = (client as u64 + 1) * 0x9e37_79b9;
                        for _ in 0..PER_CLIENT {
                            state ^= state << 13;
                            state ^= state >> 7;
                            state ^= state << 17;
                            let side = if state % 2 == 0 { Side::Buy } else { Side::Sell };
                            let quantity = (state % 40 + 1) as u32;
                            let price = 100.0 + ((state >> 8) % 15) as f64 / 100.0;
                            if let Some((_, handle)) =
                                book.submit_order(client as u32, sym, side, quantity, price)
                            {
                                match side {
                                    Side::Buy => submitted_buy += u64::from(quantity),
                                    Side::Sell => submitted_sell += u64::from(quantity),
                                }
                                mine.push((side, handle));
                            }
                        }
                        (submitted_buy, submitted_sell, mine)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect::<Vec<_>>()
        });
        idle(&book);

        let mut submitted_buy = 0u64;
        let mut submitted_sell = 0u64;
        let mut resting_buy = 0u64;
        let mut resting_sell = 0u64;
        for (buys, sells, handles) in &submitted {
            submitted_buy += buys;
            submitted_sell += sells;
            for (side, handle) in handles {
                let remaining = u64::from(handle.remaining_quantity().unwrap_or(0));
                match side {
                    Side::Buy => resting_buy += remaining,
                    Side::Sell => resting_sell += remaining,
                }
            }
        }
        assert_eq!(
            submitted_buy - resting_buy,
            submitted_sell - resting_sell,
            "matched quantities diverged under concurrency"
        );

        book.shutdown();
    }

    #[test]
    fn test_cancel_versus_match_race() {
        const ROUNDS: usize = 40;
        const BATCH: usize = 50;

        let mut book = started_book(3);
        let sym = book.register_symbol("AAPL").unwrap();

        for round in 0..ROUNDS {
            // Seed a batch of resting bids.
            let handles: Vec<OrderHandle> = (0..BATCH)
                .map(|i| {
                    let price = 100.0 + (i % 5) as f64 / 100.0;
                    book.submit_order(1, sym, Side::Buy, 10, price).unwrap().1
                })
                .collect();
            idle(&book);

            // One thread cancels them while another sells into them; every
            // order must end up either cancelled or matched, exactly once.
            std::thread::scope(|scope| {
                let book = &book;
                let canceller = scope.spawn(move || {
                    handles.iter().filter(|h| book.cancel_order(**h)).count()
                });
                let seller = scope.spawn(move || {
                    for i in 0..BATCH {
                        let price = 100.0 + (i % 5) as f64 / 100.0;
                        book.submit_order(2, sym, Side::Sell, 10, price);
                    }
                });
                canceller.join().unwrap();
                seller.join().unwrap();
            });
            idle(&book);
            assert_eq!(book.pending_orders(), 0);

            if round % 10 == 9 {
                // Sweep residual sell remainders so the band does not
                // accumulate across rounds.
                for i in 0..5 {
                    let price = 100.0 + (i % 5) as f64 / 100.0;
                    book.submit_order(3, sym, Side::Buy, 10 * BATCH as u32, price);
                }
                idle(&book);
            }
        }

        book.shutdown();
    }
}
