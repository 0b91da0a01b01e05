//! End-to-end matching scenarios on a single-worker book.

use crate::support::{idle, started_book};
use matchbook_core::Side;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_equal_match() {
        let mut book = started_book(1);
        let aapl = book.register_symbol("AAPL").unwrap();

        book.submit_order(1, aapl, Side::Buy, 100, 150.00).unwrap();
        idle(&book);
        assert_eq!(book.level_order_count(aapl, Side::Buy, 15000), 1);
        assert_eq!(book.best_bid_ticks(aapl), Some(15000));

        book.submit_order(2, aapl, Side::Sell, 100, 150.00).unwrap();
        idle(&book);

        assert_eq!(book.level_order_count(aapl, Side::Buy, 15000), 0);
        assert_eq!(book.level_order_count(aapl, Side::Sell, 15000), 0);
        assert!(!book.level_is_active(aapl, Side::Sell, 15000));
        assert_eq!(book.best_ask_ticks(aapl), None);

        book.shutdown();
    }

    #[test]
    fn test_partial_fill_rests_remainder() {
        let mut book = started_book(1);
        let sym = book.register_symbol("MSFT").unwrap();

        book.submit_order(1, sym, Side::Buy, 100, 150.00).unwrap();
        idle(&book);
        let (_, sell) = book.submit_order(2, sym, Side::Sell, 125, 150.00).unwrap();
        idle(&book);

        assert_eq!(book.level_order_count(sym, Side::Buy, 15000), 0);
        assert_eq!(book.level_order_count(sym, Side::Sell, 15000), 1);
        assert_eq!(sell.remaining_quantity(), Some(25));
        assert!(sell.has_rested());
        assert_eq!(book.best_ask_ticks(sym), Some(15000));

        book.shutdown();
    }

    #[test]
    fn test_cross_executes_at_maker_price() {
        let mut book = started_book(1);
        let sym = book.register_symbol("NVDA").unwrap();

        book.submit_order(1, sym, Side::Sell, 100, 150.00).unwrap();
        idle(&book);
        // An aggressive buy at 160 lifts the 150 offer; nothing rests at
        // the taker's own price.
        book.submit_order(2, sym, Side::Buy, 100, 160.00).unwrap();
        idle(&book);

        assert_eq!(book.level_order_count(sym, Side::Sell, 15000), 0);
        assert_eq!(book.level_order_count(sym, Side::Buy, 16000), 0);
        assert!(!book.level_is_active(sym, Side::Buy, 16000));
        assert_eq!(book.best_bid_ticks(sym), None);
        assert_eq!(book.best_ask_ticks(sym), None);

        book.shutdown();
    }

    #[test]
    fn test_fifo_at_level() {
        let mut book = started_book(1);
        let sym = book.register_symbol("TSLA").unwrap();

        let (_, order_a) = book.submit_order(1, sym, Side::Buy, 100, 150.00).unwrap();
        let (_, order_b) = book.submit_order(2, sym, Side::Buy, 100, 150.00).unwrap();
        idle(&book);
        assert_eq!(book.level_order_count(sym, Side::Buy, 15000), 2);

        // A partial taker consumes the head of the line: A, not B.
        book.submit_order(3, sym, Side::Sell, 50, 150.00).unwrap();
        idle(&book);
        assert_eq!(book.level_order_count(sym, Side::Buy, 15000), 2);
        assert_eq!(order_a.remaining_quantity(), Some(50));
        assert_eq!(order_b.remaining_quantity(), Some(100));

        // The next 100 finishes A (50) and eats half of B.
        book.submit_order(4, sym, Side::Sell, 100, 150.00).unwrap();
        idle(&book);
        assert_eq!(book.level_order_count(sym, Side::Buy, 15000), 1);
        assert_eq!(order_b.remaining_quantity(), Some(50));
        assert!(!order_a.has_rested());

        book.shutdown();
    }

    #[test]
    fn test_backtrack_resets_empty_side() {
        let mut book = started_book(1);
        let sym = book.register_symbol("AMZN").unwrap();

        let (_, bid) = book.submit_order(1, sym, Side::Buy, 100, 150.00).unwrap();
        idle(&book);
        assert!(book.cancel_order(bid));
        idle(&book);
        assert_eq!(book.level_order_count(sym, Side::Buy, 15000), 0);

        // The sell at 140 chases the stale best bid, finds nothing within
        // the backtrack window, and the bid side resets to empty.
        book.submit_order(2, sym, Side::Sell, 100, 140.00).unwrap();
        idle(&book);

        assert_eq!(book.best_bid_ticks(sym), None);
        assert_eq!(book.level_order_count(sym, Side::Sell, 14000), 1);

        book.shutdown();
    }

    #[test]
    fn test_backtrack_falls_back_to_inner_level() {
        let mut book = started_book(1);
        let sym = book.register_symbol("GOOG").unwrap();

        let (_, order_a) = book.submit_order(1, sym, Side::Buy, 100, 150.00).unwrap();
        let (_, order_b) = book.submit_order(1, sym, Side::Buy, 100, 149.95).unwrap();
        idle(&book);
        assert!(book.cancel_order(order_a));
        idle(&book);

        // 149.99 crosses the stale 150.00 best; the backtrack lands on
        // 149.95, which the sell does not cross, so it rests.
        book.submit_order(2, sym, Side::Sell, 100, 149.99).unwrap();
        idle(&book);

        assert_eq!(book.best_bid_ticks(sym), Some(14995));
        assert_eq!(order_b.remaining_quantity(), Some(100));
        assert_eq!(book.level_order_count(sym, Side::Buy, 14995), 1);
        assert_eq!(book.level_order_count(sym, Side::Sell, 14999), 1);
        assert_eq!(book.best_ask_ticks(sym), Some(14999));

        book.shutdown();
    }

    #[test]
    fn test_aggressive_order_walks_multiple_levels() {
        let mut book = started_book(1);
        let sym = book.register_symbol("META").unwrap();

        book.submit_order(1, sym, Side::Sell, 50, 150.00).unwrap();
        book.submit_order(1, sym, Side::Sell, 50, 150.01).unwrap();
        book.submit_order(1, sym, Side::Sell, 50, 150.02).unwrap();
        idle(&book);
        assert_eq!(book.best_ask_ticks(sym), Some(15000));

        // 120 lots sweep two levels and bite into the third.
        let (_, buy) = book.submit_order(2, sym, Side::Buy, 120, 150.05).unwrap();
        idle(&book);

        assert_eq!(book.level_order_count(sym, Side::Sell, 15000), 0);
        assert_eq!(book.level_order_count(sym, Side::Sell, 15001), 0);
        assert_eq!(book.level_order_count(sym, Side::Sell, 15002), 1);
        assert_eq!(book.best_ask_ticks(sym), Some(15002));
        assert!(!buy.has_rested(), "taker fully filled, nothing rests");

        book.shutdown();
    }

    #[test]
    fn test_cancel_contract() {
        let mut book = started_book(1);
        let sym = book.register_symbol("IBM").unwrap();

        // Never-rested orders cannot be cancelled before a worker links
        // them... but the submission may already have been processed, so
        // only assert the post-idle behavior.
        let (_, resting) = book.submit_order(1, sym, Side::Buy, 10, 100.00).unwrap();
        idle(&book);
        assert!(resting.has_rested());
        assert!(book.cancel_order(resting));
        // Double cancel is rejected immediately.
        assert!(!book.cancel_order(resting));
        idle(&book);
        assert_eq!(book.level_order_count(sym, Side::Buy, 10000), 0);

        // A fully matched order is not cancellable.
        let (_, filled) = book.submit_order(1, sym, Side::Buy, 10, 100.00).unwrap();
        idle(&book);
        book.submit_order(2, sym, Side::Sell, 10, 100.00).unwrap();
        idle(&book);
        assert!(!book.cancel_order(filled));

        book.shutdown();
    }

    #[test]
    fn test_validation_rejects_bad_submissions() {
        let mut book = started_book(1);
        let sym = book.register_symbol("ORCL").unwrap();

        assert!(book.submit_order(1, sym, Side::Buy, 0, 100.0).is_none());
        assert!(book.submit_order(1, sym, Side::Buy, 10, 0.0).is_none());
        assert!(book.submit_order(1, sym, Side::Buy, 10, -5.0).is_none());
        assert!(book.submit_order(1, sym, Side::Buy, 10, f64::NAN).is_none());
        assert!(book.submit_order(1, 999, Side::Buy, 10, 100.0).is_none());
        assert!(book.is_idle(), "rejected submissions never enter the ring");

        book.shutdown();
    }

    #[test]
    fn test_symbol_registration_is_idempotent() {
        let book = started_book(1);
        let first = book.register_symbol("AAPL").unwrap();
        let again = book.register_symbol("AAPL").unwrap();
        assert_eq!(first, again);
        assert_eq!(book.symbol_id("AAPL"), Some(first));
        assert_eq!(book.symbol_name(first).as_deref(), Some("AAPL"));
        assert_eq!(book.symbol_count(), 1);

        let other = book.register_symbol("MSFT").unwrap();
        assert_ne!(first, other);
        assert_eq!(book.symbol_count(), 2);
    }

    #[test]
    fn test_symbol_capacity_enforced() {
        let book = started_book(1);
        let max = book.config().max_symbols;
        for index in 0..max {
            book.register_symbol(&format!("SYM{index}")).unwrap();
        }
        assert!(book.register_symbol("OVERFLOW").is_err());
    }

    #[test]
    fn test_shutdown_releases_resting_book() {
        let mut book = started_book(1);
        let sym = book.register_symbol("AAPL").unwrap();
        for price_cents in 0..10u32 {
            let price = 100.0 + f64::from(price_cents) / 100.0;
            book.submit_order(1, sym, Side::Buy, 10, price).unwrap();
        }
        idle(&book);
        book.shutdown();
        // Idempotent, and Drop after shutdown must also be quiet.
        book.shutdown();
    }
}
