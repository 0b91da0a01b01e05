//! Integration test entry point.

mod book_scenarios;
mod concurrency;
mod deque_model;

pub mod support {
    use matchbook_core::{BookConfig, OrderBook};
    use std::time::Duration;

    /// Install a subscriber once so failing tests can be re-run with
    /// `RUST_LOG=trace` for a play-by-play.
    pub fn init_tracing() {
        use std::sync::Once;
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
                )
                .with_test_writer()
                .try_init();
        });
    }

    /// A small started book. Scenario tests use a single worker so the
    /// processing order of same-thread submissions is deterministic.
    pub fn started_book(num_workers: usize) -> OrderBook {
        init_tracing();
        let mut config = BookConfig::small();
        config.num_workers = num_workers;
        let mut book = OrderBook::with_config(config).expect("valid test config");
        book.start().expect("workers must spawn");
        book
    }

    /// Wait for quiescence, loudly.
    pub fn idle(book: &OrderBook) {
        assert!(
            book.wait_idle(Duration::from_secs(10)),
            "book did not quiesce; {} orders pending",
            book.pending_orders()
        );
    }
}
