//! Order book error types.

use crate::arena::ArenaExhausted;
use thiserror::Error;

/// Errors surfaced by the book façade.
///
/// The plain `submit_order`/`cancel_order` methods collapse these to
/// `None`/`false`; the `try_` variants return them directly.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OrderBookError {
    /// Submission referenced a symbol id that was never registered.
    #[error("unknown symbol id {symbol_id}")]
    UnknownSymbol {
        /// The offending symbol id.
        symbol_id: u16,
    },

    /// Submission carried a zero quantity.
    #[error("invalid quantity {quantity}")]
    InvalidQuantity {
        /// The offending quantity.
        quantity: u32,
    },

    /// Submission carried a non-positive or non-finite price.
    #[error("invalid price {price}")]
    InvalidPrice {
        /// The offending price.
        price: f64,
    },

    /// `register_symbol` would exceed the configured symbol capacity.
    #[error("maximum symbol count {max} exceeded")]
    MaxSymbolsExceeded {
        /// The configured limit.
        max: usize,
    },

    /// An arena had no free slot even after draining remote returns.
    #[error(transparent)]
    ArenaExhausted(#[from] ArenaExhausted),

    /// The order is not resting, so there is nothing to cancel: it never
    /// rested, was already fully matched, or a cancel is already in flight.
    #[error("order is not in a cancellable state")]
    NotCancellable,

    /// Construction-time configuration validation failed.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What was wrong.
        reason: String,
    },

    /// The OS refused to spawn a matching worker thread.
    #[error("failed to spawn matching worker")]
    WorkerSpawn(#[from] std::io::Error),
}
