//! Engine Layer - countdown state machines
//!
//! The two evaluators that decide, per price observation, whether a buy or
//! sell should happen now. Each call is one logical transaction against a
//! single ticker's record: read the elapsed time, advance the countdown,
//! report the decision. The evaluators only signal; creating a position
//! from a matured target and closing a sold position are caller moves.

pub mod buy;
pub mod locks;
pub mod sell;

pub use buy::BuyEvaluator;
pub use locks::TickerLocks;
pub use sell::SellEvaluator;

use thiserror::Error;

use crate::store::StoreError;

/// Engine error type. Every variant names the offending ticker.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Sell evaluation was requested for a ticker that is not a tracked
    /// position. Caller bug, not retryable.
    #[error("Ticker is not a tracked position: {ticker}")]
    NotAPosition { ticker: String },

    /// The record disappeared between the existence check and the read.
    /// Retryable: the next evaluation re-runs the full state machine.
    #[error("Countdown state vanished mid-evaluation for {ticker}")]
    StateVanished { ticker: String },

    /// Store I/O failure. Must never be read as a "don't trade" decision.
    #[error("Store failure for {ticker}: {source}")]
    Store {
        ticker: String,
        #[source]
        source: StoreError,
    },
}

impl EngineError {
    pub(crate) fn store(ticker: &str, source: StoreError) -> Self {
        EngineError::Store {
            ticker: ticker.to_string(),
            source,
        }
    }

    /// Map a store error after a successful existence check: a missing
    /// record at this point is a mid-call race, not an I/O failure.
    pub(crate) fn vanished(ticker: &str, source: StoreError) -> Self {
        match source {
            StoreError::RecordNotFound { .. } => EngineError::StateVanished {
                ticker: ticker.to_string(),
            },
            other => EngineError::store(ticker, other),
        }
    }
}
