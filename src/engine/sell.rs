//! Sell Evaluator
//!
//! Countdown state machine for held positions. The countdown is decremented
//! by elapsed time on every check (floored at zero); a matured or never-armed
//! countdown sells immediately, otherwise the live price decides whether to
//! sell now, arm the countdown, or do nothing.

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::{SellAction, ThresholdPolicy};
use crate::store::{CountdownStore, RecordKind};

use super::{EngineError, TickerLocks};

/// Decides sell timing for tickers currently held.
pub struct SellEvaluator {
    policy: ThresholdPolicy,
    initial_countdown_secs: i64,
    store: Arc<dyn CountdownStore>,
    locks: TickerLocks,
}

impl SellEvaluator {
    pub fn new(
        policy: ThresholdPolicy,
        initial_countdown_secs: i64,
        store: Arc<dyn CountdownStore>,
        locks: TickerLocks,
    ) -> Self {
        Self {
            policy,
            initial_countdown_secs,
            store,
            locks,
        }
    }

    /// Evaluate one price observation for a held ticker.
    ///
    /// Returns true when the position should be closed now. Closing it is
    /// the caller's move; the evaluator only reports the decision.
    ///
    /// Calling this for a ticker with no position record is a caller bug
    /// and fails with `EngineError::NotAPosition`.
    pub async fn evaluate(&self, price: f64, ticker: &str) -> Result<bool, EngineError> {
        let _guard = self.locks.acquire(ticker).await;

        let is_position = self
            .store
            .exists(RecordKind::Position, ticker)
            .await
            .map_err(|e| EngineError::store(ticker, e))?;
        if !is_position {
            return Err(EngineError::NotAPosition {
                ticker: ticker.to_string(),
            });
        }

        let age = self
            .store
            .last_checked_age(RecordKind::Position, ticker)
            .await
            .map_err(|e| EngineError::vanished(ticker, e))?;

        let Some(elapsed) = age else {
            debug!("No prior check recorded for {}, initializing timestamp", ticker);
            self.store
                .touch_last_checked(RecordKind::Position, ticker)
                .await
                .map_err(|e| EngineError::vanished(ticker, e))?;
            return Ok(false);
        };

        // Sell countdowns never go below zero
        self.store
            .decrement_countdown(RecordKind::Position, ticker, elapsed, Some(0))
            .await
            .map_err(|e| EngineError::vanished(ticker, e))?;
        self.store
            .touch_last_checked(RecordKind::Position, ticker)
            .await
            .map_err(|e| EngineError::vanished(ticker, e))?;

        match self
            .store
            .get_countdown(RecordKind::Position, ticker)
            .await
            .map_err(|e| EngineError::vanished(ticker, e))?
        {
            // A position that never armed its countdown has nothing holding
            // the sale back: sell immediately.
            None => {
                info!("Position {} has no armed sell countdown, selling", ticker);
                Ok(true)
            }
            Some(countdown) if countdown <= 0 => {
                info!("Sell countdown matured for {}", ticker);
                Ok(true)
            }
            Some(_) => self.begin_countdown(price, ticker).await,
        }
    }

    /// Countdown still running: let the live price speak.
    async fn begin_countdown(&self, price: f64, ticker: &str) -> Result<bool, EngineError> {
        match self.policy.classify_sell(price) {
            SellAction::ImmediateSell => {
                info!("Selling position for {} at price {}", ticker, price);
                Ok(true)
            }
            SellAction::StartCountdown => {
                info!("Starting sell countdown for {} at price {}", ticker, price);
                self.store
                    .arm_countdown(RecordKind::Position, ticker, self.initial_countdown_secs)
                    .await
                    .map_err(|e| EngineError::vanished(ticker, e))?;
                Ok(false)
            }
            SellAction::Hold => Ok(false),
        }
    }
}
