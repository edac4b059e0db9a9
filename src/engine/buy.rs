//! Buy Evaluator
//!
//! State machine over {no target, target, implicit position} for tickers
//! that are not currently held. A price above the immediate threshold opens
//! a position on the spot; a price in the countdown band creates a target
//! whose countdown must run out before the buy matures. Once armed, the
//! countdown path no longer looks at the live price.

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::{BuyAction, ThresholdPolicy};
use crate::store::{CountdownStore, RecordKind};

use super::{EngineError, TickerLocks};

/// Decides target creation and buy maturity for tickers not yet held.
pub struct BuyEvaluator {
    policy: ThresholdPolicy,
    initial_countdown_secs: i64,
    store: Arc<dyn CountdownStore>,
    locks: TickerLocks,
}

impl BuyEvaluator {
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

    /// Evaluate one price observation.
    ///
    /// Returns true when a buy should happen now: either the price crossed
    /// the immediate threshold, or a previously created target's countdown
    /// matured. Promoting the matured target into a position is the
    /// caller's move.
    pub async fn evaluate(&self, price: f64, ticker: &str) -> Result<bool, EngineError> {
        let _guard = self.locks.acquire(ticker).await;

        let is_target = self
            .store
            .exists(RecordKind::Target, ticker)
            .await
            .map_err(|e| EngineError::store(ticker, e))?;

        if !is_target {
            return self.begin_countdown(price, ticker).await;
        }

        match self.advance_countdown(ticker).await? {
            Some(countdown) => Ok(countdown <= 0),
            None => Ok(false),
        }
    }

    /// Classify a ticker that has no target record yet.
    async fn begin_countdown(&self, price: f64, ticker: &str) -> Result<bool, EngineError> {
        match self.policy.classify_buy(price) {
            BuyAction::ImmediateBuy => {
                info!("Creating position for {} at price {}", ticker, price);
                self.store
                    .create(RecordKind::Position, ticker, None)
                    .await
                    .map_err(|e| EngineError::store(ticker, e))?;
                Ok(true)
            }
            BuyAction::StartCountdown => {
                info!("Creating target for {} at price {}", ticker, price);
                self.store
                    .create(RecordKind::Target, ticker, Some(self.initial_countdown_secs))
                    .await
                    .map_err(|e| EngineError::store(ticker, e))?;
                Ok(false)
            }
            BuyAction::Hold => Ok(false),
        }
    }

    /// Decrement the target countdown by the elapsed time and return its new
    /// value. None means no prior check existed; the timestamp was
    /// initialized and no decision can be made yet.
    async fn advance_countdown(&self, ticker: &str) -> Result<Option<i64>, EngineError> {
        let age = self
            .store
            .last_checked_age(RecordKind::Target, ticker)
            .await
            .map_err(|e| EngineError::vanished(ticker, e))?;

        let Some(elapsed) = age else {
            debug!("No prior check recorded for {}, initializing timestamp", ticker);
            self.store
                .touch_last_checked(RecordKind::Target, ticker)
                .await
                .map_err(|e| EngineError::vanished(ticker, e))?;
            return Ok(None);
        };

        self.store
            .decrement_countdown(RecordKind::Target, ticker, elapsed, None)
            .await
            .map_err(|e| EngineError::vanished(ticker, e))?;
        self.store
            .touch_last_checked(RecordKind::Target, ticker)
            .await
            .map_err(|e| EngineError::vanished(ticker, e))?;

        let countdown = self
            .store
            .get_countdown(RecordKind::Target, ticker)
            .await
            .map_err(|e| EngineError::vanished(ticker, e))?;

        // Targets are always created armed; treat a missing value as matured
        // rather than stalling the ticker forever.
        Ok(Some(countdown.unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, MockCountdownStore, StoreError};

    fn policy() -> ThresholdPolicy {
        ThresholdPolicy::new(155.0, 150.0, 160.0, 165.0).unwrap()
    }

    fn evaluator(store: Arc<MemoryStore>) -> BuyEvaluator {
        BuyEvaluator::new(policy(), 60, store, TickerLocks::new())
    }

    #[tokio::test]
    async fn test_immediate_buy_creates_position() {
        let store = Arc::new(MemoryStore::new());
        let buy = evaluator(Arc::clone(&store));

        let decision = buy.evaluate(156.0, "KXBTC").await.unwrap();

        assert!(decision);
        assert!(store.exists(RecordKind::Position, "KXBTC").await.unwrap());
        assert!(!store.exists(RecordKind::Target, "KXBTC").await.unwrap());
    }

    #[tokio::test]
    async fn test_countdown_band_creates_target() {
        let store = Arc::new(MemoryStore::new());
        let buy = evaluator(Arc::clone(&store));

        let decision = buy.evaluate(152.0, "KXBTC").await.unwrap();

        assert!(!decision);
        assert!(store.exists(RecordKind::Target, "KXBTC").await.unwrap());
        assert_eq!(
            store.get_countdown(RecordKind::Target, "KXBTC").await.unwrap(),
            Some(60)
        );
        assert!(!store.exists(RecordKind::Position, "KXBTC").await.unwrap());
    }

    #[tokio::test]
    async fn test_below_band_creates_nothing() {
        let store = Arc::new(MemoryStore::new());
        let buy = evaluator(Arc::clone(&store));

        let decision = buy.evaluate(140.0, "KXBTC").await.unwrap();

        assert!(!decision);
        assert!(!store.exists(RecordKind::Target, "KXBTC").await.unwrap());
        assert!(!store.exists(RecordKind::Position, "KXBTC").await.unwrap());
    }

    #[tokio::test]
    async fn test_first_tick_does_not_decrement() {
        let store = Arc::new(MemoryStore::new());
        let buy = evaluator(Arc::clone(&store));

        buy.evaluate(152.0, "KXBTC").await.unwrap();
        // Re-evaluate immediately: no elapsed time, countdown must not move
        let decision = buy.evaluate(152.0, "KXBTC").await.unwrap();

        assert!(!decision);
        assert_eq!(
            store.get_countdown(RecordKind::Target, "KXBTC").await.unwrap(),
            Some(60)
        );
    }

    #[tokio::test]
    async fn test_never_checked_record_initializes_timestamp() {
        let store = Arc::new(MemoryStore::new());
        let buy = evaluator(Arc::clone(&store));

        buy.evaluate(152.0, "KXBTC").await.unwrap();
        store.clear_last_checked(RecordKind::Target, "KXBTC");

        let decision = buy.evaluate(152.0, "KXBTC").await.unwrap();

        assert!(!decision);
        // Timestamp re-initialized, countdown untouched
        assert!(store
            .last_checked_age(RecordKind::Target, "KXBTC")
            .await
            .unwrap()
            .is_some());
        assert_eq!(
            store.get_countdown(RecordKind::Target, "KXBTC").await.unwrap(),
            Some(60)
        );
    }

    #[tokio::test]
    async fn test_countdown_matures_after_elapsed_time() {
        let store = Arc::new(MemoryStore::new());
        let buy = evaluator(Arc::clone(&store));

        // Tick 1: price 152 arms a 60s target
        assert!(!buy.evaluate(152.0, "KXBTC").await.unwrap());

        // Tick 2, 61 seconds later: countdown matures even though the price
        // has fallen out of the band entirely
        store.backdate_last_checked(RecordKind::Target, "KXBTC", 61);
        let decision = buy.evaluate(140.0, "KXBTC").await.unwrap();

        assert!(decision);
        let countdown = store
            .get_countdown(RecordKind::Target, "KXBTC")
            .await
            .unwrap()
            .unwrap();
        assert!(countdown <= 0);
    }

    #[tokio::test]
    async fn test_partial_elapse_keeps_counting() {
        let store = Arc::new(MemoryStore::new());
        let buy = evaluator(Arc::clone(&store));

        buy.evaluate(152.0, "KXBTC").await.unwrap();

        store.backdate_last_checked(RecordKind::Target, "KXBTC", 20);
        assert!(!buy.evaluate(152.0, "KXBTC").await.unwrap());

        store.backdate_last_checked(RecordKind::Target, "KXBTC", 20);
        assert!(!buy.evaluate(152.0, "KXBTC").await.unwrap());

        // 60+ seconds accumulated in total
        store.backdate_last_checked(RecordKind::Target, "KXBTC", 25);
        assert!(buy.evaluate(152.0, "KXBTC").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let mut mock = MockCountdownStore::new();
        mock.expect_exists()
            .returning(|_, _| Err(StoreError::Backend("disk on fire".to_string())));

        let buy = BuyEvaluator::new(policy(), 60, Arc::new(mock), TickerLocks::new());
        let err = buy.evaluate(152.0, "KXBTC").await.unwrap_err();

        // An I/O failure is an error, never a "don't buy" decision
        assert!(matches!(err, EngineError::Store { .. }));
    }

    #[tokio::test]
    async fn test_vanished_record_is_retryable_error() {
        let mut mock = MockCountdownStore::new();
        mock.expect_exists().returning(|_, _| Ok(true));
        mock.expect_last_checked_age().returning(|kind, ticker| {
            Err(StoreError::RecordNotFound {
                kind,
                ticker: ticker.to_string(),
            })
        });

        let buy = BuyEvaluator::new(policy(), 60, Arc::new(mock), TickerLocks::new());
        let err = buy.evaluate(152.0, "KXBTC").await.unwrap_err();

        assert!(matches!(err, EngineError::StateVanished { .. }));
    }
}
