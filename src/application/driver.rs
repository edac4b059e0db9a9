//! Replay Driver
//!
//! The external driver the evaluators are built for: routes each price
//! observation to the right evaluator and performs the transitions the
//! evaluators only signal - promoting a matured target into a position and
//! closing a sold position.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::domain::{MarketAgeGate, ThresholdPolicy};
use crate::engine::{BuyEvaluator, EngineError, SellEvaluator, TickerLocks};
use crate::store::{CountdownStore, RecordKind, StoreError, StoredRecord};

/// One price observation fed to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub ticker: String,
    pub price: f64,
    /// Market age in seconds, when the feed provides it
    #[serde(default)]
    pub age_secs: Option<i64>,
}

/// Outcome of routing one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A position was opened (immediate buy or matured target promoted)
    Bought,
    /// A position was closed
    Sold,
    /// No decision this observation
    NoAction,
    /// Market rejected by the age gate
    TooYoung,
}

/// Driver error type.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Store failure for {ticker}: {source}")]
    Store {
        ticker: String,
        #[source]
        source: StoreError,
    },
}

impl DriverError {
    fn store(ticker: &str, source: StoreError) -> Self {
        DriverError::Store {
            ticker: ticker.to_string(),
            source,
        }
    }
}

/// Tally of a replay run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaySummary {
    pub processed: u64,
    pub bought: u64,
    pub sold: u64,
    pub rejected: u64,
    pub errors: u64,
}

/// Routes observations and owns the caller-side state transitions.
pub struct ReplayDriver {
    buy: BuyEvaluator,
    sell: SellEvaluator,
    age_gate: MarketAgeGate,
    store: Arc<dyn CountdownStore>,
}

impl ReplayDriver {
    pub fn new(config: &Config, store: Arc<dyn CountdownStore>) -> Self {
        let policy = ThresholdPolicy::from(config);
        let locks = TickerLocks::new();
        Self {
            buy: BuyEvaluator::new(
                policy,
                config.countdowns.initial_buy_secs,
                Arc::clone(&store),
                locks.clone(),
            ),
            sell: SellEvaluator::new(
                policy,
                config.countdowns.initial_sell_secs,
                Arc::clone(&store),
                locks,
            ),
            age_gate: MarketAgeGate::new(config.admission.min_age_secs),
            store,
        }
    }

    /// Route one observation: held tickers go to the sell evaluator,
    /// everything else to the buy evaluator.
    pub async fn process(&self, tick: &Tick) -> Result<TickOutcome, DriverError> {
        let ticker = tick.ticker.as_str();

        let is_held = self
            .store
            .exists(RecordKind::Position, ticker)
            .await
            .map_err(|e| DriverError::store(ticker, e))?;

        if is_held {
            if self.sell.evaluate(tick.price, ticker).await? {
                self.close_position(ticker, tick.price).await?;
                return Ok(TickOutcome::Sold);
            }
            return Ok(TickOutcome::NoAction);
        }

        // The age gate only guards admission of unseen tickers; an existing
        // target keeps being evaluated regardless.
        let is_target = self
            .store
            .exists(RecordKind::Target, ticker)
            .await
            .map_err(|e| DriverError::store(ticker, e))?;
        if !is_target && !self.age_gate.is_disabled() {
            if let Some(age) = tick.age_secs {
                if !self.age_gate.admits(age) {
                    debug!("Rejecting {}: market age {}s below minimum", ticker, age);
                    return Ok(TickOutcome::TooYoung);
                }
            }
        }

        if self.buy.evaluate(tick.price, ticker).await? {
            self.promote(ticker, tick.price).await?;
            return Ok(TickOutcome::Bought);
        }
        Ok(TickOutcome::NoAction)
    }

    /// Feed a batch of observations through the engine, logging and counting
    /// per-tick errors instead of aborting the run.
    pub async fn replay(&self, ticks: impl IntoIterator<Item = Tick>) -> ReplaySummary {
        let mut summary = ReplaySummary::default();

        for tick in ticks {
            summary.processed += 1;
            match self.process(&tick).await {
                Ok(TickOutcome::Bought) => summary.bought += 1,
                Ok(TickOutcome::Sold) => summary.sold += 1,
                Ok(TickOutcome::TooYoung) => summary.rejected += 1,
                Ok(TickOutcome::NoAction) => {}
                Err(e) => {
                    error!("Tick error for {}: {}", tick.ticker, e);
                    summary.errors += 1;
                }
            }
        }

        summary
    }

    /// Snapshot of both record tables, for the status command.
    pub async fn status(&self) -> Result<(Vec<StoredRecord>, Vec<StoredRecord>), DriverError> {
        let targets = self
            .store
            .snapshot(RecordKind::Target)
            .await
            .map_err(|e| DriverError::store("*", e))?;
        let positions = self
            .store
            .snapshot(RecordKind::Position)
            .await
            .map_err(|e| DriverError::store("*", e))?;
        Ok((targets, positions))
    }

    /// A buy signal fired: retire any matured target and open the position.
    /// The immediate-buy path already created the position record itself.
    async fn promote(&self, ticker: &str, price: f64) -> Result<(), DriverError> {
        self.store
            .remove(RecordKind::Target, ticker)
            .await
            .map_err(|e| DriverError::store(ticker, e))?;

        let already_open = self
            .store
            .exists(RecordKind::Position, ticker)
            .await
            .map_err(|e| DriverError::store(ticker, e))?;
        if !already_open {
            self.store
                .create(RecordKind::Position, ticker, None)
                .await
                .map_err(|e| DriverError::store(ticker, e))?;
        }

        info!("Opened position for {} at price {}", ticker, price);
        Ok(())
    }

    /// A sell signal fired: close out the position record.
    async fn close_position(&self, ticker: &str, price: f64) -> Result<(), DriverError> {
        self.store
            .remove(RecordKind::Position, ticker)
            .await
            .map_err(|e| DriverError::store(ticker, e))?;
        info!("Closed position for {} at price {}", ticker, price);
        Ok(())
    }
}
