//! Per-ticker evaluation locks
//!
//! Concurrent evaluations of the same ticker would both read a stale
//! countdown and double-decrement or double-trigger a signal. The registry
//! hands out one async mutex per ticker; distinct tickers never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of per-ticker locks, shared by the buy and sell evaluators.
#[derive(Debug, Clone, Default)]
pub struct TickerLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl TickerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one ticker. The guard must be held across the
    /// whole read-decrement-write sequence.
    pub async fn acquire(&self, ticker: &str) -> OwnedMutexGuard<()> {
        let cell = {
            let mut map = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(map.entry(ticker.to_string()).or_default())
        };
        cell.lock_owned().await
    }

    /// Number of tickers with a registered lock.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
