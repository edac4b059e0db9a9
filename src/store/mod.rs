//! Store Layer - Countdown record persistence contract
//!
//! Defines the narrow interface the evaluators use to read and mutate
//! per-ticker countdown state. The engine never sees the backend: anything
//! that can keep two keyed record tables and mutate them atomically per
//! ticker can sit behind this trait.
//!
//! Backends:
//! - `memory`: HashMap-backed store for tests and paper runs
//! - `sqlite`: durable store matching the persisted table layout

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// The two record kinds tracked per ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// Candidate for purchase, under buy-countdown observation
    Target,
    /// Currently held, potentially under sell-countdown observation
    Position,
}

impl RecordKind {
    /// Stable table name used by persisted layouts.
    pub fn table_name(&self) -> &'static str {
        match self {
            RecordKind::Target => "targets",
            RecordKind::Position => "positions",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Target => write!(f, "target"),
            RecordKind::Position => write!(f, "position"),
        }
    }
}

/// Store error type.
///
/// `RecordNotFound` is deliberately separate from `Backend`: an I/O failure
/// must never be read as "no record" by callers deciding whether to trade.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No {kind} record for ticker {ticker}")]
    RecordNotFound { kind: RecordKind, ticker: String },

    #[error("A {kind} record already exists for ticker {ticker}")]
    DuplicateRecord { kind: RecordKind, ticker: String },

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// One stored row, as reported by `snapshot` for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub ticker: String,
    /// Remaining countdown seconds; None means never armed
    pub countdown: Option<i64>,
    /// Seconds since the record was last checked; None means never checked
    pub last_checked_age_secs: Option<i64>,
}

/// Countdown record store used by the evaluators.
///
/// Each mutation is atomic per ticker: a decrement is one
/// read-modify-write unit inside the backend, never a client-side
/// read followed by a write.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CountdownStore: Send + Sync {
    /// Check whether a record of the given kind exists for the ticker.
    async fn exists(&self, kind: RecordKind, ticker: &str) -> Result<bool, StoreError>;

    /// Create a record with the given countdown (None = not armed) and a
    /// `last_checked` stamp of the creation time.
    async fn create(
        &self,
        kind: RecordKind,
        ticker: &str,
        countdown: Option<i64>,
    ) -> Result<(), StoreError>;

    /// Read the current countdown; Ok(None) means the record exists but was
    /// never armed.
    async fn get_countdown(&self, kind: RecordKind, ticker: &str)
        -> Result<Option<i64>, StoreError>;

    /// Atomically decrement the countdown by `by` seconds, clamped at
    /// `floor` when given. A never-armed countdown stays unarmed.
    async fn decrement_countdown(
        &self,
        kind: RecordKind,
        ticker: &str,
        by: i64,
        floor: Option<i64>,
    ) -> Result<(), StoreError>;

    /// Arm (or re-arm) the countdown to the given value.
    async fn arm_countdown(&self, kind: RecordKind, ticker: &str, value: i64)
        -> Result<(), StoreError>;

    /// Seconds since the record was last checked; Ok(None) when no prior
    /// check was recorded.
    async fn last_checked_age(
        &self,
        kind: RecordKind,
        ticker: &str,
    ) -> Result<Option<i64>, StoreError>;

    /// Stamp the record's `last_checked` with the current time.
    async fn touch_last_checked(&self, kind: RecordKind, ticker: &str) -> Result<(), StoreError>;

    /// Delete the record. Removing a record that does not exist is a no-op.
    async fn remove(&self, kind: RecordKind, ticker: &str) -> Result<(), StoreError>;

    /// Dump all records of one kind, ordered by ticker.
    async fn snapshot(&self, kind: RecordKind) -> Result<Vec<StoredRecord>, StoreError>;
}
