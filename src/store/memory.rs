//! In-memory countdown store
//!
//! HashMap-backed implementation for tests, paper runs, and any driver that
//! does not need countdown state to survive a restart. A single mutex
//! guards both tables, so every mutation is trivially atomic.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use super::{CountdownStore, RecordKind, StoreError, StoredRecord};

#[derive(Debug, Clone, Default)]
struct Record {
    countdown: Option<i64>,
    last_checked: Option<SystemTime>,
}

#[derive(Debug, Default)]
struct Tables {
    targets: HashMap<String, Record>,
    positions: HashMap<String, Record>,
}

impl Tables {
    fn table(&self, kind: RecordKind) -> &HashMap<String, Record> {
        match kind {
            RecordKind::Target => &self.targets,
            RecordKind::Position => &self.positions,
        }
    }

    fn table_mut(&mut self, kind: RecordKind) -> &mut HashMap<String, Record> {
        match kind {
            RecordKind::Target => &mut self.targets,
            RecordKind::Position => &mut self.positions,
        }
    }
}

/// In-memory countdown store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A poisoned lock only means another thread panicked mid-mutation;
        // the map itself is still usable.
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Shift a record's `last_checked` into the past, as if `secs` seconds
    /// had elapsed since the last check. Simulation hook: lets replays and
    /// tests drive elapsed time without sleeping.
    pub fn backdate_last_checked(&self, kind: RecordKind, ticker: &str, secs: u64) {
        let mut tables = self.lock();
        if let Some(record) = tables.table_mut(kind).get_mut(ticker) {
            let base = record.last_checked.unwrap_or_else(SystemTime::now);
            record.last_checked = Some(base - Duration::from_secs(secs));
        }
    }

    /// Clear a record's `last_checked`, putting it in the "never checked"
    /// state. Simulation hook for the evaluators' first-tick guard.
    pub fn clear_last_checked(&self, kind: RecordKind, ticker: &str) {
        let mut tables = self.lock();
        if let Some(record) = tables.table_mut(kind).get_mut(ticker) {
            record.last_checked = None;
        }
    }

    fn not_found(kind: RecordKind, ticker: &str) -> StoreError {
        StoreError::RecordNotFound {
            kind,
            ticker: ticker.to_string(),
        }
    }
}

#[async_trait]
impl CountdownStore for MemoryStore {
    async fn exists(&self, kind: RecordKind, ticker: &str) -> Result<bool, StoreError> {
        Ok(self.lock().table(kind).contains_key(ticker))
    }

    async fn create(
        &self,
        kind: RecordKind,
        ticker: &str,
        countdown: Option<i64>,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let table = tables.table_mut(kind);
        if table.contains_key(ticker) {
            return Err(StoreError::DuplicateRecord {
                kind,
                ticker: ticker.to_string(),
            });
        }
        table.insert(
            ticker.to_string(),
            Record {
                countdown,
                last_checked: Some(SystemTime::now()),
            },
        );
        Ok(())
    }

    async fn get_countdown(
        &self,
        kind: RecordKind,
        ticker: &str,
    ) -> Result<Option<i64>, StoreError> {
        let tables = self.lock();
        let record = tables
            .table(kind)
            .get(ticker)
            .ok_or_else(|| Self::not_found(kind, ticker))?;
        Ok(record.countdown)
    }

    async fn decrement_countdown(
        &self,
        kind: RecordKind,
        ticker: &str,
        by: i64,
        floor: Option<i64>,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let record = tables
            .table_mut(kind)
            .get_mut(ticker)
            .ok_or_else(|| Self::not_found(kind, ticker))?;
        if let Some(current) = record.countdown {
            let mut next = current - by;
            if let Some(floor) = floor {
                next = next.max(floor);
            }
            record.countdown = Some(next);
        }
        Ok(())
    }

    async fn arm_countdown(
        &self,
        kind: RecordKind,
        ticker: &str,
        value: i64,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let record = tables
            .table_mut(kind)
            .get_mut(ticker)
            .ok_or_else(|| Self::not_found(kind, ticker))?;
        record.countdown = Some(value);
        Ok(())
    }

    async fn last_checked_age(
        &self,
        kind: RecordKind,
        ticker: &str,
    ) -> Result<Option<i64>, StoreError> {
        let tables = self.lock();
        let record = tables
            .table(kind)
            .get(ticker)
            .ok_or_else(|| Self::not_found(kind, ticker))?;
        Ok(record.last_checked.map(|checked| {
            SystemTime::now()
                .duration_since(checked)
                .unwrap_or_default()
                .as_secs() as i64
        }))
    }

    async fn touch_last_checked(&self, kind: RecordKind, ticker: &str) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let record = tables
            .table_mut(kind)
            .get_mut(ticker)
            .ok_or_else(|| Self::not_found(kind, ticker))?;
        record.last_checked = Some(SystemTime::now());
        Ok(())
    }

    async fn remove(&self, kind: RecordKind, ticker: &str) -> Result<(), StoreError> {
        self.lock().table_mut(kind).remove(ticker);
        Ok(())
    }

    async fn snapshot(&self, kind: RecordKind) -> Result<Vec<StoredRecord>, StoreError> {
        let tables = self.lock();
        let now = SystemTime::now();
        let mut rows: Vec<StoredRecord> = tables
            .table(kind)
            .iter()
            .map(|(ticker, record)| StoredRecord {
                ticker: ticker.clone(),
                countdown: record.countdown,
                last_checked_age_secs: record
                    .last_checked
                    .map(|checked| now.duration_since(checked).unwrap_or_default().as_secs() as i64),
            })
            .collect();
        rows.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        Ok(rows)
    }
}
