//! SQLite countdown store
//!
//! Durable backend persisting the two record tables:
//!
//! ```sql
//! targets(ticker TEXT PRIMARY KEY, buy_countdown INTEGER, last_checked INTEGER)
//! positions(ticker TEXT PRIMARY KEY, sell_countdown INTEGER, last_checked INTEGER)
//! ```
//!
//! Timestamps are unix seconds. Every countdown mutation is a single UPDATE
//! statement, so the read-decrement-write cycle is atomic inside SQLite.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{CountdownStore, RecordKind, StoreError, StoredRecord};

const BUSY_TIMEOUT_MS: u64 = 5_000;

/// SQLite-backed countdown store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and ensure the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Backend(format!("Failed to create {}: {}", parent.display(), e)))?;
            }
        }

        let conn = Connection::open(path).map_err(backend)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(backend)?;
        conn.pragma_update(None, "synchronous", "NORMAL").map_err(backend)?;
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
            .map_err(backend)?;

        let store = Self { conn: Mutex::new(conn) };
        store.initialize_schema()?;
        tracing::info!("Countdown database ready at {}", path.display());
        Ok(store)
    }

    /// Open a private in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        let store = Self { conn: Mutex::new(conn) };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS targets (
                ticker TEXT PRIMARY KEY,
                buy_countdown INTEGER,
                last_checked INTEGER
            )
            "#,
            [],
        )
        .map_err(backend)?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                ticker TEXT PRIMARY KEY,
                sell_countdown INTEGER,
                last_checked INTEGER
            )
            "#,
            [],
        )
        .map_err(backend)?;

        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Shift a record's `last_checked` into the past, as if `secs` seconds
    /// had elapsed since the last check. Simulation hook: lets replays and
    /// tests drive elapsed time without sleeping.
    pub fn backdate_last_checked(
        &self,
        kind: RecordKind,
        ticker: &str,
        secs: u64,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET last_checked = COALESCE(last_checked, ?1) - ?2 WHERE ticker = ?3",
            kind.table_name()
        );
        self.lock()
            .execute(&sql, params![now_secs(), secs as i64, ticker])
            .map_err(backend)?;
        Ok(())
    }

    fn not_found(kind: RecordKind, ticker: &str) -> StoreError {
        StoreError::RecordNotFound {
            kind,
            ticker: ticker.to_string(),
        }
    }
}

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

fn countdown_column(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Target => "buy_countdown",
        RecordKind::Position => "sell_countdown",
    }
}

#[async_trait]
impl CountdownStore for SqliteStore {
    async fn exists(&self, kind: RecordKind, ticker: &str) -> Result<bool, StoreError> {
        let sql = format!("SELECT 1 FROM {} WHERE ticker = ?1", kind.table_name());
        let found = self
            .lock()
            .query_row(&sql, params![ticker], |_| Ok(()))
            .optional()
            .map_err(backend)?;
        Ok(found.is_some())
    }

    async fn create(
        &self,
        kind: RecordKind,
        ticker: &str,
        countdown: Option<i64>,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (ticker, {}, last_checked) VALUES (?1, ?2, ?3)",
            kind.table_name(),
            countdown_column(kind)
        );
        match self.lock().execute(&sql, params![ticker, countdown, now_secs()]) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateRecord {
                    kind,
                    ticker: ticker.to_string(),
                })
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn get_countdown(
        &self,
        kind: RecordKind,
        ticker: &str,
    ) -> Result<Option<i64>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE ticker = ?1",
            countdown_column(kind),
            kind.table_name()
        );
        let row = self
            .lock()
            .query_row(&sql, params![ticker], |row| row.get::<_, Option<i64>>(0))
            .optional()
            .map_err(backend)?;
        row.ok_or_else(|| Self::not_found(kind, ticker))
    }

    async fn decrement_countdown(
        &self,
        kind: RecordKind,
        ticker: &str,
        by: i64,
        floor: Option<i64>,
    ) -> Result<(), StoreError> {
        // MAX() propagates NULL, so a never-armed countdown stays unarmed
        // on both paths.
        let column = countdown_column(kind);
        let affected = match floor {
            Some(floor) => {
                let sql = format!(
                    "UPDATE {} SET {column} = MAX({column} - ?1, ?2) WHERE ticker = ?3",
                    kind.table_name()
                );
                self.lock()
                    .execute(&sql, params![by, floor, ticker])
                    .map_err(backend)?
            }
            None => {
                let sql = format!(
                    "UPDATE {} SET {column} = {column} - ?1 WHERE ticker = ?2",
                    kind.table_name()
                );
                self.lock().execute(&sql, params![by, ticker]).map_err(backend)?
            }
        };
        if affected == 0 {
            return Err(Self::not_found(kind, ticker));
        }
        Ok(())
    }

    async fn arm_countdown(
        &self,
        kind: RecordKind,
        ticker: &str,
        value: i64,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET {} = ?1 WHERE ticker = ?2",
            kind.table_name(),
            countdown_column(kind)
        );
        let affected = self.lock().execute(&sql, params![value, ticker]).map_err(backend)?;
        if affected == 0 {
            return Err(Self::not_found(kind, ticker));
        }
        Ok(())
    }

    async fn last_checked_age(
        &self,
        kind: RecordKind,
        ticker: &str,
    ) -> Result<Option<i64>, StoreError> {
        let sql = format!("SELECT last_checked FROM {} WHERE ticker = ?1", kind.table_name());
        let row = self
            .lock()
            .query_row(&sql, params![ticker], |row| row.get::<_, Option<i64>>(0))
            .optional()
            .map_err(backend)?;
        let last_checked = row.ok_or_else(|| Self::not_found(kind, ticker))?;
        Ok(last_checked.map(|checked| (now_secs() - checked).max(0)))
    }

    async fn touch_last_checked(&self, kind: RecordKind, ticker: &str) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET last_checked = ?1 WHERE ticker = ?2",
            kind.table_name()
        );
        let affected = self
            .lock()
            .execute(&sql, params![now_secs(), ticker])
            .map_err(backend)?;
        if affected == 0 {
            return Err(Self::not_found(kind, ticker));
        }
        Ok(())
    }

    async fn remove(&self, kind: RecordKind, ticker: &str) -> Result<(), StoreError> {
        let sql = format!("DELETE FROM {} WHERE ticker = ?1", kind.table_name());
        self.lock().execute(&sql, params![ticker]).map_err(backend)?;
        Ok(())
    }

    async fn snapshot(&self, kind: RecordKind) -> Result<Vec<StoredRecord>, StoreError> {
        let sql = format!(
            "SELECT ticker, {}, last_checked FROM {} ORDER BY ticker",
            countdown_column(kind),
            kind.table_name()
        );
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql).map_err(backend)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            })
            .map_err(backend)?;

        let now = now_secs();
        let mut out = Vec::new();
        for row in rows {
            let (ticker, countdown, last_checked) = row.map_err(backend)?;
            out.push(StoredRecord {
                ticker,
                countdown,
                last_checked_age_secs: last_checked.map(|checked| (now - checked).max(0)),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_create_and_exists() {
        let store = SqliteStore::open_in_memory().unwrap();

        assert!(!store.exists(RecordKind::Target, "KXBTC").await.unwrap());
        store
            .create(RecordKind::Target, "KXBTC", Some(60))
            .await
            .unwrap();
        assert!(store.exists(RecordKind::Target, "KXBTC").await.unwrap());
        assert!(!store.exists(RecordKind::Position, "KXBTC").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .create(RecordKind::Position, "KXBTC", None)
            .await
            .unwrap();

        let err = store
            .create(RecordKind::Position, "KXBTC", None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateRecord { .. }));
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();

        let err = store
            .get_countdown(RecordKind::Target, "GHOST")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound { .. }));

        let err = store
            .touch_last_checked(RecordKind::Target, "GHOST")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound { .. }));
    }

    #[tokio::test]
    async fn test_decrement_without_floor_goes_negative() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .create(RecordKind::Target, "KXBTC", Some(10))
            .await
            .unwrap();

        store
            .decrement_countdown(RecordKind::Target, "KXBTC", 25, None)
            .await
            .unwrap();

        assert_eq!(
            store.get_countdown(RecordKind::Target, "KXBTC").await.unwrap(),
            Some(-15)
        );
    }

    #[tokio::test]
    async fn test_decrement_clamps_at_floor() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .create(RecordKind::Position, "KXBTC", Some(10))
            .await
            .unwrap();

        store
            .decrement_countdown(RecordKind::Position, "KXBTC", 25, Some(0))
            .await
            .unwrap();

        assert_eq!(
            store
                .get_countdown(RecordKind::Position, "KXBTC")
                .await
                .unwrap(),
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_decrement_leaves_unarmed_countdown_alone() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .create(RecordKind::Position, "KXBTC", None)
            .await
            .unwrap();

        store
            .decrement_countdown(RecordKind::Position, "KXBTC", 100, Some(0))
            .await
            .unwrap();

        assert_eq!(
            store
                .get_countdown(RecordKind::Position, "KXBTC")
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_arm_and_age() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .create(RecordKind::Position, "KXBTC", None)
            .await
            .unwrap();

        store
            .arm_countdown(RecordKind::Position, "KXBTC", 300)
            .await
            .unwrap();
        assert_eq!(
            store
                .get_countdown(RecordKind::Position, "KXBTC")
                .await
                .unwrap(),
            Some(300)
        );

        let age = store
            .last_checked_age(RecordKind::Position, "KXBTC")
            .await
            .unwrap()
            .unwrap();
        assert!(age <= 1);

        store
            .backdate_last_checked(RecordKind::Position, "KXBTC", 120)
            .unwrap();
        let age = store
            .last_checked_age(RecordKind::Position, "KXBTC")
            .await
            .unwrap()
            .unwrap();
        assert!(age >= 120);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .create(RecordKind::Target, "KXBTC", Some(60))
            .await
            .unwrap();

        store.remove(RecordKind::Target, "KXBTC").await.unwrap();
        assert!(!store.exists(RecordKind::Target, "KXBTC").await.unwrap());
        store.remove(RecordKind::Target, "KXBTC").await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_sorted_by_ticker() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .create(RecordKind::Target, "ZZZ", Some(10))
            .await
            .unwrap();
        store
            .create(RecordKind::Target, "AAA", Some(20))
            .await
            .unwrap();

        let rows = store.snapshot(RecordKind::Target).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ticker, "AAA");
        assert_eq!(rows[1].ticker, "ZZZ");
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trading.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .create(RecordKind::Target, "KXBTC", Some(60))
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.exists(RecordKind::Target, "KXBTC").await.unwrap());
        assert_eq!(
            store.get_countdown(RecordKind::Target, "KXBTC").await.unwrap(),
            Some(60)
        );
    }
}
