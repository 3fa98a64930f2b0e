//! SQLite document store for versioned blobs and strategy summaries.

use crate::domain::checkpoint::DATETIME_FORMAT;
use crate::domain::error::IncrementalError;
use crate::domain::metrics::PerformanceSummary;
use crate::ports::persist_port::PersistStore;
use crate::ports::summary_port::SummaryPort;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::cell::RefCell;
use tracing::debug;

/// Blobs are keyed by `(strategy_id, key)`; every `store` inserts a new
/// version and then prunes the older ones.
pub struct SqliteDocumentStore {
    pool: RefCell<Option<Pool<SqliteConnectionManager>>>,
    strategy_id: String,
}

impl SqliteDocumentStore {
    pub fn open(path: &str, pool_size: u32, strategy_id: &str) -> Result<Self, IncrementalError> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| IncrementalError::storage(e))?;

        let store = Self {
            pool: RefCell::new(Some(pool)),
            strategy_id: strategy_id.to_string(),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn in_memory(strategy_id: &str) -> Result<Self, IncrementalError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| IncrementalError::storage(e))?;

        let store = Self {
            pool: RefCell::new(Some(pool)),
            strategy_id: strategy_id.to_string(),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn strategy_id(&self) -> &str {
        &self.strategy_id
    }

    pub fn initialize_schema(&self) -> Result<(), IncrementalError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS persist_blobs (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                strategy_id TEXT NOT NULL,
                key TEXT NOT NULL,
                update_time TEXT NOT NULL,
                payload BLOB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_persist_blobs_key
                ON persist_blobs(strategy_id, key, seq);
            CREATE TABLE IF NOT EXISTS strategy_summaries (
                strategy_id TEXT PRIMARY KEY,
                updated_at TEXT NOT NULL,
                summary TEXT NOT NULL
            );",
        )
        .map_err(|e: rusqlite::Error| IncrementalError::storage(e))?;

        Ok(())
    }

    /// Number of stored versions of `key`; pruning leaves exactly one.
    pub fn version_count(&self, key: &str) -> Result<usize, IncrementalError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM persist_blobs WHERE strategy_id = ?1 AND key = ?2",
                params![self.strategy_id, key],
                |row| row.get(0),
            )
            .map_err(|e: rusqlite::Error| IncrementalError::storage(e))?;
        Ok(count as usize)
    }

    pub fn load_summary(&self) -> Result<Option<PerformanceSummary>, IncrementalError> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT summary FROM strategy_summaries WHERE strategy_id = ?1",
                params![self.strategy_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e: rusqlite::Error| IncrementalError::storage(e))?;

        json.map(|j| {
            serde_json::from_str(&j).map_err(|e| IncrementalError::Serialization {
                key: "strategy_summaries".into(),
                reason: e.to_string(),
            })
        })
        .transpose()
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, IncrementalError> {
        let pool = self
            .pool
            .borrow()
            .clone()
            .ok_or_else(|| IncrementalError::storage("sqlite store is closed"))?;
        pool.get().map_err(|e: r2d2::Error| IncrementalError::storage(e))
    }
}

fn now_string() -> String {
    chrono::Local::now()
        .naive_local()
        .format(DATETIME_FORMAT)
        .to_string()
}

impl PersistStore for SqliteDocumentStore {
    fn store(&self, key: &str, value: &[u8]) -> Result<(), IncrementalError> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO persist_blobs (strategy_id, key, update_time, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![self.strategy_id, key, now_string(), value],
        )
        .map_err(|e: rusqlite::Error| IncrementalError::storage(e))?;
        let seq = conn.last_insert_rowid();

        // Not atomic with the insert; `load` reads the newest seq regardless.
        let pruned = conn
            .execute(
                "DELETE FROM persist_blobs WHERE strategy_id = ?1 AND key = ?2 AND seq < ?3",
                params![self.strategy_id, key, seq],
            )
            .map_err(|e: rusqlite::Error| IncrementalError::storage(e))?;

        debug!(key, seq, pruned, bytes = value.len(), "stored blob");
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, IncrementalError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT payload FROM persist_blobs
             WHERE strategy_id = ?1 AND key = ?2
             ORDER BY seq DESC LIMIT 1",
            params![self.strategy_id, key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e: rusqlite::Error| IncrementalError::storage(e))
    }

    fn close(&self) -> Result<(), IncrementalError> {
        if self.pool.borrow_mut().take().is_some() {
            debug!(strategy_id = %self.strategy_id, "sqlite store closed");
        }
        Ok(())
    }
}

impl SummaryPort for SqliteDocumentStore {
    fn upsert_summary(&self, summary: &PerformanceSummary) -> Result<(), IncrementalError> {
        let json = serde_json::to_string(summary).map_err(|e| IncrementalError::Serialization {
            key: "strategy_summaries".into(),
            reason: e.to_string(),
        })?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO strategy_summaries (strategy_id, updated_at, summary)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(strategy_id) DO UPDATE SET
                updated_at = excluded.updated_at,
                summary = excluded.summary",
            params![summary.strategy_id, now_string(), json],
        )
        .map_err(|e: rusqlite::Error| IncrementalError::storage(e))?;
        Ok(())
    }
}
