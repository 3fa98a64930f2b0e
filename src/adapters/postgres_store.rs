//! PostgreSQL document store, same layout as the SQLite one.

use crate::domain::error::IncrementalError;
use crate::domain::metrics::PerformanceSummary;
use crate::ports::persist_port::PersistStore;
use crate::ports::summary_port::SummaryPort;
use postgres::types::ToSql;
use postgres::{Client, NoTls};
use std::cell::RefCell;
use tracing::debug;

pub struct PostgresDocumentStore {
    client: RefCell<Option<Client>>,
    strategy_id: String,
}

impl PostgresDocumentStore {
    pub fn connect(connection_string: &str, strategy_id: &str) -> Result<Self, IncrementalError> {
        let client = Client::connect(connection_string, NoTls).map_err(IncrementalError::storage)?;
        let store = Self {
            client: RefCell::new(Some(client)),
            strategy_id: strategy_id.to_string(),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn initialize_schema(&self) -> Result<(), IncrementalError> {
        self.with_client(|client| {
            client.batch_execute(
                "CREATE TABLE IF NOT EXISTS persist_blobs (
                    seq BIGSERIAL PRIMARY KEY,
                    strategy_id TEXT NOT NULL,
                    key TEXT NOT NULL,
                    update_time TIMESTAMP NOT NULL DEFAULT now(),
                    payload BYTEA NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_persist_blobs_key
                    ON persist_blobs(strategy_id, key, seq);
                CREATE TABLE IF NOT EXISTS strategy_summaries (
                    strategy_id TEXT PRIMARY KEY,
                    updated_at TIMESTAMP NOT NULL DEFAULT now(),
                    summary TEXT NOT NULL
                );",
            )
        })
    }

    fn with_client<T>(
        &self,
        f: impl FnOnce(&mut Client) -> Result<T, postgres::Error>,
    ) -> Result<T, IncrementalError> {
        let mut guard = self.client.borrow_mut();
        let client = guard
            .as_mut()
            .ok_or_else(|| IncrementalError::storage("postgres store is closed"))?;
        f(client).map_err(IncrementalError::storage)
    }
}

impl PersistStore for PostgresDocumentStore {
    fn store(&self, key: &str, value: &[u8]) -> Result<(), IncrementalError> {
        let strategy_id = self.strategy_id.as_str();
        let seq: i64 = self.with_client(|client| {
            let params: &[&(dyn ToSql + Sync)] = &[&strategy_id, &key, &value];
            client
                .query_one(
                    "INSERT INTO persist_blobs (strategy_id, key, payload)
                     VALUES ($1, $2, $3) RETURNING seq",
                    params,
                )
                .map(|row| row.get(0))
        })?;

        let pruned = self.with_client(|client| {
            let params: &[&(dyn ToSql + Sync)] = &[&strategy_id, &key, &seq];
            client.execute(
                "DELETE FROM persist_blobs WHERE strategy_id = $1 AND key = $2 AND seq < $3",
                params,
            )
        })?;

        debug!(key, seq, pruned, bytes = value.len(), "stored blob");
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, IncrementalError> {
        let strategy_id = self.strategy_id.as_str();
        self.with_client(|client| {
            let params: &[&(dyn ToSql + Sync)] = &[&strategy_id, &key];
            client
                .query_opt(
                    "SELECT payload FROM persist_blobs
                     WHERE strategy_id = $1 AND key = $2
                     ORDER BY seq DESC LIMIT 1",
                    params,
                )
                .map(|row| row.map(|r| r.get(0)))
        })
    }

    fn close(&self) -> Result<(), IncrementalError> {
        self.client.borrow_mut().take();
        Ok(())
    }
}

impl SummaryPort for PostgresDocumentStore {
    fn upsert_summary(&self, summary: &PerformanceSummary) -> Result<(), IncrementalError> {
        let json = serde_json::to_string(summary).map_err(|e| IncrementalError::Serialization {
            key: "strategy_summaries".into(),
            reason: e.to_string(),
        })?;
        self.with_client(|client| {
            let params: &[&(dyn ToSql + Sync)] = &[&summary.strategy_id, &json];
            client.execute(
                "INSERT INTO strategy_summaries (strategy_id, summary) VALUES ($1, $2)
                 ON CONFLICT (strategy_id) DO UPDATE SET
                    updated_at = now(),
                    summary = EXCLUDED.summary",
                params,
            )
        })?;
        Ok(())
    }
}
