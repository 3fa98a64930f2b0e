//! Recorder that serializes run state through a `PersistStore`.
//!
//! History is cumulative: opening the recorder reloads every trade and
//! snapshot flushed by earlier runs, so each flush rewrites the complete
//! multi-run history under the same keys.

use crate::domain::checkpoint::CheckpointMeta;
use crate::domain::error::IncrementalError;
use crate::domain::ledger::{PortfolioSnapshot, RunLedger, TradeRecord};
use crate::domain::metrics::PerformanceSummary;
use crate::ports::persist_port::PersistStore;
use crate::ports::recorder_port::Recorder;
use crate::ports::summary_port::SummaryPort;
use chrono::NaiveDate;
use std::rc::Rc;
use tracing::{debug, info, warn};

pub const META_KEY: &str = "meta.json";
pub const TRADES_KEY: &str = "trades.csv";
pub const PORTFOLIO_KEY: &str = "portfolio.csv";
pub const BENCHMARK_KEY: &str = "benchmark_portfolio.csv";

struct SummarySink {
    port: Rc<dyn SummaryPort>,
    risk_free_rate: f64,
}

pub struct StoreRecorder {
    store: Rc<dyn PersistStore>,
    strategy_id: String,
    ledger: RunLedger,
    staged_meta: Option<CheckpointMeta>,
    summary: Option<SummarySink>,
    closed: bool,
}

impl StoreRecorder {
    /// Load prior history from `store`. Rows dated after the committed
    /// checkpoint belong to a run whose meta write never landed and are
    /// dropped.
    pub fn open(store: Rc<dyn PersistStore>, strategy_id: &str) -> Result<Self, IncrementalError> {
        let meta = read_meta(store.as_ref())?;

        let mut ledger = RunLedger::new();
        if let Some(bytes) = store.load(TRADES_KEY)? {
            ledger.trades = RunLedger::decode_trades(&bytes)?;
        }
        if let Some(bytes) = store.load(PORTFOLIO_KEY)? {
            ledger.portfolio = RunLedger::decode_snapshots(PORTFOLIO_KEY, &bytes)?;
        }
        if let Some(bytes) = store.load(BENCHMARK_KEY)? {
            ledger.benchmark = RunLedger::decode_snapshots(BENCHMARK_KEY, &bytes)?;
        }

        let dropped = ledger.truncate_after(meta.as_ref().map(|m| m.last_end_time));
        if dropped > 0 {
            warn!(dropped, "discarded history rows past the last committed checkpoint");
        }
        debug!(
            trades = ledger.trades.len(),
            snapshots = ledger.portfolio.len(),
            "recorder history loaded"
        );

        Ok(StoreRecorder {
            store,
            strategy_id: strategy_id.to_string(),
            ledger,
            staged_meta: None,
            summary: None,
            closed: false,
        })
    }

    /// Also derive a performance summary into `port` on every flush.
    pub fn with_summary(mut self, port: Rc<dyn SummaryPort>, risk_free_rate: f64) -> Self {
        self.summary = Some(SummarySink {
            port,
            risk_free_rate,
        });
        self
    }

    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }

    fn publish_summary(&self, sink: &SummarySink) -> Result<(), IncrementalError> {
        let summary = PerformanceSummary::compute(&self.strategy_id, &self.ledger, sink.risk_free_rate)?;
        sink.port.upsert_summary(&summary)
    }
}

fn read_meta(store: &dyn PersistStore) -> Result<Option<CheckpointMeta>, IncrementalError> {
    store
        .load(META_KEY)?
        .map(|bytes| CheckpointMeta::from_bytes(&bytes))
        .transpose()
}

impl Recorder for StoreRecorder {
    fn append_trade(&mut self, trade: TradeRecord) {
        self.ledger.append_trade(trade);
    }

    fn append_portfolio(
        &mut self,
        date: NaiveDate,
        portfolio: PortfolioSnapshot,
        benchmark: Option<PortfolioSnapshot>,
    ) {
        if !self.ledger.append_portfolio(date, portfolio, benchmark) {
            warn!(%date, last = ?self.ledger.last_snapshot_date(), "duplicate portfolio snapshot rejected");
        }
    }

    fn store_meta(&mut self, meta: CheckpointMeta) {
        self.staged_meta = Some(meta);
    }

    fn load_meta(&self) -> Result<Option<CheckpointMeta>, IncrementalError> {
        read_meta(self.store.as_ref())
    }

    /// History first, meta last: a crash in between leaves the previous
    /// checkpoint authoritative.
    fn flush(&mut self) -> Result<(), IncrementalError> {
        self.store.store(TRADES_KEY, &self.ledger.encode_trades()?)?;
        self.store.store(
            PORTFOLIO_KEY,
            &RunLedger::encode_snapshots(PORTFOLIO_KEY, &self.ledger.portfolio)?,
        )?;
        self.store.store(
            BENCHMARK_KEY,
            &RunLedger::encode_snapshots(BENCHMARK_KEY, &self.ledger.benchmark)?,
        )?;

        let Some(meta) = &self.staged_meta else {
            debug!("no checkpoint staged; flushed history only");
            return Ok(());
        };
        self.store.store(META_KEY, &meta.to_bytes()?)?;
        info!(
            strategy_id = %meta.strategy_id,
            last_end_time = %meta.last_end_time,
            trades = self.ledger.trades.len(),
            snapshots = self.ledger.portfolio.len(),
            "checkpoint flushed"
        );

        if let Some(sink) = &self.summary
            && let Err(e) = self.publish_summary(sink)
        {
            warn!(error = %e, "performance summary not updated");
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), IncrementalError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.store.close()
    }
}
