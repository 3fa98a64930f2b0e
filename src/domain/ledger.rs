//! Recorder state: the trade log and per-date portfolio snapshots.
//!
//! A ledger holds the whole history of a multi-run sequence. Rows past the
//! last committed checkpoint belong to a window that never finished and are
//! dropped when the ledger is reopened.

use crate::domain::error::IncrementalError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trading_date: NaiveDate,
    pub datetime: NaiveDateTime,
    pub code: String,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    pub commission: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub cash: f64,
    pub market_value: f64,
}

impl PortfolioSnapshot {
    pub fn total_value(&self) -> f64 {
        self.cash + self.market_value
    }
}

/// CSV row layout for a dated snapshot.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRow {
    date: NaiveDate,
    cash: f64,
    market_value: f64,
    total_value: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunLedger {
    pub trades: Vec<TradeRecord>,
    pub portfolio: Vec<(NaiveDate, PortfolioSnapshot)>,
    pub benchmark: Vec<(NaiveDate, PortfolioSnapshot)>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_trade(&mut self, trade: TradeRecord) {
        self.trades.push(trade);
    }

    /// Record the snapshot for `date`. Returns `false`, leaving the ledger
    /// untouched, when `date` is not after the latest recorded snapshot.
    pub fn append_portfolio(
        &mut self,
        date: NaiveDate,
        portfolio: PortfolioSnapshot,
        benchmark: Option<PortfolioSnapshot>,
    ) -> bool {
        if self.last_snapshot_date().is_some_and(|last| date <= last) {
            return false;
        }
        self.portfolio.push((date, portfolio));
        if let Some(b) = benchmark {
            self.benchmark.push((date, b));
        }
        true
    }

    pub fn last_snapshot_date(&self) -> Option<NaiveDate> {
        self.portfolio.last().map(|(d, _)| *d)
    }

    /// Drop everything recorded after `date`, or everything when `None`.
    pub fn truncate_after(&mut self, date: Option<NaiveDate>) -> usize {
        let before = self.trades.len() + self.portfolio.len() + self.benchmark.len();
        match date {
            Some(cutoff) => {
                self.trades.retain(|t| t.trading_date <= cutoff);
                self.portfolio.retain(|(d, _)| *d <= cutoff);
                self.benchmark.retain(|(d, _)| *d <= cutoff);
            }
            None => {
                self.trades.clear();
                self.portfolio.clear();
                self.benchmark.clear();
            }
        }
        before - (self.trades.len() + self.portfolio.len() + self.benchmark.len())
    }

    /// Simple returns between consecutive portfolio snapshots.
    pub fn daily_returns(&self) -> Vec<f64> {
        returns(&self.portfolio)
    }

    pub fn encode_trades(&self) -> Result<Vec<u8>, IncrementalError> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        for trade in &self.trades {
            wtr.serialize(trade).map_err(|e| csv_error("trades", e))?;
        }
        wtr.into_inner().map_err(|e| IncrementalError::Serialization {
            key: "trades".into(),
            reason: e.to_string(),
        })
    }

    pub fn decode_trades(bytes: &[u8]) -> Result<Vec<TradeRecord>, IncrementalError> {
        let mut rdr = csv::Reader::from_reader(bytes);
        rdr.deserialize()
            .map(|row| row.map_err(|e| csv_error("trades", e)))
            .collect()
    }

    pub fn encode_snapshots(
        key: &str,
        snapshots: &[(NaiveDate, PortfolioSnapshot)],
    ) -> Result<Vec<u8>, IncrementalError> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        for (date, s) in snapshots {
            wtr.serialize(SnapshotRow {
                date: *date,
                cash: s.cash,
                market_value: s.market_value,
                total_value: s.total_value(),
            })
            .map_err(|e| csv_error(key, e))?;
        }
        wtr.into_inner().map_err(|e| IncrementalError::Serialization {
            key: key.into(),
            reason: e.to_string(),
        })
    }

    pub fn decode_snapshots(
        key: &str,
        bytes: &[u8],
    ) -> Result<Vec<(NaiveDate, PortfolioSnapshot)>, IncrementalError> {
        let mut rdr = csv::Reader::from_reader(bytes);
        rdr.deserialize::<SnapshotRow>()
            .map(|row| {
                row.map(|r| {
                    (
                        r.date,
                        PortfolioSnapshot {
                            cash: r.cash,
                            market_value: r.market_value,
                        },
                    )
                })
                .map_err(|e| csv_error(key, e))
            })
            .collect()
    }
}

fn returns(series: &[(NaiveDate, PortfolioSnapshot)]) -> Vec<f64> {
    series
        .windows(2)
        .map(|w| {
            let prev = w[0].1.total_value();
            let curr = w[1].1.total_value();
            if prev > 0.0 { (curr - prev) / prev } else { 0.0 }
        })
        .collect()
}

fn csv_error(key: &str, e: csv::Error) -> IncrementalError {
    IncrementalError::Serialization {
        key: key.into(),
        reason: e.to_string(),
    }
}
