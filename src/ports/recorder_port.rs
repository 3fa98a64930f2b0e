//! Recorder port: run state accumulation and checkpoint persistence.

use crate::domain::checkpoint::CheckpointMeta;
use crate::domain::error::IncrementalError;
use crate::domain::ledger::{PortfolioSnapshot, TradeRecord};
use chrono::NaiveDate;

pub trait Recorder {
    fn append_trade(&mut self, trade: TradeRecord);

    fn append_portfolio(
        &mut self,
        date: NaiveDate,
        portfolio: PortfolioSnapshot,
        benchmark: Option<PortfolioSnapshot>,
    );

    /// Stage the checkpoint record; it is written by the next `flush`.
    fn store_meta(&mut self, meta: CheckpointMeta);

    fn load_meta(&self) -> Result<Option<CheckpointMeta>, IncrementalError>;

    fn flush(&mut self) -> Result<(), IncrementalError>;

    fn close(&mut self) -> Result<(), IncrementalError>;
}
