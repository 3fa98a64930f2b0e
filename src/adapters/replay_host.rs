//! Reference host simulation: buy-and-hold replay of a bar file.
//!
//! The host drives the event sequence, publishes trade and settlement
//! signals and keeps its own state (cash, position, benchmark base) under
//! [`HOST_STATE_KEY`] so a resumed run continues the same portfolio.

use crate::domain::context::RunContext;
use crate::domain::error::IncrementalError;
use crate::domain::event::{SimEvent, SimEventKind, Signal};
use crate::domain::event_bus::Propagation;
use crate::domain::ledger::{PortfolioSnapshot, Side, TradeRecord};
use crate::ports::data_port::BarPort;
use crate::ports::persist_port::PersistStore;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use tracing::{debug, info, warn};

pub const HOST_STATE_KEY: &str = "host_state.json";

#[derive(Debug, Clone, PartialEq)]
pub struct HostSettings {
    pub code: String,
    pub benchmark: Option<String>,
    pub initial_capital: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct HostState {
    as_of: Option<NaiveDate>,
    cash: f64,
    quantity: f64,
    last_close: Option<f64>,
    benchmark_base: Option<f64>,
}

/// The newest state plus the one the run started from, so a run that fails
/// after saving leaves the committed state recoverable.
#[derive(Debug, Serialize, Deserialize)]
struct HostStateFile {
    current: HostState,
    previous: Option<HostState>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub events: usize,
    pub trades: usize,
    pub settled: Vec<NaiveDate>,
    pub suppressed: usize,
}

pub struct ReplayHost {
    settings: HostSettings,
    bars: Rc<dyn BarPort>,
    store: Option<Rc<dyn PersistStore>>,
    state: HostState,
    committed: Option<HostState>,
}

impl ReplayHost {
    pub fn new(settings: HostSettings, bars: Rc<dyn BarPort>) -> Self {
        let state = HostState {
            as_of: None,
            cash: settings.initial_capital,
            quantity: 0.0,
            last_close: None,
            benchmark_base: None,
        };
        ReplayHost {
            settings,
            bars,
            store: None,
            state,
            committed: None,
        }
    }

    /// Persist host state through `store` at the end of each run.
    pub fn with_store(mut self, store: Rc<dyn PersistStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cash(&self) -> f64 {
        self.state.cash
    }

    pub fn quantity(&self) -> f64 {
        self.state.quantity
    }

    pub fn initialize(&mut self, ctx: &mut RunContext) -> Result<(), IncrementalError> {
        ctx.publish(&Signal::SystemInitialized)?;
        Ok(())
    }

    /// Reload the newest state saved on or before `last_processed` and
    /// announce it.
    pub fn restore(
        &mut self,
        ctx: &mut RunContext,
        last_processed: NaiveDate,
    ) -> Result<(), IncrementalError> {
        let store = self.store.as_ref().ok_or_else(|| IncrementalError::Lifecycle {
            reason: "restore requires a persist store".into(),
        })?;
        let bytes = store
            .load(HOST_STATE_KEY)?
            .ok_or_else(|| IncrementalError::storage("no host state saved for the checkpoint"))?;
        let file: HostStateFile =
            serde_json::from_slice(&bytes).map_err(|e| IncrementalError::Serialization {
                key: HOST_STATE_KEY.into(),
                reason: e.to_string(),
            })?;

        // The checkpoint may end on a non-trading day, after the last date the
        // host settled. Anything settled past it belongs to an uncommitted run.
        let as_of = file.current.as_of;
        let state = std::iter::once(file.current)
            .chain(file.previous)
            .find(|s| s.as_of.is_none_or(|d| d <= last_processed))
            .ok_or_else(|| {
                IncrementalError::storage(format!(
                    "host state is as of {as_of:?}, past the checkpoint end {last_processed}"
                ))
            })?;

        info!(
            checkpoint = %last_processed,
            as_of = ?state.as_of,
            cash = state.cash,
            quantity = state.quantity,
            "host state restored"
        );
        self.state = state.clone();
        self.committed = Some(state);
        ctx.publish(&Signal::StateRestored)?;
        Ok(())
    }

    /// Consume `events`, publishing trades and settlements on the bus.
    pub fn run(
        &mut self,
        ctx: &mut RunContext,
        events: impl Iterator<Item = SimEvent>,
    ) -> Result<RunReport, IncrementalError> {
        let mut report = RunReport::default();

        // A clock restored to a session close re-fires that session's
        // settlement before the first new event.
        if self.committed.is_some() {
            let date = ctx.clock.trading_date();
            self.settle(ctx, date, &mut report)?;
        }

        for event in events {
            ctx.clock.advance(&event);
            report.events += 1;
            match event.kind {
                SimEventKind::Bar => self.on_bar(ctx, &event, &mut report)?,
                SimEventKind::Settlement => {
                    self.settle(ctx, event.trading_date(), &mut report)?
                }
                SimEventKind::BeforeTrading | SimEventKind::AfterTrading => {}
            }
        }

        self.save()?;
        info!(
            events = report.events,
            settled = report.settled.len(),
            suppressed = report.suppressed,
            trades = report.trades,
            "replay finished"
        );
        Ok(report)
    }

    fn on_bar(
        &mut self,
        ctx: &mut RunContext,
        event: &SimEvent,
        report: &mut RunReport,
    ) -> Result<(), IncrementalError> {
        if self.state.quantity > 0.0 {
            return Ok(());
        }
        let date = event.trading_date();
        let Some(price) = self.bars.close_price(&self.settings.code, date)? else {
            return Ok(());
        };
        if price <= 0.0 {
            warn!(code = %self.settings.code, %date, price, "non-positive close; bar skipped");
            return Ok(());
        }
        let quantity = (self.state.cash / price).floor();
        if quantity < 1.0 {
            return Ok(());
        }

        self.state.cash -= quantity * price;
        self.state.quantity = quantity;
        let trade = TradeRecord {
            trading_date: date,
            datetime: event.trading_dt,
            code: self.settings.code.clone(),
            side: Side::Buy,
            quantity,
            price,
            commission: 0.0,
        };
        debug!(code = %trade.code, quantity, price, "buy");
        ctx.publish(&Signal::Trade(trade))?;
        report.trades += 1;
        Ok(())
    }

    fn settle(
        &mut self,
        ctx: &mut RunContext,
        date: NaiveDate,
        report: &mut RunReport,
    ) -> Result<(), IncrementalError> {
        if ctx.publish(&Signal::PreSettlement { trading_date: date })? == Propagation::Stop {
            report.suppressed += 1;
            return Ok(());
        }

        if let Some(close) = self.bars.close_price(&self.settings.code, date)? {
            self.state.last_close = Some(close);
        }
        let portfolio = PortfolioSnapshot {
            cash: self.state.cash,
            market_value: self.state.quantity * self.state.last_close.unwrap_or(0.0),
        };
        let benchmark = self.benchmark_snapshot(date)?;

        ctx.publish(&Signal::PostSettlement {
            trading_date: date,
            portfolio,
            benchmark,
        })?;
        self.state.as_of = Some(date);
        report.settled.push(date);
        Ok(())
    }

    /// Benchmark valued as the initial capital fully invested in the
    /// benchmark code at its first observed close.
    fn benchmark_snapshot(
        &mut self,
        date: NaiveDate,
    ) -> Result<Option<PortfolioSnapshot>, IncrementalError> {
        let Some(code) = &self.settings.benchmark else {
            return Ok(None);
        };
        let Some(close) = self.bars.close_price(code, date)? else {
            return Ok(None);
        };
        let base = *self.state.benchmark_base.get_or_insert(close);
        Ok(Some(PortfolioSnapshot {
            cash: 0.0,
            market_value: self.settings.initial_capital * close / base,
        }))
    }

    fn save(&self) -> Result<(), IncrementalError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let file = HostStateFile {
            current: self.state.clone(),
            previous: self.committed.clone(),
        };
        let bytes =
            serde_json::to_vec(&file).map_err(|e| IncrementalError::Serialization {
                key: HOST_STATE_KEY.into(),
                reason: e.to_string(),
            })?;
        store.store(HOST_STATE_KEY, &bytes)
    }
}
