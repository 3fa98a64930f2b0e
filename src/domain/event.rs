//! Simulation events and bus signals.

use crate::domain::ledger::{PortfolioSnapshot, TradeRecord};
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use std::str::FromStr;

/// Bar frequency the simulation runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    Daily,
    Minute,
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1d" | "day" | "daily" => Ok(Frequency::Daily),
            "1m" | "minute" => Ok(Frequency::Minute),
            other => Err(format!("unknown frequency '{other}' (expected 1d or 1m)")),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Daily => write!(f, "1d"),
            Frequency::Minute => write!(f, "1m"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEventKind {
    BeforeTrading,
    Bar,
    AfterTrading,
    Settlement,
}

/// One step of the simulation clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimEvent {
    pub kind: SimEventKind,
    pub calendar_dt: NaiveDateTime,
    pub trading_dt: NaiveDateTime,
}

impl SimEvent {
    pub fn trading_date(&self) -> NaiveDate {
        self.trading_dt.date()
    }
}

/// Named lifecycle signals published on the [`EventBus`](super::event_bus::EventBus).
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    SystemInitialized,
    /// Host state has been restored from a previous run.
    StateRestored,
    Trade(TradeRecord),
    PreSettlement {
        trading_date: NaiveDate,
    },
    PostSettlement {
        trading_date: NaiveDate,
        portfolio: PortfolioSnapshot,
        benchmark: Option<PortfolioSnapshot>,
    },
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Signal::SystemInitialized => "system_initialized",
            Signal::StateRestored => "state_restored",
            Signal::Trade(_) => "trade",
            Signal::PreSettlement { .. } => "pre_settlement",
            Signal::PostSettlement { .. } => "post_settlement",
        }
    }
}
