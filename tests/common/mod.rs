#![allow(dead_code)]

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use incremental::domain::error::IncrementalError;
use incremental::domain::event::Frequency;
use incremental::domain::metrics::PerformanceSummary;
use incremental::ports::data_port::{BarPort, DataAvailabilityPort};
use incremental::ports::persist_port::PersistStore;
use incremental::ports::summary_port::SummaryPort;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

/// In-memory store that keeps every version written, newest last.
#[derive(Default)]
pub struct MemoryStore {
    pub versions: RefCell<HashMap<String, Vec<Vec<u8>>>>,
    pub closes: Cell<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self, key: &str) -> usize {
        self.versions.borrow().get(key).map_or(0, |v| v.len())
    }
}

impl PersistStore for MemoryStore {
    fn store(&self, key: &str, value: &[u8]) -> Result<(), IncrementalError> {
        self.versions
            .borrow_mut()
            .entry(key.to_string())
            .or_default()
            .push(value.to_vec());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, IncrementalError> {
        Ok(self
            .versions
            .borrow()
            .get(key)
            .and_then(|v| v.last().cloned()))
    }

    fn close(&self) -> Result<(), IncrementalError> {
        self.closes.set(self.closes.get() + 1);
        Ok(())
    }
}

/// Data availability fixed at construction, adjustable between runs.
pub struct FixedAvailability {
    pub latest: Cell<Option<NaiveDate>>,
}

impl FixedAvailability {
    pub fn new(latest: Option<NaiveDate>) -> Self {
        Self {
            latest: Cell::new(latest),
        }
    }
}

impl DataAvailabilityPort for FixedAvailability {
    fn latest_available(&self, _frequency: Frequency) -> Result<Option<NaiveDate>, IncrementalError> {
        Ok(self.latest.get())
    }
}

/// Close price rising by one per calendar day from 10.0 on the first.
pub struct LinearBars;

impl BarPort for LinearBars {
    fn close_price(&self, _code: &str, date: NaiveDate) -> Result<Option<f64>, IncrementalError> {
        Ok(Some(10.0 + date.ordinal() as f64))
    }
}

pub struct FailingSummary {
    pub attempts: Cell<usize>,
}

impl FailingSummary {
    pub fn new() -> Self {
        Self {
            attempts: Cell::new(0),
        }
    }
}

impl SummaryPort for FailingSummary {
    fn upsert_summary(&self, _summary: &PerformanceSummary) -> Result<(), IncrementalError> {
        self.attempts.set(self.attempts.get() + 1);
        Err(IncrementalError::Storage {
            reason: "summary collection unavailable".into(),
        })
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn run_time(day: u32) -> NaiveDateTime {
    date(2024, 2, day).and_hms_opt(18, 0, 0).unwrap()
}

/// Daily bars for `AAA` and `IDX` on every weekday in `[start, end]`.
pub fn bar_csv(start: NaiveDate, end: NaiveDate) -> String {
    let mut out = String::from("date,code,open,high,low,close,volume\n");
    for (i, d) in start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| d.weekday().number_from_monday() <= 5)
        .enumerate()
    {
        let aaa = 10.0 + i as f64;
        let idx = 100.0 + i as f64 * 0.5;
        out.push_str(&format!("{d},AAA,{aaa},{aaa},{aaa},{aaa},1000\n"));
        out.push_str(&format!("{d},IDX,{idx},{idx},{idx},{idx},0\n"));
    }
    out
}

/// Linear closes that fail from `from` onwards, as a broken data feed would.
pub struct FailingBars {
    pub from: NaiveDate,
}

impl BarPort for FailingBars {
    fn close_price(&self, code: &str, date: NaiveDate) -> Result<Option<f64>, IncrementalError> {
        if date >= self.from {
            return Err(IncrementalError::Storage {
                reason: format!("no bar feed for {date}"),
            });
        }
        LinearBars.close_price(code, date)
    }
}
