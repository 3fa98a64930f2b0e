//! Trading calendar port.

use chrono::{NaiveDate, NaiveDateTime};

pub trait CalendarPort {
    fn is_trading_date(&self, date: NaiveDate) -> bool;

    fn session_open(&self, date: NaiveDate) -> NaiveDateTime;

    fn session_close(&self, date: NaiveDate) -> NaiveDateTime;
}
