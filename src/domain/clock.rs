//! Simulation clock shared by the host loop and its listeners.

use crate::domain::event::SimEvent;
use chrono::{NaiveDate, NaiveDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimClock {
    pub calendar_dt: NaiveDateTime,
    pub trading_dt: NaiveDateTime,
}

impl SimClock {
    pub fn new(dt: NaiveDateTime) -> Self {
        SimClock {
            calendar_dt: dt,
            trading_dt: dt,
        }
    }

    pub fn advance(&mut self, event: &SimEvent) {
        self.calendar_dt = event.calendar_dt;
        self.trading_dt = event.trading_dt;
    }

    /// Move both clocks to `dt`, forwards or backwards.
    pub fn set(&mut self, dt: NaiveDateTime) {
        self.calendar_dt = dt;
        self.trading_dt = dt;
    }

    pub fn trading_date(&self) -> NaiveDate {
        self.trading_dt.date()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::SimEventKind;

    #[test]
    fn advance_follows_event() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut clock = SimClock::new(start);
        let at = NaiveDate::from_ymd_opt(2024, 1, 3)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap();
        clock.advance(&SimEvent {
            kind: SimEventKind::Settlement,
            calendar_dt: at,
            trading_dt: at,
        });
        assert_eq!(clock.trading_date(), NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());

        clock.set(start);
        assert_eq!(clock.calendar_dt, start);
    }
}
