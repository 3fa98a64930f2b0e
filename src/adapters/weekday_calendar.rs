//! Monday-to-Friday calendar with optional holidays.

use crate::domain::checkpoint::DATE_FORMAT;
use crate::domain::error::IncrementalError;
use crate::domain::settings::parse_session_time;
use crate::ports::calendar_port::CalendarPort;
use crate::ports::config_port::ConfigPort;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct WeekdayCalendar {
    open: NaiveTime,
    close: NaiveTime,
    holidays: BTreeSet<NaiveDate>,
}

impl Default for WeekdayCalendar {
    fn default() -> Self {
        WeekdayCalendar {
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(15, 0, 0).unwrap_or(NaiveTime::MIN),
            holidays: BTreeSet::new(),
        }
    }
}

impl WeekdayCalendar {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Self {
        WeekdayCalendar {
            open,
            close,
            holidays: BTreeSet::new(),
        }
    }

    pub fn with_holidays(mut self, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(holidays);
        self
    }

    /// `[calendar]` section: `session_open`, `session_close` (HH:MM) and a
    /// comma-separated `holidays` list.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, IncrementalError> {
        let defaults = Self::default();
        let open = parse_session_time(config, "session_open", defaults.open)?;
        let close = parse_session_time(config, "session_close", defaults.close)?;
        if open >= close {
            return Err(IncrementalError::ConfigInvalid {
                section: "calendar".into(),
                key: "session_close".into(),
                reason: "session must close after it opens".into(),
            });
        }

        let holidays = config
            .get_string("calendar", "holidays")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| {
                    IncrementalError::ConfigInvalid {
                        section: "calendar".into(),
                        key: "holidays".into(),
                        reason: format!("invalid holiday '{s}', expected YYYY-MM-DD"),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(open, close).with_holidays(holidays))
    }
}

impl CalendarPort for WeekdayCalendar {
    fn is_trading_date(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    fn session_open(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.open)
    }

    fn session_close(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    #[test]
    fn skips_weekends_and_holidays() {
        let cal = WeekdayCalendar::default().with_holidays([date(1, 1)]);
        // Mon 1st (holiday) .. Sun 7th
        let open: Vec<_> = date(1, 1)
            .iter_days()
            .take(7)
            .filter(|d| cal.is_trading_date(*d))
            .collect();
        assert_eq!(open, vec![date(1, 2), date(1, 3), date(1, 4), date(1, 5)]);
    }

    #[test]
    fn sessions_use_configured_times() {
        let config = FileConfigAdapter::from_string(
            "[calendar]\nsession_open = 10:00\nsession_close = 16:30\nholidays = 2024-01-02, 2024-01-03\n",
        )
        .unwrap();
        let cal = WeekdayCalendar::from_config(&config).unwrap();
        assert_eq!(
            cal.session_close(date(1, 4)),
            date(1, 4).and_hms_opt(16, 30, 0).unwrap()
        );
        assert_eq!(
            cal.session_open(date(1, 4)),
            date(1, 4).and_hms_opt(10, 0, 0).unwrap()
        );
        assert!(!cal.is_trading_date(date(1, 3)));
    }

    #[test]
    fn rejects_inverted_session() {
        let config = FileConfigAdapter::from_string(
            "[calendar]\nsession_open = 16:00\nsession_close = 09:00\n",
        )
        .unwrap();
        assert!(WeekdayCalendar::from_config(&config).is_err());
    }

    #[test]
    fn rejects_bad_holiday() {
        let config =
            FileConfigAdapter::from_string("[calendar]\nholidays = 2024-13-01\n").unwrap();
        assert!(matches!(
            WeekdayCalendar::from_config(&config),
            Err(IncrementalError::ConfigInvalid { .. })
        ));
    }
}
