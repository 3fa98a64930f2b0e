//! Lazily produced, run-scoped event sequence.

use crate::domain::event::{Frequency, SimEvent, SimEventKind};
use crate::domain::window::EventWindow;
use crate::ports::calendar_port::CalendarPort;
use chrono::{Days, Duration, NaiveDate};
use std::collections::VecDeque;
use std::iter::FusedIterator;
use std::rc::Rc;

/// Events for every trading date of a window, generated one date at a time.
///
/// Per trading date the order is: before-trading at the session open, the
/// bars (one per day, or one per minute), after-trading and settlement at the
/// session close. Once exhausted it stays exhausted.
pub struct EventSource {
    calendar: Rc<dyn CalendarPort>,
    frequency: Frequency,
    cursor: Option<NaiveDate>,
    end: NaiveDate,
    pending: VecDeque<SimEvent>,
}

impl EventSource {
    pub fn new(calendar: Rc<dyn CalendarPort>, window: EventWindow, frequency: Frequency) -> Self {
        EventSource {
            calendar,
            frequency,
            cursor: (!window.is_empty()).then_some(window.start),
            end: window.end,
            pending: VecDeque::new(),
        }
    }

    fn next_trading_date(&mut self) -> Option<NaiveDate> {
        while let Some(date) = self.cursor {
            if date > self.end {
                self.cursor = None;
                break;
            }
            self.cursor = date.checked_add_days(Days::new(1));
            if self.calendar.is_trading_date(date) {
                return Some(date);
            }
        }
        None
    }

    fn fill(&mut self, date: NaiveDate) {
        let open = self.calendar.session_open(date);
        let close = self.calendar.session_close(date);
        let event = |kind, dt| SimEvent {
            kind,
            calendar_dt: dt,
            trading_dt: dt,
        };

        self.pending.push_back(event(SimEventKind::BeforeTrading, open));
        match self.frequency {
            Frequency::Daily => self.pending.push_back(event(SimEventKind::Bar, close)),
            Frequency::Minute => {
                let mut dt = open + Duration::minutes(1);
                while dt <= close {
                    self.pending.push_back(event(SimEventKind::Bar, dt));
                    dt += Duration::minutes(1);
                }
            }
        }
        self.pending.push_back(event(SimEventKind::AfterTrading, close));
        self.pending.push_back(event(SimEventKind::Settlement, close));
    }
}

impl Iterator for EventSource {
    type Item = SimEvent;

    fn next(&mut self) -> Option<SimEvent> {
        if self.pending.is_empty() {
            let date = self.next_trading_date()?;
            self.fill(date);
        }
        self.pending.pop_front()
    }
}

impl FusedIterator for EventSource {}
