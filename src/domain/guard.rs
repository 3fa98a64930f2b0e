//! Duplicate-settlement guard.
//!
//! On resume the host rewinds its clock to line calendars up with the first
//! unresolved date, which can re-trigger settlement for the last date the
//! previous run already settled. The guard holds that boundary date and vetoes
//! any settlement on or before it, and allows each later date exactly once.

use crate::domain::clock::SimClock;
use crate::domain::error::IncrementalError;
use crate::domain::event::Signal;
use crate::domain::event_bus::{EventListener, Propagation};
use crate::ports::calendar_port::CalendarPort;
use chrono::NaiveDate;
use std::rc::Rc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementDecision {
    Execute,
    Suppress,
}

pub struct SettlementGuard {
    calendar: Rc<dyn CalendarPort>,
    last_processed: Option<NaiveDate>,
    last_settled: Option<NaiveDate>,
    suppressed: usize,
}

impl SettlementGuard {
    pub fn new(calendar: Rc<dyn CalendarPort>, last_processed: Option<NaiveDate>) -> Self {
        SettlementGuard {
            calendar,
            last_processed,
            last_settled: None,
            suppressed: 0,
        }
    }

    pub fn last_processed(&self) -> Option<NaiveDate> {
        self.last_processed
    }

    /// Latest date settled during this run.
    pub fn last_settled(&self) -> Option<NaiveDate> {
        self.last_settled
    }

    pub fn suppressed(&self) -> usize {
        self.suppressed
    }

    /// Decide for a settlement attempt on `trading_date` and record the
    /// outcome; a second attempt for the same date is suppressed.
    pub fn check(&mut self, trading_date: NaiveDate) -> SettlementDecision {
        let boundary = self.last_processed.max(self.last_settled);
        if boundary.is_some_and(|b| trading_date <= b) {
            self.suppressed += 1;
            debug!(%trading_date, ?boundary, "suppressing duplicate settlement");
            return SettlementDecision::Suppress;
        }
        self.last_settled = Some(trading_date);
        SettlementDecision::Execute
    }

    /// Force the clock to the end of the boundary date's session so boundary
    /// computations downstream line up with the previous run.
    pub fn on_state_restored(&self, clock: &mut SimClock) {
        if let Some(date) = self.last_processed {
            let close = self.calendar.session_close(date);
            info!(%close, "restored state; clock moved to end of last processed session");
            clock.set(close);
        }
    }
}

impl EventListener for SettlementGuard {
    fn on_signal(
        &mut self,
        signal: &Signal,
        clock: &mut SimClock,
    ) -> Result<Propagation, IncrementalError> {
        Ok(match signal {
            Signal::StateRestored => {
                self.on_state_restored(clock);
                Propagation::Continue
            }
            Signal::PreSettlement { trading_date } => match self.check(*trading_date) {
                SettlementDecision::Execute => Propagation::Continue,
                SettlementDecision::Suppress => Propagation::Stop,
            },
            _ => Propagation::Continue,
        })
    }
}
