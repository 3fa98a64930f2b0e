//! Explicit run context: the collaborators a run is wired against.

use crate::domain::clock::SimClock;
use crate::domain::error::IncrementalError;
use crate::domain::event::Signal;
use crate::domain::event_bus::{EventBus, Propagation};
use crate::ports::calendar_port::CalendarPort;
use crate::ports::data_port::DataAvailabilityPort;
use chrono::NaiveDate;
use std::rc::Rc;

pub struct RunContext {
    pub calendar: Rc<dyn CalendarPort>,
    pub data: Rc<dyn DataAvailabilityPort>,
    pub bus: EventBus,
    pub clock: SimClock,
}

impl RunContext {
    /// Context with an empty bus and the clock at the opening of `start`.
    pub fn new(
        calendar: Rc<dyn CalendarPort>,
        data: Rc<dyn DataAvailabilityPort>,
        start: NaiveDate,
    ) -> Self {
        let clock = SimClock::new(calendar.session_open(start));
        RunContext {
            calendar,
            data,
            bus: EventBus::new(),
            clock,
        }
    }

    pub fn publish(&mut self, signal: &Signal) -> Result<Propagation, IncrementalError> {
        self.bus.publish(signal, &mut self.clock)
    }
}
