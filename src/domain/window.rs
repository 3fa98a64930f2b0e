//! Event window resolution.
//!
//! The window a run produces events for starts at the resume point and ends at
//! the configured end date, clamped to the latest date that has market data.
//! Data bounds may only be known once the host has finished its own startup,
//! so resolution happens on first use and is memoized for the run.

use crate::domain::error::IncrementalError;
use crate::domain::event::Frequency;
use crate::ports::data_port::DataAvailabilityPort;
use chrono::NaiveDate;
use std::cell::OnceCell;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl EventWindow {
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

#[derive(Debug)]
pub struct WindowResolver {
    event_start: NaiveDate,
    configured_end: NaiveDate,
    frequency: Frequency,
    resolved: OnceCell<EventWindow>,
}

impl WindowResolver {
    pub fn new(event_start: NaiveDate, configured_end: NaiveDate, frequency: Frequency) -> Self {
        WindowResolver {
            event_start,
            configured_end,
            frequency,
            resolved: OnceCell::new(),
        }
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    /// Window if it has already been resolved.
    pub fn resolved(&self) -> Option<EventWindow> {
        self.resolved.get().copied()
    }

    pub fn resolve(&self, data: &dyn DataAvailabilityPort) -> Result<EventWindow, IncrementalError> {
        if let Some(window) = self.resolved.get() {
            return Ok(*window);
        }

        let end = match data.latest_available(self.frequency)? {
            Some(latest) if latest < self.configured_end => {
                info!(
                    configured_end = %self.configured_end,
                    %latest,
                    "clamping event window to available data"
                );
                latest
            }
            Some(_) => self.configured_end,
            None => {
                warn!(frequency = %self.frequency, "no market data available; event window is empty");
                self.event_start.pred_opt().unwrap_or(NaiveDate::MIN)
            }
        };

        let window = EventWindow {
            start: self.event_start,
            end,
        };
        debug!(start = %window.start, end = %window.end, empty = window.is_empty(), "event window resolved");
        Ok(*self.resolved.get_or_init(|| window))
    }
}
