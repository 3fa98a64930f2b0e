//! Market data ports.

use crate::domain::error::IncrementalError;
use crate::domain::event::Frequency;
use chrono::NaiveDate;

/// Answers how far market data currently extends.
pub trait DataAvailabilityPort {
    /// Latest date that has data at `frequency`, or `None` when there is none.
    fn latest_available(&self, frequency: Frequency) -> Result<Option<NaiveDate>, IncrementalError>;
}

/// Closing prices consumed by the replay host.
pub trait BarPort {
    fn close_price(&self, code: &str, date: NaiveDate) -> Result<Option<f64>, IncrementalError>;
}
