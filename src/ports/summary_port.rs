//! Sink for derived per-strategy performance summaries.

use crate::domain::error::IncrementalError;
use crate::domain::metrics::PerformanceSummary;

pub trait SummaryPort {
    /// Insert or replace the summary document for `summary.strategy_id`.
    fn upsert_summary(&self, summary: &PerformanceSummary) -> Result<(), IncrementalError>;
}
