//! Checkpoint meta record and the fresh-start vs resume decision.
//!
//! The meta record is the only thing a run needs to know about the runs
//! before it: where the sequence began, and the last date it committed.

use crate::domain::error::IncrementalError;
use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Persisted progress of a multi-run sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    #[serde(deserialize_with = "strategy_id_format::deserialize")]
    pub strategy_id: String,
    #[serde(with = "date_format")]
    pub origin_start_date: NaiveDate,
    #[serde(with = "date_format")]
    pub start_date: NaiveDate,
    #[serde(with = "date_format")]
    pub end_date: NaiveDate,
    #[serde(with = "date_format")]
    pub last_end_time: NaiveDate,
    #[serde(with = "datetime_format")]
    pub last_run_time: NaiveDateTime,
}

impl CheckpointMeta {
    /// Meta for the current run as the configuration describes it, before any
    /// prior record is merged in.
    pub fn fresh(
        strategy_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        now: NaiveDateTime,
    ) -> Self {
        CheckpointMeta {
            strategy_id: strategy_id.to_string(),
            origin_start_date: start_date,
            start_date,
            end_date,
            last_end_time: end_date,
            last_run_time: now,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, IncrementalError> {
        serde_json::to_vec_pretty(self).map_err(|e| IncrementalError::Serialization {
            key: "meta".into(),
            reason: e.to_string(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IncrementalError> {
        serde_json::from_slice(bytes).map_err(|e| IncrementalError::Serialization {
            key: "meta".into(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Fresh,
    Resume,
}

/// Outcome of merging the configured meta with the persisted one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePlan {
    /// Meta that will be written at successful teardown.
    pub meta: CheckpointMeta,
    /// First date this run produces events for.
    pub event_start: NaiveDate,
    /// Last date settled by a previous run, if any.
    pub last_processed: Option<NaiveDate>,
}

impl ResumePlan {
    pub fn mode(&self) -> RunMode {
        if self.last_processed.is_some() {
            RunMode::Resume
        } else {
            RunMode::Fresh
        }
    }
}

/// Decide how this run starts.
///
/// With no persisted meta the run starts at the configured start date. With
/// one, the first run's start dates are carried forward and this run picks up
/// the day after the persisted `last_end_time`, which the configured end date
/// must strictly exceed.
pub fn plan_run(
    fresh: CheckpointMeta,
    persisted: Option<CheckpointMeta>,
) -> Result<ResumePlan, IncrementalError> {
    let Some(previous) = persisted else {
        return Ok(ResumePlan {
            event_start: fresh.start_date,
            meta: fresh,
            last_processed: None,
        });
    };

    if fresh.end_date <= previous.last_end_time {
        return Err(IncrementalError::NoProgress {
            end_date: fresh.end_date,
            last_end_time: previous.last_end_time,
        });
    }

    let event_start = previous
        .last_end_time
        .checked_add_days(Days::new(1))
        .ok_or_else(|| IncrementalError::ConfigInvalid {
            section: "backtest".into(),
            key: "end_date".into(),
            reason: format!("cannot resume after {}", previous.last_end_time),
        })?;

    let meta = CheckpointMeta {
        origin_start_date: previous.origin_start_date,
        start_date: previous.start_date,
        ..fresh
    };

    Ok(ResumePlan {
        meta,
        event_start,
        last_processed: Some(previous.last_end_time),
    })
}

pub(crate) mod date_format {
    use super::DATE_FORMAT;
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&date.format(DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(serde::de::Error::custom)
    }
}

mod datetime_format {
    use super::DATETIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.format(DATETIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Older records stored the strategy id as a bare integer.
mod strategy_id_format {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Raw::deserialize(d)? {
            Raw::Text(s) => s,
            Raw::Number(n) => n.to_string(),
        })
    }
}
