//! Run settings read and validated from configuration.
//!
//! Everything is validated up front so a bad configuration aborts before any
//! persisted state is touched.

use crate::domain::checkpoint::DATE_FORMAT;
use crate::domain::error::IncrementalError;
use crate::domain::event::Frequency;
use crate::ports::config_port::ConfigPort;
use chrono::{NaiveDate, NaiveTime};
use std::path::PathBuf;

/// Which persistence backend the recorder writes through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSettings {
    Disk {
        persist_folder: PathBuf,
        strategy_id: String,
    },
    Sqlite {
        path: String,
        pool_size: u32,
        strategy_id: String,
    },
    Postgres {
        connection_string: String,
        strategy_id: String,
    },
}

impl BackendSettings {
    pub fn strategy_id(&self) -> &str {
        match self {
            BackendSettings::Disk { strategy_id, .. }
            | BackendSettings::Sqlite { strategy_id, .. }
            | BackendSettings::Postgres { strategy_id, .. } => strategy_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BackendSettings::Disk { .. } => "disk",
            BackendSettings::Sqlite { .. } => "sqlite",
            BackendSettings::Postgres { .. } => "postgres",
        }
    }

    /// Backend section from `[incremental]`, or `None` when incremental mode
    /// is not configured at all.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Option<Self>, IncrementalError> {
        let recorder = config
            .get_string("incremental", "recorder")
            .unwrap_or_else(|| "disk".to_string());

        match recorder.trim().to_lowercase().as_str() {
            "disk" | "csv" | "csvrecorder" => {
                let Some(folder) = config
                    .get_string("incremental", "persist_folder")
                    .filter(|s| !s.trim().is_empty())
                else {
                    return Ok(None);
                };
                let strategy_id = config
                    .get_string("incremental", "strategy_id")
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "1".to_string());
                validate_strategy_id(&strategy_id)?;
                Ok(Some(BackendSettings::Disk {
                    persist_folder: PathBuf::from(folder.trim()),
                    strategy_id,
                }))
            }
            "sqlite" | "mongodbrecorder" | "document" => {
                let strategy_id = config.require_string("incremental", "strategy_id")?;
                validate_strategy_id(&strategy_id)?;
                let path = config.require_string("sqlite", "path")?;
                let pool_size = config.get_int("sqlite", "pool_size", 4);
                let pool_size = u32::try_from(pool_size)
                    .ok()
                    .filter(|n| *n >= 1)
                    .ok_or_else(|| IncrementalError::ConfigInvalid {
                        section: "sqlite".into(),
                        key: "pool_size".into(),
                        reason: format!(
                            "pool_size must be between 1 and {}, got {pool_size}",
                            u32::MAX
                        ),
                    })?;
                Ok(Some(BackendSettings::Sqlite {
                    path,
                    pool_size,
                    strategy_id,
                }))
            }
            "postgres" => {
                let strategy_id = config.require_string("incremental", "strategy_id")?;
                validate_strategy_id(&strategy_id)?;
                let connection_string = config
                    .get_string("postgres", "connection_string")
                    .filter(|s| !s.trim().is_empty())
                    .ok_or_else(|| IncrementalError::ConfigMissing {
                        section: "postgres".into(),
                        key: "connection_string".into(),
                    })?;
                Ok(Some(BackendSettings::Postgres {
                    connection_string,
                    strategy_id,
                }))
            }
            other => Err(IncrementalError::ConfigInvalid {
                section: "incremental".into(),
                key: "recorder".into(),
                reason: format!("unknown recorder '{other}' (expected disk, sqlite or postgres)"),
            }),
        }
    }
}

/// The strategy id names a directory on disk, so keep it to a safe alphabet.
fn validate_strategy_id(id: &str) -> Result<(), IncrementalError> {
    if id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && id != "."
        && id != ".."
    {
        Ok(())
    } else {
        Err(IncrementalError::ConfigInvalid {
            section: "incremental".into(),
            key: "strategy_id".into(),
            reason: format!("'{id}' may only contain letters, digits, '-', '_' and '.'"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub frequency: Frequency,
    pub initial_capital: f64,
    pub risk_free_rate: f64,
    pub backend: Option<BackendSettings>,
}

impl RunSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, IncrementalError> {
        let start_date = parse_date(config, "start_date")?;
        let end_date = parse_date(config, "end_date")?;
        if start_date > end_date {
            return Err(IncrementalError::ConfigInvalid {
                section: "backtest".into(),
                key: "start_date".into(),
                reason: "start_date must not be after end_date".into(),
            });
        }

        let frequency = config
            .get_string("backtest", "frequency")
            .unwrap_or_else(|| "1d".to_string())
            .parse::<Frequency>()
            .map_err(|reason| IncrementalError::ConfigInvalid {
                section: "backtest".into(),
                key: "frequency".into(),
                reason,
            })?;

        let initial_capital = config.get_double("backtest", "initial_capital", 100_000.0);
        if initial_capital <= 0.0 {
            return Err(IncrementalError::ConfigInvalid {
                section: "backtest".into(),
                key: "initial_capital".into(),
                reason: "initial_capital must be positive".into(),
            });
        }

        let risk_free_rate = config.get_double("backtest", "risk_free_rate", 0.0);
        if !(0.0..1.0).contains(&risk_free_rate) {
            return Err(IncrementalError::ConfigInvalid {
                section: "backtest".into(),
                key: "risk_free_rate".into(),
                reason: "risk_free_rate must be between 0 and 1".into(),
            });
        }

        Ok(RunSettings {
            start_date,
            end_date,
            frequency,
            initial_capital,
            risk_free_rate,
            backend: BackendSettings::from_config(config)?,
        })
    }
}

fn parse_date(config: &dyn ConfigPort, key: &str) -> Result<NaiveDate, IncrementalError> {
    let raw = config.require_string("backtest", key)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|_| IncrementalError::ConfigInvalid {
        section: "backtest".into(),
        key: key.into(),
        reason: format!("invalid {key} format, expected YYYY-MM-DD"),
    })
}

/// Parse an `HH:MM` session time, falling back to `default` when unset.
pub fn parse_session_time(
    config: &dyn ConfigPort,
    key: &str,
    default: NaiveTime,
) -> Result<NaiveTime, IncrementalError> {
    match config.get_string("calendar", key) {
        None => Ok(default),
        Some(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|_| {
            IncrementalError::ConfigInvalid {
                section: "calendar".into(),
                key: key.into(),
                reason: format!("invalid {key} '{raw}', expected HH:MM"),
            }
        }),
    }
}
