//! Concrete adapter implementations for ports.

pub mod backend;
pub mod csv_adapter;
pub mod disk_store;
pub mod file_config_adapter;
#[cfg(feature = "postgres")]
pub mod postgres_store;
pub mod replay_host;
#[cfg(feature = "sqlite")]
pub mod sqlite_store;
pub mod store_recorder;
pub mod weekday_calendar;
