//! Port traits the checkpoint core depends on.

pub mod calendar_port;
pub mod config_port;
pub mod data_port;
pub mod persist_port;
pub mod recorder_port;
pub mod summary_port;
