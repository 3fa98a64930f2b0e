//! Core domain types and logic.

pub mod checkpoint;
pub mod clock;
pub mod context;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod event_source;
pub mod guard;
pub mod ledger;
pub mod metrics;
pub mod orchestrator;
pub mod settings;
pub mod window;
