//! incremental: checkpoint and resume for date-driven simulations.
//!
//! A long simulation is split into runs; each run picks up the day after the
//! last committed one. Hexagonal layout as usual: checkpoint logic in
//! [`domain`], port traits in [`ports`], concrete backends in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
