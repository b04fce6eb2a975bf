//! Test fixtures for dispatch-planner.
//!
//! Provides:
//! - Small synthetic scenarios on the equator (0.001 deg of longitude ~ 111 m)
//! - An in-memory scenario runner sharing a manual clock with the simulator

pub mod scenarios;
pub mod simulated_runner;

#[allow(unused_imports)]
pub use scenarios::*;
#[allow(unused_imports)]
pub use simulated_runner::*;
