//! dispatch-planner
//!
//! Assigns vehicles to waiting customers, sequences chained pickups to
//! minimise weighted waiting time, and executes the plan against a live
//! scenario runner.

pub mod error;
pub mod traits;
pub mod scenario;
pub mod haversine;
pub mod cost;
pub mod distance_index;
pub mod lp;
pub mod model;
pub mod plan;
pub mod solver;
pub mod client;
pub mod dispatch;
pub mod routing;
pub mod policy;
pub mod pipeline;
