//! Seams to the external collaborators of the planner.
//!
//! The scenario runner, the MILP engine and the routing engine are black
//! boxes reached only through these interfaces. Concrete adapters live in
//! `client`, `lp` and `routing`; tests provide in-memory implementations.

use std::time::Duration;

use crate::client::RunnerError;
use crate::lp::{LinearModel, MilpError, MilpOutcome};
use crate::routing::PickupDeliveryModel;
use crate::scenario::{CreatedScenario, Dispatch, ScenarioSnapshot, VehicleStatus, VehicleUpdate};

/// Provides a distance/time matrix for a set of locations.
///
/// The matrix is indexed by the provided location order.
pub trait DistanceMatrixProvider {
    fn matrix_for(&self, locations: &[(f64, f64)]) -> Vec<Vec<i32>>;
}

/// The live scenario service: the single source of truth for where vehicles
/// are and how long they still travel.
pub trait ScenarioRunner {
    /// Create a new scenario, optionally sized.
    fn create_scenario(
        &self,
        vehicle_count: Option<usize>,
        customer_count: Option<usize>,
    ) -> Result<CreatedScenario, RunnerError>;

    /// Load a created scenario into the runner and return its contents.
    fn initialize_scenario(&self, scenario: &CreatedScenario) -> Result<ScenarioSnapshot, RunnerError>;

    /// Start the scenario clock. `speed` scales simulated seconds.
    fn launch_scenario(&self, scenario_id: &str, speed: Option<f64>) -> Result<(), RunnerError>;

    /// Send vehicles to customers; one entry per accepted dispatch.
    fn update_scenario(
        &self,
        scenario_id: &str,
        dispatches: &[Dispatch],
    ) -> Result<Vec<VehicleUpdate>, RunnerError>;

    /// Current remaining travel time of every vehicle.
    fn get_scenario(&self, scenario_id: &str) -> Result<Vec<VehicleStatus>, RunnerError>;
}

/// A mixed-integer linear programming engine.
pub trait MilpSolver {
    fn solve(&self, model: &LinearModel) -> Result<MilpOutcome, MilpError>;
}

/// A pickup-and-delivery routing engine.
pub trait RoutingSolver {
    /// Per-vehicle ordered node sequences (start and end nodes excluded), or
    /// an empty vector when no solution exists.
    fn solve(&self, model: &PickupDeliveryModel) -> Vec<Vec<usize>>;
}

/// Blocking pause between simulation ticks.
pub trait Clock {
    fn sleep(&mut self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &mut C {
    fn sleep(&mut self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Wall-clock implementation backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
