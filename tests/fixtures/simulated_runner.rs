//! Deterministic in-memory scenario runner.
//!
//! Time is a shared counter advanced by [`ManualClock`] once per sleep. A
//! dispatched vehicle reaches its customer after the customer's approach
//! time and is busy for the ride on top; the update response reports only
//! the approach, so the simulator must reconcile with `get_scenario` before
//! the vehicle is really free.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use dispatch_planner::client::RunnerError;
use dispatch_planner::haversine::travel_time_seconds;
use dispatch_planner::scenario::{
    CreatedScenario, Dispatch, ScenarioSnapshot, VehicleStatus, VehicleUpdate,
};
use dispatch_planner::traits::{Clock, ScenarioRunner};

/// Default speed for times not given explicitly, meters per second.
pub const SIMULATED_SPEED_MPS: f64 = 10.0;

pub struct ManualClock {
    now: Rc<Cell<u64>>,
    pub sleeps: Vec<Duration>,
}

impl Clock for ManualClock {
    fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
        self.now.set(self.now.get() + 1);
    }
}

#[derive(Debug, Default)]
struct RunnerState {
    position: BTreeMap<String, (f64, f64)>,
    busy_until: BTreeMap<String, u64>,
    updates: Vec<Vec<Dispatch>>,
    gets: usize,
    launched: Option<Option<f64>>,
}

pub struct SimulatedRunner {
    now: Rc<Cell<u64>>,
    snapshot: ScenarioSnapshot,
    approach: BTreeMap<String, u64>,
    ride: BTreeMap<String, u64>,
    fail_gets: bool,
    hidden: Option<String>,
    state: RefCell<RunnerState>,
}

impl SimulatedRunner {
    pub fn new(snapshot: ScenarioSnapshot) -> Self {
        let position = snapshot
            .vehicles()
            .iter()
            .map(|vehicle| (vehicle.id.clone(), vehicle.position))
            .collect();
        Self {
            now: Rc::new(Cell::new(0)),
            snapshot,
            approach: BTreeMap::new(),
            ride: BTreeMap::new(),
            fail_gets: false,
            hidden: None,
            state: RefCell::new(RunnerState {
                position,
                ..RunnerState::default()
            }),
        }
    }

    /// Fixes the approach and ride seconds of a customer regardless of
    /// geometry.
    pub fn with_times(mut self, customer: &str, approach: u64, ride: u64) -> Self {
        self.approach.insert(customer.to_string(), approach);
        self.ride.insert(customer.to_string(), ride);
        self
    }

    /// Every live query fails as if the connection dropped.
    pub fn failing_gets(mut self) -> Self {
        self.fail_gets = true;
        self
    }

    /// Live queries leave this vehicle out.
    pub fn hiding(mut self, vehicle: &str) -> Self {
        self.hidden = Some(vehicle.to_string());
        self
    }

    pub fn clock(&self) -> ManualClock {
        ManualClock {
            now: Rc::clone(&self.now),
            sleeps: Vec::new(),
        }
    }

    pub fn update_calls(&self) -> Vec<Vec<Dispatch>> {
        self.state.borrow().updates.clone()
    }

    pub fn get_calls(&self) -> usize {
        self.state.borrow().gets
    }

    pub fn launched_with(&self) -> Option<Option<f64>> {
        self.state.borrow().launched
    }
}

impl ScenarioRunner for SimulatedRunner {
    fn create_scenario(
        &self,
        _vehicle_count: Option<usize>,
        _customer_count: Option<usize>,
    ) -> Result<CreatedScenario, RunnerError> {
        Ok(CreatedScenario::new("simulated", serde_json::json!({"id": "simulated"})))
    }

    fn initialize_scenario(&self, scenario: &CreatedScenario) -> Result<ScenarioSnapshot, RunnerError> {
        if scenario.id != "simulated" || scenario.body["id"] != "simulated" {
            return Err(RunnerError::Malformed(format!("unknown scenario {}", scenario.id)));
        }
        Ok(self.snapshot.clone())
    }

    fn launch_scenario(&self, _scenario_id: &str, speed: Option<f64>) -> Result<(), RunnerError> {
        self.state.borrow_mut().launched = Some(speed);
        Ok(())
    }

    fn update_scenario(
        &self,
        _scenario_id: &str,
        dispatches: &[Dispatch],
    ) -> Result<Vec<VehicleUpdate>, RunnerError> {
        let now = self.now.get();
        let mut state = self.state.borrow_mut();
        state.updates.push(dispatches.to_vec());

        let mut updates = Vec::new();
        for dispatch in dispatches {
            let customer = self
                .snapshot
                .customers()
                .iter()
                .find(|customer| customer.id == dispatch.customer_id)
                .ok_or_else(|| RunnerError::Malformed(format!("unknown customer {}", dispatch.customer_id)))?;
            let position = *state
                .position
                .get(&dispatch.vehicle_id)
                .ok_or_else(|| RunnerError::UnknownVehicle(dispatch.vehicle_id.clone()))?;

            let approach = match self.approach.get(&customer.id) {
                Some(seconds) => *seconds,
                None => travel_time_seconds(position, customer.pickup, SIMULATED_SPEED_MPS)
                    .map_err(|err| RunnerError::Malformed(err.to_string()))?,
            };
            let ride = match self.ride.get(&customer.id) {
                Some(seconds) => *seconds,
                None => travel_time_seconds(customer.pickup, customer.destination, SIMULATED_SPEED_MPS)
                    .map_err(|err| RunnerError::Malformed(err.to_string()))?,
            };

            state.position.insert(dispatch.vehicle_id.clone(), customer.destination);
            state.busy_until.insert(dispatch.vehicle_id.clone(), now + approach + ride);
            updates.push(VehicleUpdate {
                vehicle_id: dispatch.vehicle_id.clone(),
                customer_id: dispatch.customer_id.clone(),
                remaining_travel_time: approach,
            });
        }
        Ok(updates)
    }

    fn get_scenario(&self, _scenario_id: &str) -> Result<Vec<VehicleStatus>, RunnerError> {
        if self.fail_gets {
            return Err(RunnerError::Malformed("connection closed".to_string()));
        }
        let now = self.now.get();
        let mut state = self.state.borrow_mut();
        state.gets += 1;

        Ok(state
            .position
            .keys()
            .filter(|vehicle_id| self.hidden.as_deref() != Some(vehicle_id.as_str()))
            .map(|vehicle_id| {
                let busy_until = state.busy_until.get(vehicle_id).copied().unwrap_or(0);
                VehicleStatus {
                    vehicle_id: vehicle_id.clone(),
                    remaining_travel_time: (busy_until > now).then(|| busy_until - now),
                }
            })
            .collect())
    }
}
