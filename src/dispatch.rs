//! Executes a plan against a live scenario and measures realized waits.
//!
//! Each vehicle works through a queue of customers. The simulator keeps a
//! countdown per busy vehicle, decremented once per tick; when a countdown
//! hits zero the live scenario is asked for the authoritative remaining time,
//! and only a vehicle that is really idle gets its next customer.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::client::RunnerError;
use crate::error::InvalidArgument;
use crate::plan::Plan;
use crate::scenario::{CustomerId, Dispatch, VehicleId, VehicleUpdate};
use crate::traits::{Clock, ScenarioRunner};

/// Realized wait per customer, in seconds since the first dispatch.
pub type WaitTimes = BTreeMap<CustomerId, u64>;

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Length of one simulated second on the runner's clock.
    pub tick: Duration,
    /// Sleep is `tick * safety_factor` so the runner is never behind.
    pub safety_factor: f64,
    /// Abort after this many ticks. `None` runs until every queue drains.
    pub max_ticks: Option<u64>,
}

impl DispatchOptions {
    /// Ticks matching a scenario launched at `speed` seconds per simulated
    /// second. Negative, NaN and unrepresentable speeds are rejected.
    pub fn for_speed(speed: f64) -> Result<Self, InvalidArgument> {
        let tick = Duration::try_from_secs_f64(speed)
            .map_err(|_| InvalidArgument::new(format!("speed {} is not a tick length", speed)))?;
        Ok(Self {
            tick,
            ..Self::default()
        })
    }
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            safety_factor: 1.5,
            max_ticks: None,
        }
    }
}

#[derive(Debug)]
pub enum DispatchError {
    Runner(RunnerError),
    TickLimit { ticks: u64, active: Vec<VehicleId> },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Runner(err) => write!(f, "{}", err),
            DispatchError::TickLimit { ticks, active } => write!(
                f,
                "simulation still running after {} ticks (active: {})",
                ticks,
                active.join(", ")
            ),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Runner(err) => Some(err),
            DispatchError::TickLimit { .. } => None,
        }
    }
}

impl From<RunnerError> for DispatchError {
    fn from(err: RunnerError) -> Self {
        DispatchError::Runner(err)
    }
}

#[derive(Debug)]
struct Countdown {
    vehicle_id: VehicleId,
    remaining: u64,
}

pub struct DispatchSimulator<'a, R: ScenarioRunner, C: Clock> {
    runner: &'a R,
    clock: C,
    options: DispatchOptions,
}

impl<'a, R: ScenarioRunner, C: Clock> DispatchSimulator<'a, R, C> {
    pub fn new(runner: &'a R, clock: C, options: DispatchOptions) -> Self {
        Self {
            runner,
            clock,
            options,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Runs a solved plan: each vehicle starts at its start customer and
    /// follows the chain edges.
    pub fn run(&mut self, scenario_id: &str, plan: &Plan) -> Result<WaitTimes, DispatchError> {
        self.run_queues(scenario_id, plan.queues().into_iter().collect())
    }

    /// Runs a flat dispatch list: the first entry per vehicle goes out in the
    /// initial batch, later entries for the same vehicle queue up in order.
    pub fn run_dispatches(
        &mut self,
        scenario_id: &str,
        dispatches: &[Dispatch],
    ) -> Result<WaitTimes, DispatchError> {
        let mut queues: Vec<(VehicleId, VecDeque<CustomerId>)> = Vec::new();
        for dispatch in dispatches {
            match queues.iter_mut().find(|(vehicle, _)| *vehicle == dispatch.vehicle_id) {
                Some((_, queue)) => queue.push_back(dispatch.customer_id.clone()),
                None => queues.push((
                    dispatch.vehicle_id.clone(),
                    VecDeque::from([dispatch.customer_id.clone()]),
                )),
            }
        }
        self.run_queues(scenario_id, queues)
    }

    fn run_queues(
        &mut self,
        scenario_id: &str,
        queues: Vec<(VehicleId, VecDeque<CustomerId>)>,
    ) -> Result<WaitTimes, DispatchError> {
        let mut wait_times = WaitTimes::new();
        let mut pending: BTreeMap<VehicleId, VecDeque<CustomerId>> = BTreeMap::new();
        let mut initial = Vec::new();
        for (vehicle, mut queue) in queues {
            if let Some(first) = queue.pop_front() {
                initial.push(Dispatch::new(vehicle.clone(), first));
                pending.insert(vehicle, queue);
            }
        }
        if initial.is_empty() {
            return Ok(wait_times);
        }

        info!(scenario_id, vehicles = initial.len(), "dispatching initial batch");
        let updates = self.runner.update_scenario(scenario_id, &initial)?;
        let mut countdowns = Vec::with_capacity(initial.len());
        for dispatch in &initial {
            let update = accepted(&updates, dispatch)?;
            wait_times.insert(dispatch.customer_id.clone(), update.remaining_travel_time);
            countdowns.push(Countdown {
                vehicle_id: dispatch.vehicle_id.clone(),
                remaining: update.remaining_travel_time,
            });
        }

        let pause = self.options.tick.mul_f64(self.options.safety_factor);
        let mut elapsed: u64 = 0;
        while !countdowns.is_empty() {
            if let Some(limit) = self.options.max_ticks {
                if elapsed >= limit {
                    return Err(DispatchError::TickLimit {
                        ticks: elapsed,
                        active: countdowns.into_iter().map(|c| c.vehicle_id).collect(),
                    });
                }
            }

            for countdown in countdowns.iter_mut() {
                countdown.remaining = countdown.remaining.saturating_sub(1);
            }
            elapsed += 1;

            if let Some(pos) = countdowns.iter().position(|c| c.remaining == 0) {
                self.settle(scenario_id, &mut countdowns, pos, &mut pending, &mut wait_times, elapsed)?;
            }

            if !countdowns.is_empty() {
                self.clock.sleep(pause);
            }
        }

        info!(scenario_id, ticks = elapsed, customers = wait_times.len(), "simulation finished");
        Ok(wait_times)
    }

    /// Handles the vehicle at `pos`, whose countdown just reached zero.
    fn settle(
        &mut self,
        scenario_id: &str,
        countdowns: &mut Vec<Countdown>,
        pos: usize,
        pending: &mut BTreeMap<VehicleId, VecDeque<CustomerId>>,
        wait_times: &mut WaitTimes,
        elapsed: u64,
    ) -> Result<(), DispatchError> {
        let vehicle_id = countdowns[pos].vehicle_id.clone();

        let live = self.runner.get_scenario(scenario_id)?;
        let status = live
            .iter()
            .find(|status| status.vehicle_id == vehicle_id)
            .ok_or_else(|| RunnerError::UnknownVehicle(vehicle_id.clone()))?;
        if let Some(remaining) = status.remaining_travel_time.filter(|r| *r > 0) {
            warn!(vehicle = %vehicle_id, remaining, "countdown reconciled with live scenario");
            countdowns[pos].remaining = remaining;
            return Ok(());
        }

        let next = pending.get_mut(&vehicle_id).and_then(|queue| queue.pop_front());
        let Some(customer_id) = next else {
            debug!(vehicle = %vehicle_id, elapsed, "vehicle retired");
            countdowns.remove(pos);
            return Ok(());
        };

        let dispatch = Dispatch::new(vehicle_id.clone(), customer_id.clone());
        let updates = self
            .runner
            .update_scenario(scenario_id, std::slice::from_ref(&dispatch))?;
        let update = accepted(&updates, &dispatch)?;

        debug!(
            vehicle = %vehicle_id,
            customer = %customer_id,
            travel = update.remaining_travel_time,
            elapsed,
            "dispatched next customer"
        );
        wait_times.insert(customer_id, update.remaining_travel_time + elapsed);
        countdowns[pos].remaining = update.remaining_travel_time;
        Ok(())
    }
}

fn accepted<'u>(updates: &'u [VehicleUpdate], dispatch: &Dispatch) -> Result<&'u VehicleUpdate, RunnerError> {
    updates
        .iter()
        .find(|update| update.vehicle_id == dispatch.vehicle_id && update.customer_id == dispatch.customer_id)
        .ok_or_else(|| {
            RunnerError::Malformed(format!(
                "dispatch of {} to {} was not acknowledged",
                dispatch.vehicle_id, dispatch.customer_id
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{CreatedScenario, ScenarioSnapshot, VehicleStatus};

    /// Fails the test on any call.
    struct UnreachableRunner;

    impl ScenarioRunner for UnreachableRunner {
        fn create_scenario(&self, _: Option<usize>, _: Option<usize>) -> Result<CreatedScenario, RunnerError> {
            panic!("runner must not be called")
        }

        fn initialize_scenario(&self, _: &CreatedScenario) -> Result<ScenarioSnapshot, RunnerError> {
            panic!("runner must not be called")
        }

        fn launch_scenario(&self, _: &str, _: Option<f64>) -> Result<(), RunnerError> {
            panic!("runner must not be called")
        }

        fn update_scenario(&self, _: &str, _: &[Dispatch]) -> Result<Vec<VehicleUpdate>, RunnerError> {
            panic!("runner must not be called")
        }

        fn get_scenario(&self, _: &str) -> Result<Vec<VehicleStatus>, RunnerError> {
            panic!("runner must not be called")
        }
    }

    /// Acknowledges nothing.
    struct SilentRunner;

    impl ScenarioRunner for SilentRunner {
        fn create_scenario(&self, _: Option<usize>, _: Option<usize>) -> Result<CreatedScenario, RunnerError> {
            Ok(CreatedScenario::new("s", serde_json::json!({"id": "s"})))
        }

        fn initialize_scenario(&self, _: &CreatedScenario) -> Result<ScenarioSnapshot, RunnerError> {
            Err(RunnerError::Malformed("unused".to_string()))
        }

        fn launch_scenario(&self, _: &str, _: Option<f64>) -> Result<(), RunnerError> {
            Ok(())
        }

        fn update_scenario(&self, _: &str, _: &[Dispatch]) -> Result<Vec<VehicleUpdate>, RunnerError> {
            Ok(Vec::new())
        }

        fn get_scenario(&self, _: &str) -> Result<Vec<VehicleStatus>, RunnerError> {
            Ok(Vec::new())
        }
    }

    struct NoSleep;

    impl Clock for NoSleep {
        fn sleep(&mut self, _duration: Duration) {}
    }

    #[test]
    fn test_empty_plan_never_calls_runner() {
        let mut simulator = DispatchSimulator::new(&UnreachableRunner, NoSleep, DispatchOptions::default());
        let waits = simulator.run("s", &Plan::default()).unwrap();
        assert!(waits.is_empty());

        let waits = simulator.run_dispatches("s", &[]).unwrap();
        assert!(waits.is_empty());
    }

    #[test]
    fn test_unacknowledged_dispatch_is_fatal() {
        let mut simulator = DispatchSimulator::new(&SilentRunner, NoSleep, DispatchOptions::default());
        let result = simulator.run_dispatches("s", &[Dispatch::new("v1", "c1")]);
        assert!(matches!(result, Err(DispatchError::Runner(RunnerError::Malformed(_)))));
    }

    #[test]
    fn test_for_speed_rejects_unusable_speeds() {
        assert_eq!(DispatchOptions::for_speed(0.25).unwrap().tick, Duration::from_millis(250));
        for speed in [-1.0, f64::NAN, f64::INFINITY, 1e30] {
            assert!(DispatchOptions::for_speed(speed).is_err(), "accepted {}", speed);
        }
    }

    #[test]
    fn test_default_options() {
        let options = DispatchOptions::default();
        assert_eq!(options.tick.mul_f64(options.safety_factor), Duration::from_millis(1500));
        assert!(options.max_ticks.is_none());
    }
}
