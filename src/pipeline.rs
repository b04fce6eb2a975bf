//! One full round against a live scenario: plan, execute, score.

use std::fmt;

use tracing::info;

use crate::client::RunnerError;
use crate::cost::score;
use crate::dispatch::{DispatchError, DispatchOptions, DispatchSimulator, WaitTimes};
use crate::distance_index::RelaxedSet;
use crate::error::InvalidArgument;
use crate::plan::Plan;
use crate::scenario::{destination_distances, Dispatch, ScenarioId, ScenarioSnapshot};
use crate::solver::{ModelSolver, SolveError};
use crate::traits::{Clock, MilpSolver, ScenarioRunner};

#[derive(Debug)]
pub enum PipelineError {
    Runner(RunnerError),
    Solve(SolveError),
    Dispatch(DispatchError),
    /// Bad speed or cost input.
    Invalid(InvalidArgument),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Runner(err) => write!(f, "{}", err),
            PipelineError::Solve(err) => write!(f, "{}", err),
            PipelineError::Dispatch(err) => write!(f, "{}", err),
            PipelineError::Invalid(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<RunnerError> for PipelineError {
    fn from(err: RunnerError) -> Self {
        PipelineError::Runner(err)
    }
}

impl From<SolveError> for PipelineError {
    fn from(err: SolveError) -> Self {
        PipelineError::Solve(err)
    }
}

impl From<DispatchError> for PipelineError {
    fn from(err: DispatchError) -> Self {
        PipelineError::Dispatch(err)
    }
}

impl From<InvalidArgument> for PipelineError {
    fn from(err: InvalidArgument) -> Self {
        PipelineError::Invalid(err)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Seconds per simulated second passed to the launch call. Also sets
    /// the tick length when present.
    pub speed: Option<f64>,
    pub dispatch: DispatchOptions,
}

#[derive(Debug, Clone)]
pub struct RoundReport {
    pub scenario_id: ScenarioId,
    /// Present when the round was planned by the assignment solver.
    pub plan: Option<Plan>,
    pub wait_times: WaitTimes,
    pub score: f64,
}

pub struct Pipeline<'a, R: ScenarioRunner, S: MilpSolver, C: Clock> {
    runner: &'a R,
    solver: ModelSolver<S>,
    clock: C,
    options: PipelineOptions,
}

impl<'a, R: ScenarioRunner, S: MilpSolver, C: Clock> Pipeline<'a, R, S, C> {
    pub fn new(runner: &'a R, solver: ModelSolver<S>, clock: C, options: PipelineOptions) -> Self {
        Self {
            runner,
            solver,
            clock,
            options,
        }
    }

    fn dispatch_options(&self) -> Result<DispatchOptions, InvalidArgument> {
        Ok(match self.options.speed {
            Some(speed) => DispatchOptions {
                tick: DispatchOptions::for_speed(speed)?.tick,
                ..self.options.dispatch.clone()
            },
            None => self.options.dispatch.clone(),
        })
    }

    /// Creates and initializes a fresh scenario.
    pub fn prepare(
        &self,
        vehicle_count: Option<usize>,
        customer_count: Option<usize>,
    ) -> Result<(ScenarioId, ScenarioSnapshot), PipelineError> {
        let scenario = self.runner.create_scenario(vehicle_count, customer_count)?;
        let snapshot = self.runner.initialize_scenario(&scenario)?;
        info!(
            scenario_id = %scenario.id,
            customers = snapshot.customers().len(),
            vehicles = snapshot.vehicles().len(),
            "scenario ready"
        );
        Ok((scenario.id, snapshot))
    }

    /// Solves the assignment model for a prepared scenario, then launches
    /// and executes it.
    pub fn run_optimised(
        &mut self,
        scenario_id: &str,
        snapshot: &ScenarioSnapshot,
    ) -> Result<RoundReport, PipelineError> {
        let plan = self.solver.solve(snapshot, RelaxedSet::new())?;
        info!(
            starts = plan.starts.len(),
            chains = plan.chains.len(),
            relaxed = plan.relaxed.len(),
            rounds = plan.rounds,
            "plan ready"
        );

        let options = self.dispatch_options()?;
        self.runner.launch_scenario(scenario_id, self.options.speed)?;
        let wait_times = DispatchSimulator::new(self.runner, &mut self.clock, options).run(scenario_id, &plan)?;
        let score = score(
            &wait_times,
            &destination_distances(snapshot),
            self.solver.options().cost_shape,
        )?;

        Ok(RoundReport {
            scenario_id: scenario_id.to_string(),
            plan: Some(plan),
            wait_times,
            score,
        })
    }

    /// Launches a prepared scenario and executes a flat dispatch list, e.g.
    /// from the routing formulation or the random baseline.
    pub fn run_dispatches(
        &mut self,
        scenario_id: &str,
        snapshot: &ScenarioSnapshot,
        dispatches: &[Dispatch],
    ) -> Result<RoundReport, PipelineError> {
        let options = self.dispatch_options()?;
        self.runner.launch_scenario(scenario_id, self.options.speed)?;
        let wait_times =
            DispatchSimulator::new(self.runner, &mut self.clock, options).run_dispatches(scenario_id, dispatches)?;
        let score = score(
            &wait_times,
            &destination_distances(snapshot),
            self.solver.options().cost_shape,
        )?;

        Ok(RoundReport {
            scenario_id: scenario_id.to_string(),
            plan: None,
            wait_times,
            score,
        })
    }
}
