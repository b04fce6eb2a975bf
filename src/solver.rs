//! Assignment solver: builds and solves one round at a time and drives the
//! relaxation retry loop to a fixed point.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info};

use crate::cost::CostShape;
use crate::distance_index::{DistanceIndex, PairFilter, RelaxedSet};
use crate::error::InvalidArgument;
use crate::lp::{MilpError, MilpOutcome};
use crate::model::{Assignment, AssignmentModel, ModelError, ModelParameters};
use crate::plan::Plan;
use crate::scenario::{CustomerId, ScenarioSnapshot};
use crate::traits::MilpSolver;

/// How the chain wait-time constraints are loosened when an edge is off.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BigM {
    /// Derived from the instance: the wait-time horizon plus the longest
    /// hand-off, plus one. Never binds for an inactive edge.
    Derived,
    Fixed(f64),
}

impl BigM {
    pub fn resolve(self, index: &DistanceIndex) -> f64 {
        match self {
            BigM::Derived => index.horizon() + index.longest_hand_off() + 1.0,
            BigM::Fixed(value) => value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// Hand-off legs must be shorter than this to be chainable, in meters.
    pub radius_m: f64,
    /// Multiplier on a relaxed customer's weight.
    pub penalty: f64,
    pub big_m: BigM,
    /// Bound on relaxation rounds before giving up.
    pub max_rounds: usize,
    /// Binaries within this distance of 1 are read as set.
    pub tolerance: f64,
    pub cost_shape: CostShape,
    /// Largest subset cardinality with a subtour constraint (`None` = all).
    /// Self-loop bounds of relaxed customers are emitted regardless.
    pub max_subtour_size: Option<usize>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            radius_m: 2_000.0,
            penalty: 10_000.0,
            big_m: BigM::Derived,
            max_rounds: 10,
            tolerance: 1e-6,
            cost_shape: CostShape::default(),
            max_subtour_size: None,
        }
    }
}

#[derive(Debug)]
pub enum SolveError {
    Cost(InvalidArgument),
    Model(ModelError),
    Engine(MilpError),
    /// The engine found no solution even with relaxation available.
    Infeasible { round: usize },
    /// Customers kept asking for relaxation after `rounds` rounds.
    NonConvergence {
        rounds: usize,
        relaxed: Vec<CustomerId>,
    },
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveError::Cost(err) => write!(f, "cost shaping failed: {}", err),
            SolveError::Model(err) => write!(f, "model construction failed: {}", err),
            SolveError::Engine(err) => write!(f, "{}", err),
            SolveError::Infeasible { round } => write!(f, "round {} is infeasible", round),
            SolveError::NonConvergence { rounds, relaxed } => write!(
                f,
                "relaxation did not converge after {} rounds (still relaxing {})",
                rounds,
                relaxed.join(", ")
            ),
        }
    }
}

impl std::error::Error for SolveError {}

impl From<InvalidArgument> for SolveError {
    fn from(err: InvalidArgument) -> Self {
        SolveError::Cost(err)
    }
}

impl From<ModelError> for SolveError {
    fn from(err: ModelError) -> Self {
        SolveError::Model(err)
    }
}

impl From<MilpError> for SolveError {
    fn from(err: MilpError) -> Self {
        SolveError::Engine(err)
    }
}

#[derive(Debug, Clone)]
pub struct ModelSolver<S: MilpSolver> {
    engine: S,
    options: SolveOptions,
}

impl<S: MilpSolver> ModelSolver<S> {
    pub fn new(engine: S, options: SolveOptions) -> Self {
        Self { engine, options }
    }

    pub fn options(&self) -> &SolveOptions {
        &self.options
    }

    /// Builds and solves a single round under `relaxed`.
    pub fn solve_round(
        &self,
        snapshot: &ScenarioSnapshot,
        relaxed: &RelaxedSet,
        round: usize,
    ) -> Result<Assignment, SolveError> {
        let filter = PairFilter::new(snapshot, self.options.radius_m, relaxed);
        let index = DistanceIndex::build(&filter, self.options.cost_shape)?;
        let params = ModelParameters {
            big_m: self.options.big_m.resolve(&index),
            penalty: self.options.penalty,
            max_subtour_size: self.options.max_subtour_size,
        };
        let model = AssignmentModel::build(&filter, &index, &params)?;

        debug!(
            round,
            variables = model.lp().variables().len(),
            constraints = model.lp().constraints().len(),
            vacuous = model.vacuous_count(),
            big_m = params.big_m,
            "assignment model built"
        );

        match self.engine.solve(model.lp())? {
            MilpOutcome::Solved { values, objective } => {
                Ok(model.extract(&values, objective, self.options.tolerance))
            }
            MilpOutcome::Infeasible => Err(SolveError::Infeasible { round }),
        }
    }

    /// Solves until no customer asks for relaxation, growing `relaxed` with
    /// every customer that did.
    pub fn solve(&self, snapshot: &ScenarioSnapshot, mut relaxed: RelaxedSet) -> Result<Plan, SolveError> {
        let customers = snapshot.customers();
        if customers.is_empty() {
            return Ok(Plan::default());
        }

        let mut last_relaxed = Vec::new();
        for round in 1..=self.options.max_rounds {
            let assignment = self.solve_round(snapshot, &relaxed, round)?;

            info!(
                round,
                relaxed = relaxed.len(),
                requested = assignment.relaxed.len(),
                objective = assignment.objective,
                "assignment round solved"
            );

            if assignment.relaxed.is_empty() {
                return Ok(to_plan(snapshot, &assignment, &relaxed, round));
            }

            for customer in &assignment.relaxed {
                relaxed.insert(*customer);
            }
            last_relaxed = assignment.relaxed;
        }

        Err(SolveError::NonConvergence {
            rounds: self.options.max_rounds,
            relaxed: last_relaxed
                .into_iter()
                .map(|c| customers[c].id.clone())
                .collect(),
        })
    }
}

fn to_plan(snapshot: &ScenarioSnapshot, assignment: &Assignment, relaxed: &RelaxedSet, rounds: usize) -> Plan {
    let customers = snapshot.customers();
    let vehicles = snapshot.vehicles();

    Plan {
        starts: assignment
            .starts
            .iter()
            .map(|&(v, c)| (vehicles[v].id.clone(), customers[c].id.clone()))
            .collect(),
        chains: assignment
            .chains
            .iter()
            .map(|&(a, b)| (customers[a].id.clone(), customers[b].id.clone()))
            .collect(),
        relaxed: relaxed.iter().map(|c| customers[c].id.clone()).collect(),
        planned_waits: customers
            .iter()
            .zip(&assignment.waits)
            .map(|(customer, wait)| (customer.id.clone(), *wait))
            .collect::<BTreeMap<_, _>>(),
        objective: assignment.objective,
        rounds,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::lp::LinearModel;
    use crate::scenario::{Customer, Vehicle};

    /// Engine returning scripted relaxed flags, one script entry per round.
    struct ScriptedEngine {
        rounds: RefCell<Vec<Vec<&'static str>>>,
    }

    impl MilpSolver for ScriptedEngine {
        fn solve(&self, model: &LinearModel) -> Result<MilpOutcome, MilpError> {
            let mut rounds = self.rounds.borrow_mut();
            let relax = if rounds.is_empty() { Vec::new() } else { rounds.remove(0) };
            let values = model
                .variables()
                .iter()
                .map(|spec| {
                    let flagged = relax
                        .iter()
                        .any(|id| spec.name == format!("relaxed[{}]", id));
                    if flagged { 1.0 } else { 0.0 }
                })
                .collect();
            Ok(MilpOutcome::Solved {
                values,
                objective: 0.0,
            })
        }
    }

    struct NeverFeasible;

    impl MilpSolver for NeverFeasible {
        fn solve(&self, _model: &LinearModel) -> Result<MilpOutcome, MilpError> {
            Ok(MilpOutcome::Infeasible)
        }
    }

    fn snapshot() -> ScenarioSnapshot {
        ScenarioSnapshot::new(
            vec![
                Customer::new("a", (0.0, 0.0), (0.0, 0.01)),
                Customer::new("b", (0.0, 0.5), (0.0, 0.51)),
            ],
            vec![Vehicle::new("v", (0.0, 0.0))],
        )
        .unwrap()
    }

    #[test]
    fn test_relaxed_set_accumulates_until_fixed_point() {
        let engine = ScriptedEngine {
            rounds: RefCell::new(vec![vec!["b"], vec!["a"], vec![]]),
        };
        let solver = ModelSolver::new(engine, SolveOptions::default());

        let plan = solver.solve(&snapshot(), RelaxedSet::new()).unwrap();
        assert_eq!(plan.rounds, 3);
        assert_eq!(
            plan.relaxed.iter().cloned().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_non_convergence_is_fatal() {
        let engine = ScriptedEngine {
            rounds: RefCell::new(vec![vec!["b"]; 5]),
        };
        let options = SolveOptions {
            max_rounds: 3,
            ..SolveOptions::default()
        };
        let solver = ModelSolver::new(engine, options);

        match solver.solve(&snapshot(), RelaxedSet::new()) {
            Err(SolveError::NonConvergence { rounds, relaxed }) => {
                assert_eq!(rounds, 3);
                assert_eq!(relaxed, vec!["b".to_string()]);
            }
            other => panic!("expected non-convergence, got {:?}", other),
        }
    }

    #[test]
    fn test_engine_infeasibility_is_reported_with_round() {
        let solver = ModelSolver::new(NeverFeasible, SolveOptions::default());
        assert!(matches!(
            solver.solve(&snapshot(), RelaxedSet::new()),
            Err(SolveError::Infeasible { round: 1 })
        ));
    }

    #[test]
    fn test_empty_snapshot_skips_engine() {
        let solver = ModelSolver::new(NeverFeasible, SolveOptions::default());
        let empty = ScenarioSnapshot::new(vec![], vec![Vehicle::new("v", (0.0, 0.0))]).unwrap();
        let plan = solver.solve(&empty, RelaxedSet::new()).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.rounds, 0);
    }

    #[test]
    fn test_fixed_big_m_is_used_verbatim() {
        let snapshot = snapshot();
        let relaxed = RelaxedSet::new();
        let filter = PairFilter::new(&snapshot, 2_000.0, &relaxed);
        let index = DistanceIndex::build(&filter, CostShape::Sqrt).unwrap();

        assert_eq!(BigM::Fixed(100_000.0).resolve(&index), 100_000.0);
        assert!(BigM::Derived.resolve(&index) > index.horizon());
    }
}
