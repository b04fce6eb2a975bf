//! Solver-neutral mixed-integer linear model and the `good_lp` adapter.
//!
//! The assignment model is written against [`LinearModel`] so that it can be
//! inspected (and checked against a solution) without an engine; the engine
//! itself is only reached through [`MilpSolver`].

use std::fmt;

use good_lp::{
    constraint, default_solver, variable, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel, Variable, VariableDefinition,
};

use crate::traits::MilpSolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(usize);

impl ConstraintId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VarKind {
    Binary,
    Integer { min: f64, max: f64 },
}

impl VarKind {
    pub fn bounds(self) -> (f64, f64) {
        match self {
            VarKind::Binary => (0.0, 1.0),
            VarKind::Integer { min, max } => (min, max),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarSpec {
    pub name: String,
    pub kind: VarKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Le,
    Ge,
    Eq,
}

/// `sum(terms) <sense> rhs`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub name: String,
    pub terms: Vec<(VarId, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

impl LinearConstraint {
    pub fn new(name: impl Into<String>, terms: Vec<(VarId, f64)>, sense: Sense, rhs: f64) -> Self {
        Self {
            name: name.into(),
            terms,
            sense,
            rhs,
        }
    }

    pub fn activity(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(var, coef)| coef * values[var.index()])
            .sum()
    }

    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let activity = self.activity(values);
        match self.sense {
            Sense::Le => activity <= self.rhs + tolerance,
            Sense::Ge => activity >= self.rhs - tolerance,
            Sense::Eq => (activity - self.rhs).abs() <= tolerance,
        }
    }
}

/// Outcome of checking a constraint against the variable bounds alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feasibility {
    /// May bind; must be added.
    Required,
    /// Holds for every assignment within bounds.
    Vacuous,
    /// Violated by every assignment within bounds.
    Impossible,
}

const BOUND_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Default)]
pub struct LinearModel {
    variables: Vec<VarSpec>,
    constraints: Vec<LinearConstraint>,
    objective: Vec<(VarId, f64)>,
}

impl LinearModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_var(&mut self, name: impl Into<String>, kind: VarKind) -> VarId {
        self.variables.push(VarSpec {
            name: name.into(),
            kind,
        });
        VarId(self.variables.len() - 1)
    }

    pub fn variables(&self) -> &[VarSpec] {
        &self.variables
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn constraint(&self, id: ConstraintId) -> &LinearConstraint {
        &self.constraints[id.0]
    }

    pub fn objective(&self) -> &[(VarId, f64)] {
        &self.objective
    }

    /// Minimisation objective; repeated calls accumulate terms.
    pub fn add_objective_term(&mut self, var: VarId, coef: f64) {
        self.objective.push((var, coef));
    }

    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.objective
            .iter()
            .map(|(var, coef)| coef * values[var.index()])
            .sum()
    }

    /// Range of `sum(terms)` over the variable bounds.
    fn activity_range(&self, constraint: &LinearConstraint) -> (f64, f64) {
        constraint
            .terms
            .iter()
            .filter(|(_, coef)| *coef != 0.0)
            .fold((0.0, 0.0), |(low, high), (var, coef)| {
                let (min, max) = self.variables[var.index()].kind.bounds();
                if *coef > 0.0 {
                    (low + coef * min, high + coef * max)
                } else {
                    (low + coef * max, high + coef * min)
                }
            })
    }

    pub fn classify(&self, constraint: &LinearConstraint) -> Feasibility {
        let (low, high) = self.activity_range(constraint);
        let rhs = constraint.rhs;
        let (always, never) = match constraint.sense {
            Sense::Le => (high <= rhs + BOUND_EPS, low > rhs + BOUND_EPS),
            Sense::Ge => (low >= rhs - BOUND_EPS, high < rhs - BOUND_EPS),
            Sense::Eq => (
                (low - rhs).abs() <= BOUND_EPS && (high - rhs).abs() <= BOUND_EPS,
                low > rhs + BOUND_EPS || high < rhs - BOUND_EPS,
            ),
        };

        if never {
            Feasibility::Impossible
        } else if always {
            Feasibility::Vacuous
        } else {
            Feasibility::Required
        }
    }

    /// Appends without checking; callers decide via [`LinearModel::classify`].
    pub fn push_constraint(&mut self, constraint: LinearConstraint) -> ConstraintId {
        self.constraints.push(constraint);
        ConstraintId(self.constraints.len() - 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MilpOutcome {
    /// One value per variable, in [`LinearModel::variables`] order.
    Solved { values: Vec<f64>, objective: f64 },
    Infeasible,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MilpError {
    Unbounded,
    Engine(String),
}

impl fmt::Display for MilpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MilpError::Unbounded => write!(f, "model is unbounded"),
            MilpError::Engine(message) => write!(f, "MILP engine failure: {}", message),
        }
    }
}

impl std::error::Error for MilpError {}

/// [`MilpSolver`] backed by `good_lp`'s pure-Rust default solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoodLpSolver;

fn definition(spec: &VarSpec) -> VariableDefinition {
    let base = variable().name(spec.name.clone());
    match spec.kind {
        VarKind::Binary => base.binary(),
        VarKind::Integer { min, max } => {
            let base = base.integer().min(min);
            if max.is_finite() { base.max(max) } else { base }
        }
    }
}

impl MilpSolver for GoodLpSolver {
    fn solve(&self, model: &LinearModel) -> Result<MilpOutcome, MilpError> {
        let mut vars = ProblemVariables::new();
        let handles: Vec<Variable> = model
            .variables()
            .iter()
            .map(|spec| vars.add(definition(spec)))
            .collect();

        let expression = |terms: &[(VarId, f64)]| {
            let mut expr = Expression::from(0.0);
            for (var, coef) in terms {
                expr += *coef * handles[var.index()];
            }
            expr
        };

        let mut problem = vars
            .minimise(expression(model.objective()))
            .using(default_solver);
        for c in model.constraints() {
            let lhs = expression(&c.terms);
            problem = problem.with(match c.sense {
                Sense::Le => constraint::leq(lhs, c.rhs),
                Sense::Ge => constraint::geq(lhs, c.rhs),
                Sense::Eq => constraint::eq(lhs, c.rhs),
            });
        }

        match problem.solve() {
            Ok(solution) => {
                let values: Vec<f64> = handles.iter().map(|var| solution.value(*var)).collect();
                let objective = model.objective_value(&values);
                Ok(MilpOutcome::Solved { values, objective })
            }
            Err(ResolutionError::Infeasible) => Ok(MilpOutcome::Infeasible),
            Err(ResolutionError::Unbounded) => Err(MilpError::Unbounded),
            Err(other) => Err(MilpError::Engine(other.to_string())),
        }
    }
}
