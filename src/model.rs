//! Assignment/sequencing formulation of one planning round.
//!
//! Variables:
//! - `chain[a,b]` (binary) for every eligible pair: a vehicle picks up `b`
//!   right after dropping `a`.
//! - `start[v,c]` (binary): vehicle `v` starts its chain at `c`.
//! - `wait[c]` (integer, `0..=horizon`): lower bound on the pickup time of
//!   `c`, in distance units.
//! - `relaxed[c]` (binary): `c` is excused from chaining this round.

use std::collections::BTreeMap;
use std::fmt;

use crate::distance_index::{DistanceIndex, PairFilter};
use crate::lp::{ConstraintId, Feasibility, LinearConstraint, LinearModel, Sense, VarId, VarKind};

/// Named constraint families, kept separately so that tests and callers can
/// check a solution family by family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintFamily {
    VehicleMaxConnection,
    CustomerMaxConnection,
    GetsPickedUpOnce,
    ChainWaitTime,
    StartWaitTime,
}

impl fmt::Display for ConstraintFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintFamily::VehicleMaxConnection => "vehicle_max_connection",
            ConstraintFamily::CustomerMaxConnection => "customer_max_connection",
            ConstraintFamily::GetsPickedUpOnce => "gets_picked_up_once",
            ConstraintFamily::ChainWaitTime => "chain_wait_time",
            ConstraintFamily::StartWaitTime => "start_wait_time",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// A constraint no assignment within the variable bounds can satisfy.
    Impossible { constraint: String },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Impossible { constraint } => {
                write!(f, "constraint {} can never be satisfied", constraint)
            }
        }
    }
}

impl std::error::Error for ModelError {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelParameters {
    /// Loosening constant of the chain wait-time constraints.
    pub big_m: f64,
    /// Multiplier on the weight of a relaxed customer.
    pub penalty: f64,
    /// Largest subset cardinality that gets a subtour constraint.
    /// `None` covers every cardinality.
    pub max_subtour_size: Option<usize>,
}

/// Solved values of one round, by snapshot index.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub chains: Vec<(usize, usize)>,
    /// `(vehicle, customer)`
    pub starts: Vec<(usize, usize)>,
    pub relaxed: Vec<usize>,
    pub waits: Vec<f64>,
    pub objective: f64,
}

#[derive(Debug, Clone)]
pub struct AssignmentModel {
    lp: LinearModel,
    chain: BTreeMap<(usize, usize), VarId>,
    start: BTreeMap<(usize, usize), VarId>,
    wait: Vec<VarId>,
    relaxed: Vec<VarId>,
    families: BTreeMap<ConstraintFamily, Vec<ConstraintId>>,
    /// Subtour constraints keyed by subset cardinality.
    subtours: BTreeMap<usize, Vec<ConstraintId>>,
    vacuous: usize,
}

impl AssignmentModel {
    pub fn build(
        filter: &PairFilter<'_>,
        index: &DistanceIndex,
        params: &ModelParameters,
    ) -> Result<Self, ModelError> {
        let customers = filter.snapshot().customers();
        let vehicles = filter.snapshot().vehicles();
        let horizon = index.horizon();

        let mut lp = LinearModel::new();

        let chain: BTreeMap<_, _> = index
            .eligible_pairs()
            .map(|(a, b)| {
                let name = format!("chain[{},{}]", customers[a].id, customers[b].id);
                ((a, b), lp.add_var(name, VarKind::Binary))
            })
            .collect();

        let mut start = BTreeMap::new();
        for (v, vehicle) in vehicles.iter().enumerate() {
            for (c, customer) in customers.iter().enumerate() {
                let name = format!("start[{},{}]", vehicle.id, customer.id);
                start.insert((v, c), lp.add_var(name, VarKind::Binary));
            }
        }

        let wait: Vec<VarId> = customers
            .iter()
            .map(|customer| {
                lp.add_var(
                    format!("wait[{}]", customer.id),
                    VarKind::Integer {
                        min: 0.0,
                        max: horizon,
                    },
                )
            })
            .collect();

        let relaxed: Vec<VarId> = customers
            .iter()
            .map(|customer| lp.add_var(format!("relaxed[{}]", customer.id), VarKind::Binary))
            .collect();

        for c in 0..customers.len() {
            lp.add_objective_term(wait[c], index.value(c));
            lp.add_objective_term(relaxed[c], index.value(c) * params.penalty);
        }

        let mut model = Self {
            lp,
            chain,
            start,
            wait,
            relaxed,
            families: BTreeMap::new(),
            subtours: BTreeMap::new(),
            vacuous: 0,
        };

        model.add_connection_constraints(filter, index)?;
        model.add_wait_time_constraints(filter, index, params.big_m)?;
        model.add_subtour_constraints(filter, params.max_subtour_size)?;

        Ok(model)
    }

    fn add_connection_constraints(
        &mut self,
        filter: &PairFilter<'_>,
        index: &DistanceIndex,
    ) -> Result<(), ModelError> {
        let customers = filter.snapshot().customers();
        let vehicles = filter.snapshot().vehicles();

        for (v, vehicle) in vehicles.iter().enumerate() {
            let terms = (0..customers.len())
                .map(|c| (self.start[&(v, c)], 1.0))
                .collect();
            let constraint = LinearConstraint::new(
                format!("vehicle_max_connection[{}]", vehicle.id),
                terms,
                Sense::Le,
                1.0,
            );
            self.add(ConstraintFamily::VehicleMaxConnection, constraint)?;
        }

        for (c, customer) in customers.iter().enumerate() {
            let mut terms: Vec<(VarId, f64)> = self
                .chain
                .range((c, 0)..(c + 1, 0))
                .map(|(_, var)| (*var, 1.0))
                .collect();
            terms.push((self.relaxed[c], 1.0));
            let constraint = LinearConstraint::new(
                format!("customer_max_connection[{}]", customer.id),
                terms,
                Sense::Le,
                1.0,
            );
            self.add(ConstraintFamily::CustomerMaxConnection, constraint)?;
        }

        for (c, customer) in customers.iter().enumerate() {
            let mut terms: Vec<(VarId, f64)> = index
                .eligible_pairs()
                .filter(|&(_, to)| to == c)
                .map(|pair| (self.chain[&pair], 1.0))
                .collect();
            terms.extend((0..vehicles.len()).map(|v| (self.start[&(v, c)], 1.0)));
            terms.push((self.relaxed[c], 1.0));
            let constraint = LinearConstraint::new(
                format!("gets_picked_up_once[{}]", customer.id),
                terms,
                Sense::Eq,
                1.0,
            );
            self.add(ConstraintFamily::GetsPickedUpOnce, constraint)?;
        }

        Ok(())
    }

    fn add_wait_time_constraints(
        &mut self,
        filter: &PairFilter<'_>,
        index: &DistanceIndex,
        big_m: f64,
    ) -> Result<(), ModelError> {
        let customers = filter.snapshot().customers();
        let vehicles = filter.snapshot().vehicles();

        // wait[b] >= wait[a] + dest[a] + leg[a,b] - M * (1 - chain[a,b])
        let pairs: Vec<(usize, usize)> = index.eligible_pairs().collect();
        for (a, b) in pairs {
            if a == b {
                // Self-loops are forbidden outright by the singleton subtour bound.
                continue;
            }
            let leg = index.destination(a) + index.next_leg(a, b).unwrap_or_default();
            let constraint = LinearConstraint::new(
                format!("chain_wait_time[{},{}]", customers[a].id, customers[b].id),
                vec![
                    (self.wait[b], 1.0),
                    (self.wait[a], -1.0),
                    (self.chain[&(a, b)], -big_m),
                ],
                Sense::Ge,
                leg - big_m,
            );
            self.add(ConstraintFamily::ChainWaitTime, constraint)?;
        }

        // wait[c] >= distance[v,c] * start[v,c]
        for (v, vehicle) in vehicles.iter().enumerate() {
            for (c, customer) in customers.iter().enumerate() {
                let constraint = LinearConstraint::new(
                    format!("start_wait_time[{},{}]", vehicle.id, customer.id),
                    vec![
                        (self.wait[c], 1.0),
                        (self.start[&(v, c)], -index.vehicle_distance(v, c)),
                    ],
                    Sense::Ge,
                    0.0,
                );
                self.add(ConstraintFamily::StartWaitTime, constraint)?;
            }
        }

        Ok(())
    }

    /// At most `|S| - 1` active chain edges inside every subset `S` whose
    /// eligible internal pairs could close a cycle. Singletons only matter
    /// for relaxed customers, whose self-pair is eligible.
    fn add_subtour_constraints(
        &mut self,
        filter: &PairFilter<'_>,
        max_size: Option<usize>,
    ) -> Result<(), ModelError> {
        let customers = filter.snapshot().customers();
        let n = customers.len();
        // Singleton bounds are always kept: the wait-time family never sees a self-loop.
        let max_size = max_size.unwrap_or(n).max(1).min(n);

        for size in 1..=max_size {
            let mut subsets = Vec::new();
            for_each_subset(n, size, |subset| {
                if filter.internal_pair_count(subset) >= subset.len() {
                    subsets.push(subset.to_vec());
                }
            });

            for subset in subsets {
                let terms = subset
                    .iter()
                    .flat_map(|&a| subset.iter().map(move |&b| (a, b)))
                    .filter_map(|pair| self.chain.get(&pair).map(|var| (*var, 1.0)))
                    .collect();
                let ids: Vec<&str> = subset.iter().map(|&c| customers[c].id.as_str()).collect();
                let constraint = LinearConstraint::new(
                    format!("subtour_{}[{}]", size, ids.join(",")),
                    terms,
                    Sense::Le,
                    (size - 1) as f64,
                );
                match self.lp.classify(&constraint) {
                    Feasibility::Required => {
                        let id = self.lp.push_constraint(constraint);
                        self.subtours.entry(size).or_default().push(id);
                    }
                    Feasibility::Vacuous => self.vacuous += 1,
                    Feasibility::Impossible => {
                        return Err(ModelError::Impossible {
                            constraint: constraint.name,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    fn add(&mut self, family: ConstraintFamily, constraint: LinearConstraint) -> Result<(), ModelError> {
        match self.lp.classify(&constraint) {
            Feasibility::Required => {
                let id = self.lp.push_constraint(constraint);
                self.families.entry(family).or_default().push(id);
                Ok(())
            }
            Feasibility::Vacuous => {
                self.vacuous += 1;
                Ok(())
            }
            Feasibility::Impossible => Err(ModelError::Impossible {
                constraint: constraint.name,
            }),
        }
    }

    pub fn lp(&self) -> &LinearModel {
        &self.lp
    }

    pub fn chain_var(&self, from: usize, to: usize) -> Option<VarId> {
        self.chain.get(&(from, to)).copied()
    }

    pub fn start_var(&self, vehicle: usize, customer: usize) -> Option<VarId> {
        self.start.get(&(vehicle, customer)).copied()
    }

    pub fn wait_var(&self, customer: usize) -> VarId {
        self.wait[customer]
    }

    pub fn relaxed_var(&self, customer: usize) -> VarId {
        self.relaxed[customer]
    }

    pub fn chain_count(&self) -> usize {
        self.chain.len()
    }

    /// Constraints added for a family; vacuous ones are not listed.
    pub fn family(&self, family: ConstraintFamily) -> impl Iterator<Item = &LinearConstraint> + '_ {
        self.families
            .get(&family)
            .into_iter()
            .flatten()
            .map(|id| self.lp.constraint(*id))
    }

    /// Subtour constraints grouped by subset cardinality.
    pub fn subtours(&self) -> impl Iterator<Item = (usize, &LinearConstraint)> + '_ {
        self.subtours
            .iter()
            .flat_map(move |(size, ids)| ids.iter().map(move |id| (*size, self.lp.constraint(*id))))
    }

    /// Number of constraints skipped because they could never bind.
    pub fn vacuous_count(&self) -> usize {
        self.vacuous
    }

    /// Reads binaries as set when within `tolerance` of 1.
    pub fn extract(&self, values: &[f64], objective: f64, tolerance: f64) -> Assignment {
        let is_set = |var: &VarId| (values[var.index()] - 1.0).abs() <= tolerance;

        Assignment {
            chains: self
                .chain
                .iter()
                .filter(|(_, var)| is_set(var))
                .map(|(pair, _)| *pair)
                .collect(),
            starts: self
                .start
                .iter()
                .filter(|(_, var)| is_set(var))
                .map(|(pair, _)| *pair)
                .collect(),
            relaxed: self
                .relaxed
                .iter()
                .enumerate()
                .filter(|(_, var)| is_set(var))
                .map(|(c, _)| c)
                .collect(),
            waits: self.wait.iter().map(|var| values[var.index()]).collect(),
            objective,
        }
    }
}

/// Calls `visit` with every `size`-element subset of `0..n`, in
/// lexicographic order.
fn for_each_subset(n: usize, size: usize, mut visit: impl FnMut(&[usize])) {
    if size == 0 || size > n {
        return;
    }
    let mut subset: Vec<usize> = (0..size).collect();
    loop {
        visit(&subset);

        // Rightmost position that can still advance.
        let Some(pos) = (0..size).rev().find(|&i| subset[i] < n - size + i) else {
            return;
        };
        subset[pos] += 1;
        for i in pos + 1..size {
            subset[i] = subset[i - 1] + 1;
        }
    }
}
