//! Read-only distance tables of a planning round and the pair-eligibility
//! policy deciding which customers may be chained.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;

use crate::cost::CostShape;
use crate::error::InvalidArgument;
use crate::haversine::haversine_meters;
use crate::scenario::ScenarioSnapshot;

/// Customers (by snapshot index) excused from the radius cutoff.
///
/// Grows monotonically across the rounds of one solve.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelaxedSet(BTreeSet<usize>);

impl RelaxedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, customer: usize) -> bool {
        self.0.contains(&customer)
    }

    /// Returns `true` if the customer was not yet relaxed.
    pub fn insert(&mut self, customer: usize) -> bool {
        self.0.insert(customer)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<usize> for RelaxedSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Decides whether a vehicle may drive from one customer's destination to
/// another customer's pickup.
///
/// The same predicate is used for variable creation, constraint construction
/// and the subtour pre-filter.
#[derive(Debug, Clone, Copy)]
pub struct PairFilter<'a> {
    snapshot: &'a ScenarioSnapshot,
    radius_m: f64,
    relaxed: &'a RelaxedSet,
}

impl<'a> PairFilter<'a> {
    pub fn new(snapshot: &'a ScenarioSnapshot, radius_m: f64, relaxed: &'a RelaxedSet) -> Self {
        Self {
            snapshot,
            radius_m,
            relaxed,
        }
    }

    pub fn snapshot(&self) -> &'a ScenarioSnapshot {
        self.snapshot
    }

    pub fn relaxed(&self) -> &'a RelaxedSet {
        self.relaxed
    }

    /// Distance from the destination of `from` to the pickup of `to`.
    pub fn next_leg_meters(&self, from: usize, to: usize) -> f64 {
        let customers = self.snapshot.customers();
        haversine_meters(customers[from].destination, customers[to].pickup)
    }

    /// `to` is relaxed, or the two customers differ and the hand-off leg is
    /// shorter than the radius.
    pub fn include_pair(&self, from: usize, to: usize) -> bool {
        self.relaxed.contains(to) || (from != to && self.next_leg_meters(from, to) < self.radius_m)
    }

    /// Number of eligible ordered pairs with both endpoints in `subset`.
    pub fn internal_pair_count(&self, subset: &[usize]) -> usize {
        subset
            .iter()
            .map(|&from| subset.iter().filter(|&&to| self.include_pair(from, to)).count())
            .sum()
    }
}

/// Distance tables derived from a snapshot under a given pair filter.
#[derive(Debug, Clone)]
pub struct DistanceIndex {
    destination: Vec<f64>,
    next_leg: BTreeMap<(usize, usize), f64>,
    /// `vehicle[v][c]`: vehicle position to customer pickup.
    vehicle: Vec<Vec<f64>>,
    value: Vec<f64>,
}

impl DistanceIndex {
    pub fn build(filter: &PairFilter<'_>, shape: CostShape) -> Result<Self, InvalidArgument> {
        let customers = filter.snapshot().customers();
        let vehicles = filter.snapshot().vehicles();

        let destination: Vec<f64> = customers.par_iter().map(|customer| customer.trip_meters()).collect();

        let rows: Vec<Vec<((usize, usize), f64)>> = (0..customers.len())
            .into_par_iter()
            .map(|from| {
                (0..customers.len())
                    .filter(|&to| filter.include_pair(from, to))
                    .map(|to| ((from, to), filter.next_leg_meters(from, to)))
                    .collect()
            })
            .collect();
        let next_leg = rows.into_iter().flatten().collect();

        let vehicle = vehicles
            .par_iter()
            .map(|vehicle| {
                customers
                    .iter()
                    .map(|customer| haversine_meters(vehicle.position, customer.pickup))
                    .collect()
            })
            .collect();

        let value = destination
            .iter()
            .map(|distance| shape.value(*distance))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            destination,
            next_leg,
            vehicle,
            value,
        })
    }

    pub fn customer_count(&self) -> usize {
        self.destination.len()
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicle.len()
    }

    /// Pickup-to-destination distance of a customer.
    pub fn destination(&self, customer: usize) -> f64 {
        self.destination[customer]
    }

    /// Hand-off leg distance, `None` when the pair is not eligible.
    pub fn next_leg(&self, from: usize, to: usize) -> Option<f64> {
        self.next_leg.get(&(from, to)).copied()
    }

    /// Eligible pairs in row-major order.
    pub fn eligible_pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.next_leg.keys().copied()
    }

    pub fn vehicle_distance(&self, vehicle: usize, customer: usize) -> f64 {
        self.vehicle[vehicle][customer]
    }

    /// Cost-shaped weight of a customer's waiting time.
    pub fn value(&self, customer: usize) -> f64 {
        self.value[customer]
    }

    /// Upper bound on any integer wait time a plan can realize: the farthest
    /// vehicle approach plus every trip and every customer's longest hand-off
    /// leg, each rounded up since integer waits round up at every step.
    pub fn horizon(&self) -> f64 {
        let approach = self
            .vehicle
            .iter()
            .flatten()
            .copied()
            .fold(0.0, f64::max);
        let legs: f64 = (0..self.customer_count())
            .map(|from| {
                let longest = self
                    .next_leg
                    .range((from, 0)..(from + 1, 0))
                    .map(|(_, distance)| *distance)
                    .fold(0.0, f64::max);
                (self.destination[from] + longest).ceil()
            })
            .sum();
        approach.ceil() + legs
    }

    /// Longest `destination + next leg` over the eligible pairs.
    pub fn longest_hand_off(&self) -> f64 {
        self.next_leg
            .iter()
            .map(|(&(from, _), leg)| self.destination[from] + leg)
            .fold(0.0, f64::max)
    }
}
