//! Baseline dispatch policy used to judge the optimised plans against.

use rand::Rng;

use crate::scenario::{Dispatch, ScenarioSnapshot};

/// Every customer, drawn in random order, goes to a uniformly random vehicle.
///
/// Empty when there are no vehicles.
pub fn random_dispatches<R: Rng + ?Sized>(snapshot: &ScenarioSnapshot, rng: &mut R) -> Vec<Dispatch> {
    let vehicles = snapshot.vehicles();
    if vehicles.is_empty() {
        return Vec::new();
    }

    let mut remaining: Vec<&str> = snapshot
        .customers()
        .iter()
        .map(|customer| customer.id.as_str())
        .collect();
    let mut dispatches = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let vehicle = &vehicles[rng.random_range(0..vehicles.len())];
        let customer = remaining.swap_remove(rng.random_range(0..remaining.len()));
        dispatches.push(Dispatch::new(vehicle.id.clone(), customer));
    }

    dispatches
}
