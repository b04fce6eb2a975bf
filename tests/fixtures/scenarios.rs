//! Synthetic scenarios with hand-checked geometry.

use dispatch_planner::scenario::{Customer, ScenarioSnapshot, Vehicle};

/// Two short trips (~50 m each) and three idle vehicles nearby.
pub fn two_customers_three_vehicles() -> ScenarioSnapshot {
    ScenarioSnapshot::new(
        vec![
            Customer::new("id1", (0.0, 0.0), (0.0, 0.00045)),
            Customer::new("id2", (0.001, 0.0), (0.001, 0.00045)),
        ],
        vec![
            Vehicle::new("v1", (0.0, -0.001)),
            Vehicle::new("v2", (0.001, -0.001)),
            Vehicle::new("v3", (0.002, 0.0)),
        ],
    )
    .expect("valid snapshot")
}

/// One vehicle between two customers whose hand-off legs are 1.6 km and
/// 3 km long. "short" rides 400 m, "long" rides 1000 m; both pickups are
/// 1000 m from the vehicle.
pub fn one_vehicle_two_far_customers() -> ScenarioSnapshot {
    ScenarioSnapshot::new(
        vec![
            Customer::new("long", (0.0, 0.009), (0.0, 0.018)),
            Customer::new("short", (0.0, -0.009), (0.0, -0.0054)),
        ],
        vec![Vehicle::new("v1", (0.0, 0.0))],
    )
    .expect("valid snapshot")
}

/// Four customers on the corners of a ~1.1 km square, each destination
/// ~11 m from the next corner's pickup, so the eligible pairs under a 100 m
/// radius form a single 4-cycle.
pub fn ring_of_four(vehicles: usize) -> ScenarioSnapshot {
    let corners = [(0.0, 0.0), (0.0, 0.01), (0.01, 0.01), (0.01, 0.0)];
    let customers = (0..4)
        .map(|i| {
            let next = corners[(i + 1) % 4];
            Customer::new(format!("c{}", i), corners[i], (next.0 + 0.0001, next.1))
        })
        .collect();
    let vehicles = (0..vehicles)
        .map(|v| Vehicle::new(format!("v{}", v), (0.005, 0.005)))
        .collect();
    ScenarioSnapshot::new(customers, vehicles).expect("valid snapshot")
}

/// Detects a directed cycle among chain edges by walking successors.
pub fn has_cycle(chains: &[(String, String)]) -> bool {
    chains.iter().any(|(start, _)| {
        let mut current = start.as_str();
        for _ in 0..=chains.len() {
            match chains.iter().find(|(from, _)| from == current) {
                Some((_, to)) if to == start => return true,
                Some((_, to)) => current = to,
                None => return false,
            }
        }
        false
    })
}
