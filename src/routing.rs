//! Pickup-and-delivery formulation of the same dispatch problem, solved by a
//! routing engine instead of the assignment MILP.
//!
//! Node layout: `0` is a zero-cost dummy end depot, `1..=m` are vehicle
//! starts, then `n` pickup nodes followed by `n` delivery nodes.

use tracing::debug;

use crate::scenario::{Dispatch, ScenarioSnapshot, VehicleId, CustomerId};
use crate::traits::{DistanceMatrixProvider, RoutingSolver};

#[derive(Debug, Clone)]
pub struct RoutingOptions {
    /// Upper bound on a single route's cost, in matrix units.
    pub max_route_cost: i64,
    /// Weight of the longest route in the objective.
    pub span_cost_coefficient: i64,
    /// Customers a vehicle may carry at once.
    pub vehicle_capacity: i64,
    /// Maximum relocate passes after construction.
    pub local_search_iterations: usize,
}

impl Default for RoutingOptions {
    fn default() -> Self {
        Self {
            max_route_cost: 3 * 3600,
            span_cost_coefficient: 100,
            vehicle_capacity: 1,
            local_search_iterations: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PickupDeliveryModel {
    pub distance_matrix: Vec<Vec<i64>>,
    /// `(pickup node, delivery node)` per customer.
    pub pickups_deliveries: Vec<(usize, usize)>,
    pub starts: Vec<usize>,
    pub ends: Vec<usize>,
    pub capacities: Vec<i64>,
    pub demands: Vec<i64>,
    pub max_route_cost: i64,
    pub span_cost_coefficient: i64,
    vehicle_ids: Vec<VehicleId>,
    customer_ids: Vec<CustomerId>,
}

impl PickupDeliveryModel {
    pub fn build<M: DistanceMatrixProvider>(
        snapshot: &ScenarioSnapshot,
        matrix_provider: &M,
        options: &RoutingOptions,
    ) -> Self {
        let vehicles = snapshot.vehicles();
        let customers = snapshot.customers();
        let m = vehicles.len();
        let n = customers.len();
        let size = 1 + m + 2 * n;

        let locations: Vec<(f64, f64)> = vehicles
            .iter()
            .map(|vehicle| vehicle.position)
            .chain(customers.iter().map(|customer| customer.pickup))
            .chain(customers.iter().map(|customer| customer.destination))
            .collect();
        let inner = matrix_provider.matrix_for(&locations);

        // Row and column 0 stay zero: the depot is free to reach and leave.
        let mut distance_matrix = vec![vec![0i64; size]; size];
        for (i, row) in inner.iter().enumerate().take(size - 1) {
            for (j, value) in row.iter().enumerate().take(size - 1) {
                distance_matrix[i + 1][j + 1] = i64::from(*value);
            }
        }

        let pickups_deliveries = (0..n).map(|c| (1 + m + c, 1 + m + n + c)).collect();

        let mut demands = vec![0; size];
        for c in 0..n {
            demands[1 + m + c] = 1;
            demands[1 + m + n + c] = -1;
        }

        Self {
            distance_matrix,
            pickups_deliveries,
            starts: (1..=m).collect(),
            ends: vec![0; m],
            capacities: vec![options.vehicle_capacity; m],
            demands,
            max_route_cost: options.max_route_cost,
            span_cost_coefficient: options.span_cost_coefficient,
            vehicle_ids: vehicles.iter().map(|vehicle| vehicle.id.clone()).collect(),
            customer_ids: customers.iter().map(|customer| customer.id.clone()).collect(),
        }
    }

    pub fn vehicle_count(&self) -> usize {
        self.starts.len()
    }

    /// Customer index of a pickup node.
    pub fn pickup_customer(&self, node: usize) -> Option<usize> {
        self.pickups_deliveries
            .iter()
            .position(|(pickup, _)| *pickup == node)
    }

    /// Cost of driving `nodes` with `vehicle`, or `None` when the route breaks
    /// capacity, precedence or the route cost cap.
    pub fn route_cost(&self, vehicle: usize, nodes: &[usize]) -> Option<i64> {
        let mut load = 0;
        let mut cost = 0;
        let mut previous = self.starts[vehicle];
        let mut open = Vec::new();

        for &node in nodes {
            cost += self.distance_matrix[previous][node];
            load += self.demands[node];
            if load < 0 || load > self.capacities[vehicle] {
                return None;
            }
            if self.demands[node] > 0 {
                open.push(node);
            } else if self.demands[node] < 0 {
                let pickup = self
                    .pickups_deliveries
                    .iter()
                    .find(|(_, delivery)| *delivery == node)
                    .map(|(pickup, _)| *pickup)?;
                let at = open.iter().position(|p| *p == pickup)?;
                open.swap_remove(at);
            }
            previous = node;
        }
        cost += self.distance_matrix[previous][self.ends[vehicle]];

        if !open.is_empty() || cost > self.max_route_cost {
            return None;
        }
        Some(cost)
    }

    /// Total cost plus the span penalty on the longest route.
    pub fn objective(&self, routes: &[Vec<usize>]) -> Option<i64> {
        let mut total = 0;
        let mut longest = 0;
        for (vehicle, nodes) in routes.iter().enumerate() {
            let cost = self.route_cost(vehicle, nodes)?;
            total += cost;
            longest = longest.max(cost);
        }
        Some(total + self.span_cost_coefficient * longest)
    }
}

/// Keeps the pickup nodes of every route, in route order, as dispatches.
pub fn routes_to_dispatches(model: &PickupDeliveryModel, routes: &[Vec<usize>]) -> Vec<Dispatch> {
    routes
        .iter()
        .enumerate()
        .flat_map(|(vehicle, nodes)| {
            nodes.iter().filter_map(move |node| {
                model.pickup_customer(*node).map(|customer| {
                    Dispatch::new(
                        model.vehicle_ids[vehicle].clone(),
                        model.customer_ids[customer].clone(),
                    )
                })
            })
        })
        .collect()
}

/// Built-in routing engine: cheapest insertion of each pickup/delivery pair
/// followed by relocate local search.
#[derive(Debug, Clone, Default)]
pub struct InsertionRouter {
    pub local_search_iterations: usize,
}

impl InsertionRouter {
    pub fn new(options: &RoutingOptions) -> Self {
        Self {
            local_search_iterations: options.local_search_iterations,
        }
    }
}

impl RoutingSolver for InsertionRouter {
    fn solve(&self, model: &PickupDeliveryModel) -> Vec<Vec<usize>> {
        let mut routes: Vec<Vec<usize>> = vec![Vec::new(); model.vehicle_count()];

        for &(pickup, delivery) in &model.pickups_deliveries {
            match best_insertion(model, &routes, pickup, delivery) {
                Some((candidate, _)) => routes = candidate,
                None => {
                    debug!(pickup, delivery, "request cannot be inserted into any route");
                    return Vec::new();
                }
            }
        }

        local_search(model, &mut routes, self.local_search_iterations);
        routes
    }
}

/// Cheapest feasible placement of a pickup/delivery pair over all routes.
fn best_insertion(
    model: &PickupDeliveryModel,
    routes: &[Vec<usize>],
    pickup: usize,
    delivery: usize,
) -> Option<(Vec<Vec<usize>>, i64)> {
    let mut best: Option<(Vec<Vec<usize>>, i64)> = None;

    for vehicle in 0..routes.len() {
        let len = routes[vehicle].len();
        for i in 0..=len {
            for j in i..=len {
                let mut nodes = routes[vehicle].clone();
                nodes.insert(i, pickup);
                nodes.insert(j + 1, delivery);

                let mut candidate = routes.to_vec();
                candidate[vehicle] = nodes;

                if let Some(cost) = model.objective(&candidate) {
                    if best.as_ref().is_none_or(|(_, best_cost)| cost < *best_cost) {
                        best = Some((candidate, cost));
                    }
                }
            }
        }
    }

    best
}

/// Takes one customer's pickup and delivery out of their route and reinserts
/// the pair wherever it is cheapest. Stops at the first move that lowers the
/// objective and reports whether it found one.
fn relocate_improve(model: &PickupDeliveryModel, routes: &mut Vec<Vec<usize>>) -> bool {
    let Some(current) = model.objective(routes) else {
        return false;
    };

    for &(pickup, delivery) in &model.pickups_deliveries {
        let mut without = routes.clone();
        for nodes in without.iter_mut() {
            nodes.retain(|node| *node != pickup && *node != delivery);
        }

        if let Some((candidate, cost)) = best_insertion(model, &without, pickup, delivery) {
            if cost < current {
                *routes = candidate;
                return true;
            }
        }
    }

    false
}

/// Repeats pair relocation until a pass finds nothing or `iterations` passes ran.
fn local_search(model: &PickupDeliveryModel, routes: &mut Vec<Vec<usize>>, iterations: usize) {
    for _ in 0..iterations {
        if !relocate_improve(model, routes) {
            break;
        }
    }
}
