//! A solved assignment expressed in customer and vehicle ids.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::scenario::{CustomerId, Dispatch, VehicleId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// `(vehicle, first customer)`
    pub starts: Vec<(VehicleId, CustomerId)>,
    /// `(dropped customer, next customer)`
    pub chains: Vec<(CustomerId, CustomerId)>,
    /// Customers that needed relaxation in some round; their incoming pairs
    /// ignore the radius cutoff.
    pub relaxed: BTreeSet<CustomerId>,
    /// Planned wait-time lower bounds, in distance units.
    pub planned_waits: BTreeMap<CustomerId, f64>,
    pub objective: f64,
    /// Number of solve rounds it took to converge.
    pub rounds: usize,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty() && self.chains.is_empty()
    }

    /// Work queue per vehicle: its start customer followed by the chain
    /// edges taken transitively. A customer is never queued twice.
    pub fn queues(&self) -> BTreeMap<VehicleId, VecDeque<CustomerId>> {
        let next: BTreeMap<&str, &str> = self
            .chains
            .iter()
            .map(|(from, to)| (from.as_str(), to.as_str()))
            .collect();

        let mut queues = BTreeMap::new();
        for (vehicle, first) in &self.starts {
            let mut queue = VecDeque::from([first.clone()]);
            let mut seen = HashSet::from([first.as_str()]);
            let mut current = first.as_str();
            while let Some(&following) = next.get(current) {
                if !seen.insert(following) {
                    break;
                }
                queue.push_back(following.to_string());
                current = following;
            }
            queues.insert(vehicle.clone(), queue);
        }
        queues
    }

    /// The plan flattened into dispatch order per vehicle.
    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.queues()
            .into_iter()
            .flat_map(|(vehicle, queue)| {
                queue
                    .into_iter()
                    .map(move |customer| Dispatch::new(vehicle.clone(), customer))
            })
            .collect()
    }

    /// How many times each customer is picked up, by an incoming chain edge
    /// or by a vehicle start.
    pub fn pickup_counts(&self) -> BTreeMap<CustomerId, usize> {
        let mut counts = BTreeMap::new();
        for (_, customer) in &self.starts {
            *counts.entry(customer.clone()).or_insert(0) += 1;
        }
        for (_, customer) in &self.chains {
            *counts.entry(customer.clone()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(starts: &[(&str, &str)], chains: &[(&str, &str)]) -> Plan {
        Plan {
            starts: starts
                .iter()
                .map(|(v, c)| (v.to_string(), c.to_string()))
                .collect(),
            chains: chains
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            ..Plan::default()
        }
    }

    #[test]
    fn test_queues_follow_chains() {
        let plan = plan(&[("v1", "a"), ("v2", "x")], &[("b", "c"), ("a", "b")]);
        let queues = plan.queues();

        assert_eq!(queues["v1"], VecDeque::from(["a".to_string(), "b".into(), "c".into()]));
        assert_eq!(queues["v2"], VecDeque::from(["x".to_string()]));
    }

    #[test]
    fn test_queues_stop_on_cycle() {
        let plan = plan(&[("v1", "a")], &[("a", "b"), ("b", "a")]);
        assert_eq!(plan.queues()["v1"].len(), 2);
    }

    #[test]
    fn test_empty_plan() {
        let plan = Plan::default();
        assert!(plan.is_empty());
        assert!(plan.queues().is_empty());
        assert!(plan.dispatches().is_empty());
    }

    #[test]
    fn test_dispatches_in_queue_order() {
        let plan = plan(&[("v1", "a")], &[("a", "b")]);
        assert_eq!(
            plan.dispatches(),
            vec![Dispatch::new("v1", "a"), Dispatch::new("v1", "b")]
        );
    }

    #[test]
    fn test_pickup_counts() {
        let plan = plan(&[("v1", "a")], &[("a", "b"), ("c", "b")]);
        let counts = plan.pickup_counts();
        assert_eq!(counts["a"], 1);
        assert_eq!(counts["b"], 2);
        assert!(!counts.contains_key("c"));
    }
}
