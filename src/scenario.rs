//! Immutable view of one planning round: customers waiting for pickup and
//! the vehicles available to serve them.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::InvalidArgument;
use crate::haversine::haversine_meters;

pub type CustomerId = String;
pub type VehicleId = String;
pub type ScenarioId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    /// Pickup location (lat, lng).
    pub pickup: (f64, f64),
    /// Destination location (lat, lng).
    pub destination: (f64, f64),
}

impl Customer {
    pub fn new(id: impl Into<CustomerId>, pickup: (f64, f64), destination: (f64, f64)) -> Self {
        Self {
            id: id.into(),
            pickup,
            destination,
        }
    }

    /// Length of the ride itself, pickup to destination, in meters.
    pub fn trip_meters(&self) -> f64 {
        haversine_meters(self.pickup, self.destination)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    /// Current location (lat, lng).
    pub position: (f64, f64),
}

impl Vehicle {
    pub fn new(id: impl Into<VehicleId>, position: (f64, f64)) -> Self {
        Self {
            id: id.into(),
            position,
        }
    }
}

/// Customers and vehicles of one planning round.
///
/// Ids are unique within each list. Customers and vehicles are addressed by
/// their position in the snapshot everywhere inside the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSnapshot {
    customers: Vec<Customer>,
    vehicles: Vec<Vehicle>,
}

impl ScenarioSnapshot {
    pub fn new(customers: Vec<Customer>, vehicles: Vec<Vehicle>) -> Result<Self, InvalidArgument> {
        let mut seen = HashSet::new();
        for customer in &customers {
            if !seen.insert(customer.id.as_str()) {
                return Err(InvalidArgument::new(format!("duplicate customer id {}", customer.id)));
            }
        }
        let mut seen = HashSet::new();
        for vehicle in &vehicles {
            if !seen.insert(vehicle.id.as_str()) {
                return Err(InvalidArgument::new(format!("duplicate vehicle id {}", vehicle.id)));
            }
        }

        Ok(Self {
            customers,
            vehicles,
        })
    }

    pub fn customers(&self) -> &[Customer] {
        &self.customers
    }

    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    pub fn customer_index(&self, id: &str) -> Option<usize> {
        self.customers.iter().position(|customer| customer.id == id)
    }

    pub fn vehicle_index(&self, id: &str) -> Option<usize> {
        self.vehicles.iter().position(|vehicle| vehicle.id == id)
    }
}

/// Pickup-to-destination distance of every customer, keyed by id.
///
/// These are the "original distances" the score is weighted with.
pub fn destination_distances(snapshot: &ScenarioSnapshot) -> BTreeMap<CustomerId, f64> {
    snapshot
        .customers()
        .iter()
        .map(|customer| (customer.id.clone(), customer.trip_meters()))
        .collect()
}

/// A scenario fresh from the simulator. `body` is the whole creation
/// response; initialization posts it back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedScenario {
    pub id: ScenarioId,
    pub body: serde_json::Value,
}

impl CreatedScenario {
    pub fn new(id: impl Into<ScenarioId>, body: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }
}

/// Instruction for a vehicle to go and fetch a customer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dispatch {
    #[serde(rename = "id")]
    pub vehicle_id: VehicleId,
    #[serde(rename = "customerId")]
    pub customer_id: CustomerId,
}

impl Dispatch {
    pub fn new(vehicle_id: impl Into<VehicleId>, customer_id: impl Into<CustomerId>) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            customer_id: customer_id.into(),
        }
    }
}

/// A vehicle's state right after a dispatch was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleUpdate {
    pub vehicle_id: VehicleId,
    pub customer_id: CustomerId,
    /// Seconds until the vehicle reaches the customer.
    pub remaining_travel_time: u64,
}

/// A vehicle as reported by a live scenario query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleStatus {
    pub vehicle_id: VehicleId,
    /// `None` once the vehicle is idle.
    pub remaining_travel_time: Option<u64>,
}
