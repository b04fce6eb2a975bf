//! HTTP adapter for the scenario simulator and runner services.

use std::env;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::scenario::{
    CreatedScenario, Customer, Dispatch, ScenarioSnapshot, Vehicle, VehicleStatus, VehicleUpdate,
};
use crate::traits::ScenarioRunner;

#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Service creating scenarios.
    pub simulator_url: String,
    /// Service running scenarios and accepting dispatches.
    pub runner_url: String,
    pub timeout_secs: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            simulator_url: "http://localhost:8080".to_string(),
            runner_url: "http://localhost:8090".to_string(),
            timeout_secs: 10,
        }
    }
}

impl ScenarioConfig {
    /// Defaults overridden by `SCENARIO_SIMULATOR_URL`, `SCENARIO_RUNNER_URL`
    /// and `SCENARIO_TIMEOUT_SECS` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = env::var("SCENARIO_SIMULATOR_URL") {
            config.simulator_url = url;
        }
        if let Ok(url) = env::var("SCENARIO_RUNNER_URL") {
            config.runner_url = url;
        }
        if let Some(secs) = env::var("SCENARIO_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
        {
            config.timeout_secs = secs;
        }
        config
    }
}

#[derive(Debug)]
pub enum RunnerError {
    Http(reqwest::Error),
    /// The response parsed but does not make sense (negative time, missing
    /// entries).
    Malformed(String),
    UnknownVehicle(String),
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerError::Http(err) => write!(f, "scenario runner request failed: {}", err),
            RunnerError::Malformed(message) => write!(f, "malformed scenario runner response: {}", message),
            RunnerError::UnknownVehicle(id) => write!(f, "scenario runner does not know vehicle {}", id),
        }
    }
}

impl std::error::Error for RunnerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunnerError::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RunnerError {
    fn from(err: reqwest::Error) -> Self {
        RunnerError::Http(err)
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioClient {
    config: ScenarioConfig,
    client: reqwest::blocking::Client,
}

impl ScenarioClient {
    pub fn new(config: ScenarioConfig) -> Result<Self, RunnerError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }
}

impl ScenarioRunner for ScenarioClient {
    fn create_scenario(
        &self,
        vehicle_count: Option<usize>,
        customer_count: Option<usize>,
    ) -> Result<CreatedScenario, RunnerError> {
        let mut query = Vec::new();
        if let Some(count) = vehicle_count {
            query.push(("numberOfVehicles", count));
        }
        if let Some(count) = customer_count {
            query.push(("numberOfCustomers", count));
        }

        let url = format!("{}/scenario/create", self.config.simulator_url);
        let body: serde_json::Value = self
            .client
            .post(url)
            .query(&query)
            .send()?
            .error_for_status()?
            .json()?;

        let scenario = created(body)?;
        debug!(scenario_id = %scenario.id, "scenario created");
        Ok(scenario)
    }

    fn initialize_scenario(&self, scenario: &CreatedScenario) -> Result<ScenarioSnapshot, RunnerError> {
        let url = format!("{}/Scenarios/initialize_scenario", self.config.runner_url);
        let body: InitializedScenario = self
            .client
            .post(url)
            .json(&scenario.body)
            .send()?
            .error_for_status()?
            .json()?;

        body.scenario.into_snapshot()
    }

    fn launch_scenario(&self, scenario_id: &str, speed: Option<f64>) -> Result<(), RunnerError> {
        let url = format!("{}/Runner/launch_scenario/{}", self.config.runner_url, scenario_id);
        let mut request = self.client.post(url);
        if let Some(speed) = speed {
            request = request.query(&[("speed", speed)]);
        }
        request.send()?.error_for_status()?;
        Ok(())
    }

    fn update_scenario(
        &self,
        scenario_id: &str,
        dispatches: &[Dispatch],
    ) -> Result<Vec<VehicleUpdate>, RunnerError> {
        let url = format!("{}/Scenarios/update_scenario/{}", self.config.runner_url, scenario_id);
        let body: UpdatedScenario = self
            .client
            .put(url)
            .json(&DispatchBody { vehicles: dispatches })
            .send()?
            .error_for_status()?
            .json()?;

        body.updated_vehicles
            .into_iter()
            .map(|vehicle| {
                Ok(VehicleUpdate {
                    remaining_travel_time: seconds(vehicle.remaining_travel_time)?,
                    vehicle_id: vehicle.id,
                    customer_id: vehicle.customer_id,
                })
            })
            .collect()
    }

    fn get_scenario(&self, scenario_id: &str) -> Result<Vec<VehicleStatus>, RunnerError> {
        let url = format!("{}/Scenarios/get_scenario/{}", self.config.runner_url, scenario_id);
        let body: LiveScenario = self
            .client
            .get(url)
            .send()?
            .error_for_status()?
            .json()?;

        body.vehicles
            .into_iter()
            .map(|vehicle| {
                Ok(VehicleStatus {
                    remaining_travel_time: vehicle.remaining_travel_time.map(seconds).transpose()?,
                    vehicle_id: vehicle.id,
                })
            })
            .collect()
    }
}

/// Travel times arrive as JSON numbers; whole seconds are what the tick
/// loop counts in.
fn seconds(value: f64) -> Result<u64, RunnerError> {
    if !value.is_finite() || value < 0.0 {
        return Err(RunnerError::Malformed(format!("remaining travel time {}", value)));
    }
    Ok(value.round() as u64)
}

/// Keeps the creation response whole; only its `id` is read.
fn created(body: serde_json::Value) -> Result<CreatedScenario, RunnerError> {
    let id = body
        .get("id")
        .and_then(|id| id.as_str())
        .ok_or_else(|| RunnerError::Malformed("created scenario has no id".to_string()))?
        .to_string();
    Ok(CreatedScenario::new(id, body))
}

#[derive(Debug, Deserialize)]
struct InitializedScenario {
    scenario: ScenarioBody,
}

#[derive(Debug, Deserialize)]
struct ScenarioBody {
    customers: Vec<CustomerBody>,
    vehicles: Vec<VehicleBody>,
}

impl ScenarioBody {
    fn into_snapshot(self) -> Result<ScenarioSnapshot, RunnerError> {
        let customers = self
            .customers
            .into_iter()
            .map(|c| Customer::new(c.id, (c.coord_x, c.coord_y), (c.destination_x, c.destination_y)))
            .collect();
        let vehicles = self
            .vehicles
            .into_iter()
            .map(|v| Vehicle::new(v.id, (v.coord_x, v.coord_y)))
            .collect();
        ScenarioSnapshot::new(customers, vehicles).map_err(|err| RunnerError::Malformed(err.to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerBody {
    id: String,
    coord_x: f64,
    coord_y: f64,
    destination_x: f64,
    destination_y: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VehicleBody {
    id: String,
    coord_x: f64,
    coord_y: f64,
}

#[derive(Debug, Serialize)]
struct DispatchBody<'a> {
    vehicles: &'a [Dispatch],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatedScenario {
    updated_vehicles: Vec<UpdatedVehicle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatedVehicle {
    id: String,
    customer_id: String,
    remaining_travel_time: f64,
}

#[derive(Debug, Deserialize)]
struct LiveScenario {
    vehicles: Vec<LiveVehicle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveVehicle {
    id: String,
    remaining_travel_time: Option<f64>,
}
