//! Great-circle distances on geographic coordinates.
//!
//! All coordinates are (lat, lng) in degrees; distances come out in meters.

use crate::error::InvalidArgument;
use crate::traits::DistanceMatrixProvider;

/// Average driving speed assumption for time estimation.
const DEFAULT_SPEED_KMH: f64 = 40.0;

/// Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two points in meters.
pub fn haversine_meters(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lng1) = from;
    let (lat2, lng2) = to;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Straight-line travel time in whole seconds at `speed_mps` meters per second.
pub fn travel_time_seconds(
    from: (f64, f64),
    to: (f64, f64),
    speed_mps: f64,
) -> Result<u64, InvalidArgument> {
    if !(speed_mps > 0.0) {
        return Err(InvalidArgument::new(format!(
            "speed must be greater than zero, got {}",
            speed_mps
        )));
    }
    Ok((haversine_meters(from, to) / speed_mps).round() as u64)
}

/// Haversine-based travel-time matrix provider.
///
/// Estimates travel time using straight-line distance and an assumed speed.
#[derive(Debug, Clone)]
pub struct HaversineMatrix {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
}

impl Default for HaversineMatrix {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
        }
    }
}

impl HaversineMatrix {
    pub fn new(speed_kmh: f64) -> Result<Self, InvalidArgument> {
        if !(speed_kmh > 0.0) {
            return Err(InvalidArgument::new(format!(
                "matrix speed must be greater than zero, got {}",
                speed_kmh
            )));
        }
        Ok(Self { speed_kmh })
    }

    /// Convert distance in meters to travel time in seconds.
    fn meters_to_seconds(&self, meters: f64) -> i32 {
        let hours = meters / 1000.0 / self.speed_kmh;
        (hours * 3600.0).round() as i32
    }
}

impl DistanceMatrixProvider for HaversineMatrix {
    fn matrix_for(&self, locations: &[(f64, f64)]) -> Vec<Vec<i32>> {
        let n = locations.len();
        let mut matrix = vec![vec![0; n]; n];

        for (i, from) in locations.iter().enumerate() {
            for (j, to) in locations.iter().enumerate() {
                if i != j {
                    matrix[i][j] = self.meters_to_seconds(haversine_meters(*from, *to));
                }
            }
        }

        matrix
    }
}
