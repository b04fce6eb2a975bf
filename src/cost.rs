//! Cost shaping of trip distances and the realized-outcome score.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::InvalidArgument;
use crate::scenario::CustomerId;

/// Monotone transform turning a raw trip distance into the weight of that
/// customer's waiting time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CostShape {
    /// `value(x) = x`
    Linear,
    /// `value(x) = sqrt(x)`
    #[default]
    Sqrt,
    /// `value(x) = ln(1 + x)`
    Log1p,
}

impl CostShape {
    /// Weight of a customer with trip distance `distance`.
    ///
    /// Non-decreasing on `[0, inf)`. Negative or NaN input is a domain error.
    pub fn value(self, distance: f64) -> Result<f64, InvalidArgument> {
        if distance.is_nan() || distance < 0.0 {
            return Err(InvalidArgument::new(format!(
                "cost input must be non-negative, got {}",
                distance
            )));
        }
        Ok(match self {
            CostShape::Linear => distance,
            CostShape::Sqrt => distance.sqrt(),
            CostShape::Log1p => distance.ln_1p(),
        })
    }
}

/// Weighted waiting time of a realized run:
/// `sum over c in wait_times of value(distances[c]) * wait_times[c]`.
///
/// Customers with a wait time but no known distance are an error.
pub fn score(
    wait_times: &BTreeMap<CustomerId, u64>,
    distances: &BTreeMap<CustomerId, f64>,
    shape: CostShape,
) -> Result<f64, InvalidArgument> {
    let mut total = 0.0;
    for (customer, wait) in wait_times {
        let distance = distances.get(customer).ok_or_else(|| {
            InvalidArgument::new(format!("no original distance for customer {}", customer))
        })?;
        total += shape.value(*distance)? * *wait as f64;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_rejects_negative() {
        for shape in [CostShape::Linear, CostShape::Sqrt, CostShape::Log1p] {
            assert!(shape.value(-1.0).is_err());
            assert!(shape.value(f64::NAN).is_err());
            assert_eq!(shape.value(0.0).unwrap(), 0.0);
        }
    }

    #[test]
    fn test_value_is_non_decreasing() {
        for shape in [CostShape::Linear, CostShape::Sqrt, CostShape::Log1p] {
            let mut previous = shape.value(0.0).unwrap();
            for step in 1..200 {
                let current = shape.value(step as f64 * 37.5).unwrap();
                assert!(current >= previous, "{:?} decreased at step {}", shape, step);
                previous = current;
            }
        }
    }

    #[test]
    fn test_linear_score() {
        let wait_times = BTreeMap::from([("id1".to_string(), 10), ("id2".to_string(), 20)]);
        let distances = BTreeMap::from([("id1".to_string(), 100.0), ("id2".to_string(), 200.0)]);

        let total = score(&wait_times, &distances, CostShape::Linear).unwrap();
        assert_eq!(total, 5000.0);
    }

    #[test]
    fn test_score_only_counts_present_wait_times() {
        let wait_times = BTreeMap::from([("id1".to_string(), 4)]);
        let distances = BTreeMap::from([("id1".to_string(), 9.0), ("id2".to_string(), 16.0)]);

        let total = score(&wait_times, &distances, CostShape::Sqrt).unwrap();
        assert_eq!(total, 12.0);
    }

    #[test]
    fn test_score_missing_distance_is_error() {
        let wait_times = BTreeMap::from([("ghost".to_string(), 1)]);
        assert!(score(&wait_times, &BTreeMap::new(), CostShape::Linear).is_err());
    }

    #[test]
    fn test_empty_score_is_zero() {
        let total = score(&BTreeMap::new(), &BTreeMap::new(), CostShape::Sqrt).unwrap();
        assert_eq!(total, 0.0);
    }
}
