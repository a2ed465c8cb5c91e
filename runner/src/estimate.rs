//! Heuristic memory requirement of a simulation run.
//!
//! The coefficients are fitted to the observed memory usage of the simulator
//! and only serve admission decisions, they do not account for real usage.

use crate::grid::GridShape;
use std::{fmt, path::PathBuf};
use thiserror::Error;
use tracing::error;

const COEFFICIENT: f64 = 0.005_051_93;
const EXPONENT: f64 = 0.725_788_13;
// KB -> GB
const KB_TO_GB: f64 = 1.0 / (1u64 << 20) as f64;

/// A grid whose estimated requirement exceeds the available memory
#[derive(Debug, Clone, PartialEq)]
pub struct OverBudget {
    pub map: PathBuf,
    pub required: f64,
    pub available: f64,
}

impl fmt::Display for OverBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} requires {:.3} GB but only {:.3} GB are available",
            self.map.display(),
            self.required,
            self.available
        )
    }
}

#[derive(Debug, Error)]
pub enum EstimateError {
    #[error("{} map(s) exceed the memory budget", .0.len())]
    InsufficientMemory(Vec<OverBudget>),
}

/// estimated memory requirement in GB for a grid of the given shape
pub fn estimate(shape: GridShape) -> f64 {
    let cells = shape.area() as f64;

    COEFFICIENT * (cells * cells).powf(EXPONENT) * KB_TO_GB
}

/// estimate every map, failing if any of them exceeds `available` GB
///
/// All offending maps are reported before the error is returned.
pub fn estimate_all<'a, I>(maps: I, available: f64) -> Result<Vec<f64>, EstimateError>
where
    I: IntoIterator<Item = (&'a PathBuf, GridShape)>,
{
    let mut requirements = Vec::new();
    let mut failures = Vec::new();

    for (map, shape) in maps {
        let required = estimate(shape);

        if required > available {
            let failure = OverBudget {
                map: map.clone(),
                required,
                available,
            };

            error!("Fatal: {failure}");
            failures.push(failure);
        }

        requirements.push(required);
    }

    if failures.is_empty() {
        Ok(requirements)
    } else {
        Err(EstimateError::InsufficientMemory(failures))
    }
}
