//! Parameter optimisers for model training
//!
//! Optimisers update the flat parameter vector of a model in place, given the
//! gradient of the batch loss.

mod adam;
mod steepest_descent;

pub use adam::AdamOptimizer;
pub use steepest_descent::SteepestDescentOptimizer;

use crate::error::{PaoError, Result};
use nalgebra::DVector;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationAlgorithm {
    Adam,
    SteepestDescent,
}

impl FromStr for OptimizationAlgorithm {
    type Err = PaoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "adam" => Ok(Self::Adam),
            "sd" | "steepest_descent" => Ok(Self::SteepestDescent),
            _ => Err(PaoError::Config(format!("unknown optimizer: {}", s))),
        }
    }
}

/// Create an optimizer based on algorithm choice
pub fn create_optimizer(
    algorithm: &str,
    learning_rate: f64,
    num_params: usize,
) -> Result<Box<dyn ParameterOptimizer>> {
    if !(learning_rate > 0.0 && learning_rate.is_finite()) {
        return Err(PaoError::Config(format!(
            "learning rate must be positive, got {}",
            learning_rate
        )));
    }
    Ok(match OptimizationAlgorithm::from_str(algorithm)? {
        OptimizationAlgorithm::Adam => Box::new(AdamOptimizer::new(learning_rate, num_params)),
        OptimizationAlgorithm::SteepestDescent => {
            Box::new(SteepestDescentOptimizer::new(learning_rate))
        }
    })
}

/// Trait for gradient-based parameter updates
pub trait ParameterOptimizer: Send {
    fn name(&self) -> &'static str;

    /// Update `params` in place against `gradient`.
    fn step(&mut self, params: &mut DVector<f64>, gradient: &DVector<f64>);

    fn learning_rate(&self) -> f64;
    fn set_learning_rate(&mut self, learning_rate: f64);

    /// Number of steps taken so far.
    fn iterations(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// f(x) = sum_i (i + 1) (x_i - 1)^2
    fn gradient(x: &DVector<f64>) -> DVector<f64> {
        DVector::from_fn(x.len(), |i, _| 2.0 * (i as f64 + 1.0) * (x[i] - 1.0))
    }

    #[test]
    fn parses_algorithm_names() {
        assert_eq!("Adam".parse::<OptimizationAlgorithm>().unwrap(), OptimizationAlgorithm::Adam);
        assert_eq!("sd".parse::<OptimizationAlgorithm>().unwrap(), OptimizationAlgorithm::SteepestDescent);
        assert!("lbfgs".parse::<OptimizationAlgorithm>().is_err());
        assert!(create_optimizer("adam", -1.0, 3).is_err());
    }

    #[test]
    fn both_optimizers_minimise_a_quadratic() {
        for (name, lr, steps) in [("adam", 0.05, 2000), ("sd", 0.05, 500)] {
            let mut opt = create_optimizer(name, lr, 3).unwrap();
            let mut x = DVector::from_vec(vec![-2.0, 4.0, 0.5]);
            for _ in 0..steps {
                let g = gradient(&x);
                opt.step(&mut x, &g);
            }
            assert_eq!(opt.iterations(), steps);
            assert!(x.add_scalar(-1.0).amax() < 1e-2, "{name}: {x}");
        }
    }
}
