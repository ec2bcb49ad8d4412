//! Steepest descent with a fixed step

use super::ParameterOptimizer;
use nalgebra::DVector;

pub struct SteepestDescentOptimizer {
    step_size: f64,
    iterations: usize,
}

impl SteepestDescentOptimizer {
    pub fn new(step_size: f64) -> Self {
        SteepestDescentOptimizer {
            step_size,
            iterations: 0,
        }
    }
}

impl ParameterOptimizer for SteepestDescentOptimizer {
    fn name(&self) -> &'static str {
        "sd"
    }

    fn step(&mut self, params: &mut DVector<f64>, gradient: &DVector<f64>) {
        params.axpy(-self.step_size, gradient, 1.0);
        self.iterations += 1;
    }

    fn learning_rate(&self) -> f64 {
        self.step_size
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.step_size = learning_rate;
    }

    fn iterations(&self) -> usize {
        self.iterations
    }
}
