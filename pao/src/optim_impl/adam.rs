//! Adam with bias-corrected first and second moments

use super::ParameterOptimizer;
use nalgebra::DVector;

pub struct AdamOptimizer {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    first_moment: DVector<f64>,
    second_moment: DVector<f64>,
    iterations: usize,
}

impl AdamOptimizer {
    pub fn new(learning_rate: f64, num_params: usize) -> Self {
        AdamOptimizer {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            first_moment: DVector::zeros(num_params),
            second_moment: DVector::zeros(num_params),
            iterations: 0,
        }
    }
}

impl ParameterOptimizer for AdamOptimizer {
    fn name(&self) -> &'static str {
        "adam"
    }

    fn step(&mut self, params: &mut DVector<f64>, gradient: &DVector<f64>) {
        self.iterations += 1;
        let t = self.iterations as i32;
        let (b1, b2) = (self.beta1, self.beta2);
        let correction1 = 1.0 - b1.powi(t);
        let correction2 = 1.0 - b2.powi(t);
        for i in 0..params.len() {
            let g = gradient[i];
            self.first_moment[i] = b1 * self.first_moment[i] + (1.0 - b1) * g;
            self.second_moment[i] = b2 * self.second_moment[i] + (1.0 - b2) * g * g;
            let m_hat = self.first_moment[i] / correction1;
            let v_hat = self.second_moment[i] / correction2;
            params[i] -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    fn iterations(&self) -> usize {
        self.iterations
    }
}
