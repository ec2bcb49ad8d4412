//! Bias-free fully connected network mapping radial embeddings to
//! tensor-product weights.
//!
//! Features are stored one column per edge. Layer `k` computes
//! `z = W_kᵀ a / sqrt(fan_in)`; hidden layers apply SiLU rescaled to unit
//! second moment under a standard normal input, the last layer is linear.

use angular::quadrature::simpson_integration;
use nalgebra::{DMatrix, DMatrixView};
use std::f64::consts::PI;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// 1 / sqrt(E[silu(z)^2]) for z ~ N(0, 1)
fn silu_normalisation() -> f64 {
    let second_moment = simpson_integration(
        |z| {
            let s = z * sigmoid(z);
            s * s * (-0.5 * z * z).exp() / (2.0 * PI).sqrt()
        },
        -12.0,
        12.0,
        4000,
    );
    1.0 / second_moment.sqrt()
}

/// Intermediate values of a forward pass, consumed by [`RadialNetwork::backward`].
#[derive(Debug, Clone)]
pub struct MlpTape {
    inputs: Vec<DMatrix<f64>>,
    preactivations: Vec<DMatrix<f64>>,
}

#[derive(Debug, Clone)]
pub struct RadialNetwork {
    dims: Vec<usize>,
    act_scale: f64,
}

impl RadialNetwork {
    /// `dims = [input, hidden.., output]`
    pub fn new(dims: &[usize]) -> Self {
        assert!(dims.len() >= 2, "network needs an input and an output layer");
        RadialNetwork {
            dims: dims.to_vec(),
            act_scale: silu_normalisation(),
        }
    }

    pub fn num_params(&self) -> usize {
        self.dims.windows(2).map(|w| w[0] * w[1]).sum()
    }

    pub fn output_dim(&self) -> usize {
        self.dims[self.dims.len() - 1]
    }

    fn activation(&self, z: f64) -> f64 {
        self.act_scale * z * sigmoid(z)
    }

    fn activation_derivative(&self, z: f64) -> f64 {
        let s = sigmoid(z);
        self.act_scale * (s + z * s * (1.0 - s))
    }

    fn layer<'a>(&self, params: &'a [f64], k: usize) -> (DMatrixView<'a, f64>, f64) {
        let offset: usize = self.dims.windows(2).take(k).map(|w| w[0] * w[1]).sum();
        let (fan_in, fan_out) = (self.dims[k], self.dims[k + 1]);
        let w = DMatrixView::from_slice(&params[offset..offset + fan_in * fan_out], fan_in, fan_out);
        (w, 1.0 / (fan_in as f64).sqrt())
    }

    pub fn forward(&self, params: &[f64], input: &DMatrix<f64>) -> (DMatrix<f64>, MlpTape) {
        assert_eq!(params.len(), self.num_params());
        let layers = self.dims.len() - 1;
        let mut inputs = vec![input.clone()];
        let mut preactivations = Vec::with_capacity(layers - 1);
        let mut output = DMatrix::zeros(0, 0);
        for k in 0..layers {
            let (w, norm) = self.layer(params, k);
            let z = w.tr_mul(&inputs[k]) * norm;
            if k + 1 < layers {
                inputs.push(z.map(|x| self.activation(x)));
                preactivations.push(z);
            } else {
                output = z;
            }
        }
        (
            output,
            MlpTape {
                inputs,
                preactivations,
            },
        )
    }

    /// Returns the gradients with respect to the input and the parameters.
    pub fn backward(
        &self,
        params: &[f64],
        tape: &MlpTape,
        grad_output: &DMatrix<f64>,
    ) -> (DMatrix<f64>, Vec<f64>) {
        let mut grad_params = vec![0.0; self.num_params()];
        let mut g = grad_output.clone();
        let mut offset = self.num_params();
        for k in (0..self.dims.len() - 1).rev() {
            let (w, norm) = self.layer(params, k);
            let size = self.dims[k] * self.dims[k + 1];
            offset -= size;
            let grad_w = (&tape.inputs[k] * g.transpose()) * norm;
            grad_params[offset..offset + size].copy_from_slice(grad_w.as_slice());
            let grad_in = (w * &g) * norm;
            g = if k > 0 {
                let z = &tape.preactivations[k - 1];
                grad_in.zip_map(z, |gi, zi| gi * self.activation_derivative(zi))
            } else {
                grad_in
            };
        }
        (g, grad_params)
    }
}
