//! Tensor-product aggregation of neighbour features into one output vector.
//!
//! Stage one couples each neighbour's one-hot species with its harmonics,
//! weighted per edge; the results are summed and divided by
//! `sqrt(num_neighbours)`. Stage two is the self product of that sum with
//! one shared weight set, followed by the fixed change of frame `D_out(C)ᵀ`.

use super::encoder::EdgeFeatures;
use super::tensor_product::TensorProduct;
use crate::dataset::AtomEnvironment;
use angular::Irreps;
use nalgebra::{DMatrix, DVector, Matrix3};

/// Maps external (x, y, z) onto the harmonic frame.
pub fn coordinate_change() -> Matrix3<f64> {
    Matrix3::new(0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0)
}

#[derive(Debug, Clone)]
pub struct AggregateTape {
    /// Normalised neighbour sum, input of the self product.
    pub features: DVector<f64>,
}

#[derive(Debug, Clone)]
pub struct AggregateGradients {
    /// One column per edge.
    pub harmonics: DMatrix<f64>,
    pub edge_weights: DMatrix<f64>,
    pub shared_weights: DVector<f64>,
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    first: TensorProduct,
    second: TensorProduct,
    num_neighbours: f64,
    frame: DMatrix<f64>,
}

impl Aggregator {
    pub fn new(
        irreps_species: &Irreps,
        irreps_sh: &Irreps,
        irreps_mid: &Irreps,
        irreps_out: &Irreps,
        num_neighbours: f64,
    ) -> Self {
        Aggregator {
            first: TensorProduct::fully_connected(irreps_species, irreps_sh, irreps_mid),
            second: TensorProduct::fully_connected(irreps_mid, irreps_mid, irreps_out),
            num_neighbours,
            frame: irreps_out.d_from_matrix(&coordinate_change()),
        }
    }

    /// Weights produced per edge by the radial network.
    pub fn edge_weight_numel(&self) -> usize {
        self.first.weight_numel()
    }

    pub fn shared_weight_numel(&self) -> usize {
        self.second.weight_numel()
    }

    pub fn output_dim(&self) -> usize {
        self.second.irreps_out().dim()
    }

    pub fn forward(
        &self,
        env: &AtomEnvironment,
        edges: &EdgeFeatures,
        shared_weights: &[f64],
    ) -> (DVector<f64>, AggregateTape) {
        let norm = 1.0 / self.num_neighbours.sqrt();
        let mut features = DVector::zeros(self.second_input_dim());
        for (e, neighbour) in env.neighbours.iter().enumerate() {
            features += self.first.forward(
                neighbour.species.as_slice(),
                edges.harmonics_of(e),
                edges.weights_of(e),
            );
        }
        features *= norm;
        let raw = self.second.forward(features.as_slice(), features.as_slice(), shared_weights);
        (self.frame.tr_mul(&raw), AggregateTape { features })
    }

    pub fn backward(
        &self,
        env: &AtomEnvironment,
        edges: &EdgeFeatures,
        tape: &AggregateTape,
        shared_weights: &[f64],
        grad_output: &DVector<f64>,
    ) -> AggregateGradients {
        let grad_raw = &self.frame * grad_output;
        let x = tape.features.as_slice();
        let second = self.second.backward(x, x, shared_weights, grad_raw.as_slice());
        let grad_sum = (second.in1 + second.in2) / self.num_neighbours.sqrt();

        let mut harmonics = DMatrix::zeros(edges.harmonics.nrows(), edges.len());
        let mut edge_weights = DMatrix::zeros(edges.weights.nrows(), edges.len());
        for (e, neighbour) in env.neighbours.iter().enumerate() {
            let first = self.first.backward(
                neighbour.species.as_slice(),
                edges.harmonics_of(e),
                edges.weights_of(e),
                grad_sum.as_slice(),
            );
            harmonics.set_column(e, &first.in2);
            edge_weights.set_column(e, &first.weights);
        }
        AggregateGradients {
            harmonics,
            edge_weights,
            shared_weights: second.weights,
        }
    }

    fn second_input_dim(&self) -> usize {
        self.first.irreps_out().dim()
    }
}

#[cfg(test)]
mod tests {
    use crate::network::encoder::column;
    use super::*;

    #[test]
    fn frame_maps_vectors_to_harmonic_order() {
        // after the change an l = 1 block holds (y, z, x)
        let out = Irreps::spherical_harmonics(1);
        let frame = out.d_from_matrix(&coordinate_change());
        let v = DVector::from_vec(vec![0.0, 1.0, 2.0, 3.0]);
        let w = frame.tr_mul(&v);
        assert_eq!(w.len(), 4);
        assert!((w[0]).abs() < 1e-12);
        assert!((w[1] - 2.0).abs() < 1e-12);
        assert!((w[2] - 3.0).abs() < 1e-12);
        assert!((w[3] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn column_helper_reads_contiguous_columns() {
        let m = DMatrix::from_fn(3, 2, |i, j| (10 * j + i) as f64);
        assert_eq!(column(&m, 1), &[10.0, 11.0, 12.0]);
    }
}
