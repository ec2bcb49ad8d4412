//! Geometric feature encoder: per-neighbour spherical harmonics and
//! radial-conditioned tensor-product weights.

use super::mlp::{MlpTape, RadialNetwork};
use super::radial::RadialEmbedding;
use crate::dataset::AtomEnvironment;
use crate::error::{PaoError, Result};
use angular::{Irreps, SphericalHarmonics};
use nalgebra::{DMatrix, Vector3};

/// Neighbours closer than this to the centre are rejected.
pub const MIN_DISTANCE: f64 = 1e-8;

/// Column `j` of a column-major matrix as a slice.
pub(crate) fn column(m: &DMatrix<f64>, j: usize) -> &[f64] {
    let n = m.nrows();
    &m.as_slice()[j * n..(j + 1) * n]
}

/// Per-edge features of one environment, one column per neighbour.
#[derive(Debug, Clone)]
pub struct EdgeFeatures {
    pub vectors: Vec<Vector3<f64>>,
    pub distances: Vec<f64>,
    pub harmonics: DMatrix<f64>,
    pub embedding: DMatrix<f64>,
    pub weights: DMatrix<f64>,
    // edge-major: edge * sh_dim + component
    harmonic_gradients: Vec<Vector3<f64>>,
    embedding_slopes: DMatrix<f64>,
    tape: MlpTape,
}

impl EdgeFeatures {
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn harmonics_of(&self, edge: usize) -> &[f64] {
        column(&self.harmonics, edge)
    }

    pub fn weights_of(&self, edge: usize) -> &[f64] {
        column(&self.weights, edge)
    }
}

#[derive(Debug, Clone)]
pub struct GeometricEncoder {
    irreps_sh: Irreps,
    radial: RadialEmbedding,
    network: RadialNetwork,
}

impl GeometricEncoder {
    pub fn new(lmax: u32, max_radius: f64, radial_basis: usize, hidden: &[usize], weight_numel: usize) -> Self {
        let mut dims = vec![radial_basis];
        dims.extend_from_slice(hidden);
        dims.push(weight_numel);
        GeometricEncoder {
            irreps_sh: Irreps::spherical_harmonics(lmax),
            radial: RadialEmbedding::new(max_radius, radial_basis),
            network: RadialNetwork::new(&dims),
        }
    }

    pub fn irreps_sh(&self) -> &Irreps {
        &self.irreps_sh
    }

    pub fn num_params(&self) -> usize {
        self.network.num_params()
    }

    pub fn encode(&self, env: &AtomEnvironment, params: &[f64]) -> Result<EdgeFeatures> {
        let n_edges = env.neighbours.len();
        let sh_dim = self.irreps_sh.dim();
        let mut sh = SphericalHarmonics::new(self.irreps_sh.lmax());
        let mut vectors = Vec::with_capacity(n_edges);
        let mut distances = Vec::with_capacity(n_edges);
        let mut harmonics = DMatrix::zeros(sh_dim, n_edges);
        let mut harmonic_gradients = Vec::with_capacity(n_edges * sh_dim);
        let mut embedding = DMatrix::zeros(self.radial.len(), n_edges);
        let mut embedding_slopes = DMatrix::zeros(self.radial.len(), n_edges);

        for (e, neighbour) in env.neighbours.iter().enumerate() {
            let v = neighbour.position - env.center;
            let d = v.norm();
            if d < MIN_DISTANCE {
                return Err(PaoError::CoincidentAtoms { index: e });
            }
            sh.compute(&v, true);
            harmonics.column_mut(e).copy_from_slice(&sh.values);
            harmonic_gradients.extend_from_slice(&sh.gradients);
            let (values, slopes) = self.radial.embed(d);
            embedding.set_column(e, &values);
            embedding_slopes.set_column(e, &slopes);
            vectors.push(v);
            distances.push(d);
        }

        let (weights, tape) = self.network.forward(params, &embedding);
        Ok(EdgeFeatures {
            vectors,
            distances,
            harmonics,
            embedding,
            weights,
            harmonic_gradients,
            embedding_slopes,
            tape,
        })
    }

    /// Parameter gradient and the gradient with respect to every edge vector.
    pub fn backward(
        &self,
        edges: &EdgeFeatures,
        params: &[f64],
        grad_harmonics: &DMatrix<f64>,
        grad_weights: &DMatrix<f64>,
    ) -> (Vec<f64>, Vec<Vector3<f64>>) {
        let (grad_embedding, grad_params) = self.network.backward(params, &edges.tape, grad_weights);
        let sh_dim = self.irreps_sh.dim();
        let edge_grads = (0..edges.len())
            .map(|e| {
                let mut g = Vector3::zeros();
                for (c, gc) in column(grad_harmonics, e).iter().enumerate() {
                    g += edges.harmonic_gradients[e * sh_dim + c] * *gc;
                }
                let radial: f64 = grad_embedding
                    .column(e)
                    .iter()
                    .zip(edges.embedding_slopes.column(e).iter())
                    .map(|(a, b)| a * b)
                    .sum();
                g + edges.vectors[e] * (radial / edges.distances[e])
            })
            .collect();
        (grad_params, edge_grads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Neighbour;
    use nalgebra::DVector;

    fn environment() -> AtomEnvironment {
        let neighbour = |x: f64, y: f64, z: f64, s: usize| Neighbour {
            position: Vector3::new(x, y, z),
            species: DVector::from_fn(2, |i, _| if i == s { 1.0 } else { 0.0 }),
        };
        AtomEnvironment {
            kind: "O".into(),
            center: Vector3::new(0.1, -0.2, 0.05),
            neighbours: vec![neighbour(0.9, 0.3, -0.4, 0), neighbour(-0.7, 0.6, 0.5, 0), neighbour(1.5, -1.1, 1.9, 1)],
        }
    }

    #[test]
    fn features_have_one_column_per_neighbour() {
        let enc = GeometricEncoder::new(2, 4.0, 10, &[8], 6);
        let params: Vec<f64> = (0..enc.num_params()).map(|i| (i % 5) as f64 * 0.2 - 0.4).collect();
        let edges = enc.encode(&environment(), &params).unwrap();
        assert_eq!(edges.len(), 3);
        assert_eq!(edges.harmonics.shape(), (9, 3));
        assert_eq!(edges.weights.shape(), (6, 3));
        assert!((edges.harmonics_of(1)[0] - 1.0).abs() < 1e-14);
    }

    #[test]
    fn coincident_neighbour_is_an_error() {
        let enc = GeometricEncoder::new(1, 4.0, 4, &[4], 2);
        let mut env = environment();
        env.neighbours[2].position = env.center;
        let params = vec![0.1; enc.num_params()];
        assert!(matches!(enc.encode(&env, &params), Err(PaoError::CoincidentAtoms { index: 2 })));
    }

    #[test]
    fn edge_gradients_match_finite_differences() {
        let enc = GeometricEncoder::new(2, 4.0, 6, &[5], 4);
        let params: Vec<f64> = (0..enc.num_params()).map(|i| ((i * 7) % 11) as f64 * 0.1 - 0.5).collect();
        let seed_sh = DMatrix::from_fn(9, 3, |i, j| ((i + 2 * j) % 4) as f64 - 1.5);
        let seed_w = DMatrix::from_fn(4, 3, |i, j| ((3 * i + j) % 5) as f64 - 2.0);
        let objective = |env: &AtomEnvironment| {
            let edges = enc.encode(env, &params).unwrap();
            edges.harmonics.component_mul(&seed_sh).sum() + edges.weights.component_mul(&seed_w).sum()
        };

        let env = environment();
        let edges = enc.encode(&env, &params).unwrap();
        let (_, grads) = enc.backward(&edges, &params, &seed_sh, &seed_w);
        let h = 1e-6;
        for e in 0..3 {
            for axis in 0..3 {
                let mut plus = env.clone();
                let mut minus = env.clone();
                plus.neighbours[e].position[axis] += h;
                minus.neighbours[e].position[axis] -= h;
                let fd = (objective(&plus) - objective(&minus)) / (2.0 * h);
                assert!((fd - grads[e][axis]).abs() < 1e-6, "edge {e} axis {axis}: {fd} vs {}", grads[e][axis]);
            }
        }
    }
}
