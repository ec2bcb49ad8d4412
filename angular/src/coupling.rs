//! Real coupling tensors between three irreps.
//!
//! For natural-parity irreps the invariant tensor coupling degrees
//! `(l1, l2, l3)` is proportional to the real Gaunt integral
//! `∫ Y_{l1} Y_{l2} Y_{l3} dΩ`. It is evaluated on an exact sphere rule and
//! normalised to unit Frobenius norm, which makes it the real Wigner-3j tensor
//! in the basis of [`crate::harmonics`].

use crate::harmonics::SphericalHarmonics;
use crate::quadrature::SphereQuadrature;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Dense rank-3 tensor, row-major with shape `(d1, d2, d3)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor3 {
    shape: [usize; 3],
    data: Vec<f64>,
}

impl Tensor3 {
    pub fn zeros(shape: [usize; 3]) -> Self {
        Tensor3 {
            shape,
            data: vec![0.0; shape[0] * shape[1] * shape[2]],
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (i * self.shape[1] + j) * self.shape[2] + k
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> f64 {
        self.data[self.index(i, j, k)]
    }

    pub fn set(&mut self, i: usize, j: usize, k: usize, value: f64) {
        let idx = self.index(i, j, k);
        self.data[idx] = value;
    }

    /// Element at the centre of every axis, `(d1/2, d2/2, d3/2)`.
    pub fn central(&self) -> f64 {
        self.get(self.shape[0] / 2, self.shape[1] / 2, self.shape[2] / 2)
    }

    pub fn norm(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    pub fn scaled(mut self, factor: f64) -> Self {
        self.data.iter_mut().for_each(|v| *v *= factor);
        self
    }

    /// `out[i, j] = sum_k t[i, j, k] v[k]`.
    pub fn contract_last(&self, v: &[f64]) -> DMatrix<f64> {
        let [d1, d2, d3] = self.shape;
        assert_eq!(v.len(), d3);
        DMatrix::from_fn(d1, d2, |i, j| {
            let base = self.index(i, j, 0);
            self.data[base..base + d3]
                .iter()
                .zip(v)
                .map(|(t, x)| t * x)
                .sum()
        })
    }
}

pub fn triangle(l1: u32, l2: u32, l3: u32) -> bool {
    l3 >= l1.abs_diff(l2) && l3 <= l1 + l2
}

/// Real Wigner-3j tensor of shape `(2l1+1, 2l2+1, 2l3+1)`.
///
/// `None` when the triangle condition fails or `l1 + l2 + l3` is odd; such
/// triples admit no invariant between natural-parity irreps.
pub fn wigner_3j(l1: u32, l2: u32, l3: u32) -> Option<Tensor3> {
    if !triangle(l1, l2, l3) || (l1 + l2 + l3) % 2 == 1 {
        return None;
    }
    let shape = [2 * l1 as usize + 1, 2 * l2 as usize + 1, 2 * l3 as usize + 1];
    let grid = SphereQuadrature::exact_for_degree((l1 + l2 + l3) as usize);
    let mut sh = SphericalHarmonics::new(l1.max(l2).max(l3));
    let mut t = Tensor3::zeros(shape);

    for (p, w) in grid.points().iter().zip(grid.weights()) {
        sh.compute(p, false);
        let (y1, y2, y3) = (sh.degree(l1), sh.degree(l2), sh.degree(l3));
        for (i, a) in y1.iter().enumerate() {
            for (j, b) in y2.iter().enumerate() {
                let ab = a * b;
                let base = t.index(i, j, 0);
                for (k, c) in y3.iter().enumerate() {
                    t.data[base + k] += w * (ab * c);
                }
            }
        }
    }

    let norm = t.norm();
    if norm < 1e-12 {
        return None;
    }
    Some(t.scaled(1.0 / norm))
}
