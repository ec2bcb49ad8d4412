//! Smooth, compactly supported radial embedding of neighbour distances.

use nalgebra::DVector;
use std::f64::consts::E;

const SMOOTH_FINITE_SCALE: f64 = 1.14136 * E * E;

fn soft_unit_step(x: f64) -> f64 {
    if x > 0.0 {
        (-1.0 / x).exp()
    } else {
        0.0
    }
}

/// Bump supported on `(-1, 1)` and its derivative.
fn smooth_finite(d: f64) -> (f64, f64) {
    if d <= -1.0 || d >= 1.0 {
        return (0.0, 0.0);
    }
    let value = SMOOTH_FINITE_SCALE * soft_unit_step(d + 1.0) * soft_unit_step(1.0 - d);
    let slope = value * (1.0 / (d + 1.0).powi(2) - 1.0 / (1.0 - d).powi(2));
    (value, slope)
}

/// `num_basis` bumps centred strictly inside `(0, max_radius)`, each one
/// grid step wide; every basis function vanishes at and beyond the cutoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialEmbedding {
    max_radius: f64,
    centers: Vec<f64>,
    step: f64,
    scale: f64,
}

impl RadialEmbedding {
    pub fn new(max_radius: f64, num_basis: usize) -> Self {
        let step = max_radius / (num_basis + 1) as f64;
        RadialEmbedding {
            max_radius,
            centers: (1..=num_basis).map(|i| i as f64 * step).collect(),
            step,
            scale: (num_basis as f64).sqrt(),
        }
    }

    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    pub fn max_radius(&self) -> f64 {
        self.max_radius
    }

    /// Embedding of `distance` and its derivative with respect to `distance`.
    pub fn embed(&self, distance: f64) -> (DVector<f64>, DVector<f64>) {
        let mut values = DVector::zeros(self.len());
        let mut slopes = DVector::zeros(self.len());
        for (k, c) in self.centers.iter().enumerate() {
            let (v, s) = smooth_finite((distance - c) / self.step);
            values[k] = self.scale * v;
            slopes[k] = self.scale * s / self.step;
        }
        (values, slopes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vanishes_beyond_cutoff() {
        let emb = RadialEmbedding::new(4.0, 10);
        let (v, s) = emb.embed(4.0);
        assert!(v.iter().all(|x| *x == 0.0));
        assert!(s.iter().all(|x| *x == 0.0));
        let (v, _) = emb.embed(7.5);
        assert!(v.iter().all(|x| *x == 0.0));
        let (v, _) = emb.embed(1.3);
        assert!(v.iter().any(|x| *x > 0.0));
    }

    #[test]
    fn bump_peaks_at_one() {
        // scale makes the bump equal to ~1.14136 at its centre
        let (v, s) = smooth_finite(0.0);
        assert!((v - 1.14136).abs() < 1e-12);
        assert!(s.abs() < 1e-12);
    }

    #[test]
    fn derivative_matches_finite_differences() {
        let emb = RadialEmbedding::new(4.0, 10);
        let h = 1e-6;
        for d in [0.2, 1.05, 2.71, 3.9] {
            let (_, slope) = emb.embed(d);
            let (vp, _) = emb.embed(d + h);
            let (vm, _) = emb.embed(d - h);
            let fd = (vp - vm) / (2.0 * h);
            assert!((fd - slope).amax() < 1e-6, "d = {d}");
        }
    }
}
