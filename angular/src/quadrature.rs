//! One-dimensional rules and product grids on the unit sphere.

use itertools::iproduct;
use nalgebra::Vector3;
use std::f64::consts::PI;

/// Gauss–Legendre nodes and weights on `[a, b]`, nodes in ascending order.
pub fn gauss_legendre(n: usize, a: f64, b: f64) -> (Vec<f64>, Vec<f64>) {
    assert!(n >= 2);
    let m = (n + 1) / 2;
    let nn = n as f64;
    let xm = 0.5 * (b + a);
    let xl = 0.5 * (b - a);
    let mut x = vec![0.0_f64; n];
    let mut w = vec![0.0_f64; n];

    for i in 0..m {
        let mut z = (PI * (i as f64 + 0.75) / (nn + 0.5)).cos();
        loop {
            let (p1, p2) = legendre_pn(n, z);
            let pp = nn * (z * p1 - p2) / (z * z - 1.0);
            let z1 = z;
            z = z1 - p1 / pp;
            if (z - z1).abs() < 1e-15 {
                let (p1, p2) = legendre_pn(n, z);
                let pp = nn * (z * p1 - p2) / (z * z - 1.0);
                let wi = 2.0 * xl / ((1.0 - z * z) * pp * pp);
                x[i] = xm - xl * z;
                x[n - 1 - i] = xm + xl * z;
                w[i] = wi;
                w[n - 1 - i] = wi;
                break;
            }
        }
    }
    (x, w)
}

/// (P_n(z), P_{n-1}(z))
fn legendre_pn(n: usize, z: f64) -> (f64, f64) {
    let mut p1 = 1.0;
    let mut p2 = 0.0;
    for j in 1..=n {
        let p3 = p2;
        p2 = p1;
        p1 = ((2.0 * j as f64 - 1.0) * z * p2 - (j as f64 - 1.0) * p3) / j as f64;
    }
    (p1, p2)
}

/// Composite Simpson rule with `n` subintervals (rounded up to even).
pub fn simpson_integration<F>(f: F, a: f64, b: f64, n: usize) -> f64
where
    F: Fn(f64) -> f64,
{
    let n = if n % 2 == 0 { n.max(2) } else { n + 1 };
    let h = (b - a) / n as f64;

    let mut sum = f(a) + f(b);
    for i in 1..n {
        let x = a + i as f64 * h;
        sum += if i % 2 == 0 { 2.0 * f(x) } else { 4.0 * f(x) };
    }
    sum * h / 3.0
}

/// Product rule on the unit sphere: Gauss–Legendre in `z`, uniform in the
/// azimuth. Weights sum to `4π`.
#[derive(Debug, Clone)]
pub struct SphereQuadrature {
    points: Vec<Vector3<f64>>,
    weights: Vec<f64>,
}

impl SphereQuadrature {
    /// Grid integrating every polynomial of total degree `<= degree` exactly.
    pub fn exact_for_degree(degree: usize) -> Self {
        let n_z = degree / 2 + 2;
        let n_phi = degree + 2;
        let (zs, wz) = gauss_legendre(n_z, -1.0, 1.0);
        let dphi = 2.0 * PI / n_phi as f64;

        let (points, weights) = iproduct!(zs.iter().zip(&wz), 0..n_phi)
            .map(|((&z, &w), k)| {
                let phi = (k as f64 + 0.5) * dphi;
                let s = (1.0 - z * z).max(0.0).sqrt();
                (Vector3::new(s * phi.cos(), s * phi.sin(), z), w * dphi)
            })
            .unzip();
        SphereQuadrature { points, weights }
    }

    pub fn points(&self) -> &[Vector3<f64>] {
        &self.points
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn integrate<F: Fn(&Vector3<f64>) -> f64>(&self, f: F) -> f64 {
        self.points
            .iter()
            .zip(&self.weights)
            .map(|(p, w)| w * f(p))
            .sum()
    }
}
