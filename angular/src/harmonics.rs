//! Real spherical harmonics, component normalisation.
//!
//! Degree `l` occupies indices `l*l .. (l+1)*(l+1)`, ordered `m = -l ..= l`.
//! Normalisation is chosen so that `sum_m Y_lm(u)^2 = 2l + 1` for unit `u`,
//! and the polar axis is `y`: the three `l = 1` functions are `sqrt(3) (x, y, z)`.
//! Inputs are normalised internally, gradients are taken with respect to the
//! raw (unnormalised) vector.

use nalgebra::{DVector, Matrix3, Vector3};
use num_complex::Complex64;

#[derive(Debug, Clone)]
pub struct SphericalHarmonics {
    lmax: u32,
    pub values: Vec<f64>,
    pub gradients: Vec<Vector3<f64>>,
    // derivatives d^m P_l / dz^m, row-major (l, m)
    legendre: Vec<f64>,
    powers: Vec<Complex64>,
}

impl SphericalHarmonics {
    pub fn new(lmax: u32) -> Self {
        let n = ((lmax + 1) * (lmax + 1)) as usize;
        let stride = lmax as usize + 1;
        SphericalHarmonics {
            lmax,
            values: vec![0.0; n],
            gradients: vec![Vector3::zeros(); n],
            legendre: vec![0.0; stride * stride],
            powers: vec![Complex64::new(0.0, 0.0); stride],
        }
    }

    pub fn lmax(&self) -> u32 {
        self.lmax
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Components of degree `l`.
    pub fn degree(&self, l: u32) -> &[f64] {
        let start = (l * l) as usize;
        &self.values[start..start + 2 * l as usize + 1]
    }

    fn q(&self, l: usize, m: usize) -> f64 {
        if m > l {
            0.0
        } else {
            self.legendre[l * (self.lmax as usize + 1) + m]
        }
    }

    /// Evaluate at `r`. For the zero vector only the `l = 0` component survives.
    pub fn compute(&mut self, r: &Vector3<f64>, gradients: bool) {
        let norm = r.norm();
        self.values.iter_mut().for_each(|v| *v = 0.0);
        self.gradients.iter_mut().for_each(|g| *g = Vector3::zeros());
        self.values[0] = 1.0;
        if norm == 0.0 {
            return;
        }
        let u = r / norm;
        // frame with the polar axis along y
        let (xp, yp, zp) = (u.z, u.x, u.y);

        let lmax = self.lmax as usize;
        let stride = lmax + 1;
        for m in 0..=lmax {
            let qmm = if m == 0 {
                1.0
            } else {
                (2 * m - 1) as f64 * self.legendre[(m - 1) * stride + m - 1]
            };
            self.legendre[m * stride + m] = qmm;
            if m + 1 <= lmax {
                self.legendre[(m + 1) * stride + m] = (2 * m + 1) as f64 * zp * qmm;
            }
            for l in m + 2..=lmax {
                let a = self.legendre[(l - 1) * stride + m];
                let b = self.legendre[(l - 2) * stride + m];
                self.legendre[l * stride + m] =
                    ((2 * l - 1) as f64 * zp * a - (l + m - 1) as f64 * b) / (l - m) as f64;
            }
        }

        let w = Complex64::new(xp, yp);
        self.powers[0] = Complex64::new(1.0, 0.0);
        for k in 1..=lmax {
            self.powers[k] = self.powers[k - 1] * w;
        }

        for l in 0..=lmax {
            let base = l * l + l;
            for k in 0..=l {
                let c = normalisation(l, k);
                let q = self.q(l, k);
                let dq = self.q(l, k + 1);
                if k == 0 {
                    self.values[base] = c * q;
                    if gradients {
                        self.gradients[base] = Vector3::new(0.0, 0.0, c * dq);
                    }
                    continue;
                }
                let pk = self.powers[k];
                let pk1 = self.powers[k - 1] * k as f64;
                self.values[base + k] = c * q * pk.re;
                self.values[base - k] = c * q * pk.im;
                if gradients {
                    self.gradients[base + k] =
                        Vector3::new(c * q * pk1.re, -c * q * pk1.im, c * dq * pk.re);
                    self.gradients[base - k] =
                        Vector3::new(c * q * pk1.im, c * q * pk1.re, c * dq * pk.im);
                }
            }
        }

        if gradients {
            let projector = (Matrix3::identity() - u * u.transpose()) / norm;
            for g in self.gradients.iter_mut() {
                // back from the (z, x, y) frame
                let gu = Vector3::new(g.y, g.z, g.x);
                *g = projector * gu;
            }
        }
    }
}

/// sqrt((2l+1) (l-m)!/(l+m)!), times sqrt(2) for m != 0.
fn normalisation(l: usize, m: usize) -> f64 {
    let ratio: f64 = (l - m + 1..=l + m).map(|k| 1.0 / k as f64).product();
    let c = ((2 * l + 1) as f64 * ratio).sqrt();
    if m == 0 {
        c
    } else {
        c * std::f64::consts::SQRT_2
    }
}

/// All components up to `lmax` for a single vector.
pub fn spherical_harmonics(lmax: u32, r: &Vector3<f64>) -> DVector<f64> {
    let mut sh = SphericalHarmonics::new(lmax);
    sh.compute(r, false);
    DVector::from_vec(sh.values)
}
