//! Real Wigner D-matrices in the spherical-harmonic basis.

use crate::harmonics::SphericalHarmonics;
use crate::irreps::Irreps;
use crate::quadrature::SphereQuadrature;
use nalgebra::{DMatrix, Matrix3};
use std::f64::consts::PI;

/// `D_l(R)` with `Y_l(R r) = D_l(R) Y_l(r)`, obtained by projecting the rotated
/// harmonics back onto the unrotated ones. Orthogonal for any orthogonal `R`.
pub fn wigner_d(l: u32, rotation: &Matrix3<f64>) -> DMatrix<f64> {
    let dim = 2 * l as usize + 1;
    let grid = SphereQuadrature::exact_for_degree(2 * l as usize);
    let mut rotated = SphericalHarmonics::new(l);
    let mut plain = SphericalHarmonics::new(l);
    let mut d = DMatrix::zeros(dim, dim);

    for (p, w) in grid.points().iter().zip(grid.weights()) {
        rotated.compute(&(rotation * p), false);
        plain.compute(p, false);
        let (ya, yb) = (rotated.degree(l), plain.degree(l));
        for m in 0..dim {
            for n in 0..dim {
                d[(m, n)] += w * ya[m] * yb[n];
            }
        }
    }
    d / (4.0 * PI)
}

impl Irreps {
    /// Block-diagonal representation of `rotation` on a feature vector of these irreps.
    pub fn d_from_matrix(&self, rotation: &Matrix3<f64>) -> DMatrix<f64> {
        let n = self.dim();
        let mut out = DMatrix::zeros(n, n);
        let mut offset = 0;
        for item in self {
            let block = wigner_d(item.ir.l, rotation);
            let d = item.ir.dim();
            for _ in 0..item.mul {
                out.view_mut((offset, offset), (d, d)).copy_from(&block);
                offset += d;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harmonics::spherical_harmonics;
    use nalgebra::{Quaternion, UnitQuaternion, Vector3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_rotation(rng: &mut StdRng) -> Matrix3<f64> {
        let q = Quaternion::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        UnitQuaternion::from_quaternion(q).to_rotation_matrix().into_inner()
    }

    #[test]
    fn degree_one_is_the_rotation_itself() {
        let mut rng = StdRng::seed_from_u64(1);
        let r = random_rotation(&mut rng);
        let d = wigner_d(1, &r);
        for i in 0..3 {
            for j in 0..3 {
                assert!((d[(i, j)] - r[(i, j)]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn rotates_harmonics() {
        let mut rng = StdRng::seed_from_u64(2);
        let r = random_rotation(&mut rng);
        let v = Vector3::new(0.2, -0.7, 0.4);
        let lmax = 4;
        let irreps = Irreps::spherical_harmonics(lmax);
        let d = irreps.d_from_matrix(&r);
        let lhs = spherical_harmonics(lmax, &(r * v));
        let rhs = &d * spherical_harmonics(lmax, &v);
        assert!((lhs - rhs).amax() < 1e-10);
    }

    #[test]
    fn orthogonal_and_homomorphic() {
        let mut rng = StdRng::seed_from_u64(3);
        let (r1, r2) = (random_rotation(&mut rng), random_rotation(&mut rng));
        for l in 0..=3 {
            let d1 = wigner_d(l, &r1);
            let d2 = wigner_d(l, &r2);
            let d12 = wigner_d(l, &(r1 * r2));
            let dim = 2 * l as usize + 1;
            assert!((&d1 * d1.transpose() - DMatrix::identity(dim, dim)).amax() < 1e-10);
            assert!((&d1 * &d2 - d12).amax() < 1e-10);
        }
    }

    #[test]
    fn inversion_acts_by_parity() {
        let irreps: Irreps = "2x0e + 1x1o + 1x2e".parse().unwrap();
        let d = irreps.d_from_matrix(&(-Matrix3::identity()));
        let expected = [1.0, 1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        for (i, e) in expected.iter().enumerate() {
            assert!((d[(i, i)] - e).abs() < 1e-12);
        }
    }
}
