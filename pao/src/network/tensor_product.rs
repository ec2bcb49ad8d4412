//! Fully connected tensor product between two irreps lists.
//!
//! Every parity-admissible triple `(in1, in2) -> out` is a path. A path
//! mixes all `mul1 * mul2` input pairs into all `mul_out` output copies with
//! one weight each, coupling through `sqrt(2l_out + 1)` times the normalised
//! 3j tensor. Paths into the same output entry share the normalisation
//! `1 / sqrt(sum mul1 * mul2)`.

use angular::{wigner_3j, Irreps, Tensor3};
use nalgebra::DVector;

#[derive(Debug, Clone)]
struct Path {
    in1: usize,
    in2: usize,
    out: usize,
    // multiplicities of the three entries
    muls: (usize, usize, usize),
    weight_offset: usize,
    alpha: f64,
    coupling: Tensor3,
}

#[derive(Debug, Clone)]
pub struct TensorProduct {
    irreps_in1: Irreps,
    irreps_in2: Irreps,
    irreps_out: Irreps,
    offsets_in1: Vec<usize>,
    offsets_in2: Vec<usize>,
    offsets_out: Vec<usize>,
    paths: Vec<Path>,
    weight_numel: usize,
}

/// Gradients of a scalar objective with respect to the three operands.
#[derive(Debug, Clone)]
pub struct TensorProductGradients {
    pub in1: DVector<f64>,
    pub in2: DVector<f64>,
    pub weights: DVector<f64>,
}

impl TensorProduct {
    pub fn fully_connected(irreps_in1: &Irreps, irreps_in2: &Irreps, irreps_out: &Irreps) -> Self {
        let mut paths = Vec::new();
        let mut weight_numel = 0;
        let mut fan_in = vec![0usize; irreps_out.len()];
        for (i1, a) in irreps_in1.iter().enumerate() {
            for (i2, b) in irreps_in2.iter().enumerate() {
                for (io, c) in irreps_out.iter().enumerate() {
                    if a.ir.parity().product(b.ir.parity()) != c.ir.parity() {
                        continue;
                    }
                    let Some(tensor) = wigner_3j(a.ir.l, b.ir.l, c.ir.l) else {
                        continue;
                    };
                    paths.push(Path {
                        in1: i1,
                        in2: i2,
                        out: io,
                        muls: (a.mul, b.mul, c.mul),
                        weight_offset: weight_numel,
                        alpha: 0.0,
                        coupling: tensor.scaled((c.ir.dim() as f64).sqrt()),
                    });
                    weight_numel += a.mul * b.mul * c.mul;
                    fan_in[io] += a.mul * b.mul;
                }
            }
        }
        for path in paths.iter_mut() {
            path.alpha = 1.0 / (fan_in[path.out] as f64).sqrt();
        }

        TensorProduct {
            offsets_in1: irreps_in1.offsets(),
            offsets_in2: irreps_in2.offsets(),
            offsets_out: irreps_out.offsets(),
            irreps_in1: irreps_in1.clone(),
            irreps_in2: irreps_in2.clone(),
            irreps_out: irreps_out.clone(),
            paths,
            weight_numel,
        }
    }

    pub fn weight_numel(&self) -> usize {
        self.weight_numel
    }

    pub fn num_paths(&self) -> usize {
        self.paths.len()
    }

    pub fn irreps_out(&self) -> &Irreps {
        &self.irreps_out
    }

    pub fn forward(&self, x1: &[f64], x2: &[f64], weights: &[f64]) -> DVector<f64> {
        debug_assert_eq!(x1.len(), self.irreps_in1.dim());
        debug_assert_eq!(x2.len(), self.irreps_in2.dim());
        debug_assert_eq!(weights.len(), self.weight_numel);
        let mut out = DVector::zeros(self.irreps_out.dim());
        let mut t = Vec::new();
        for path in &self.paths {
            let (m1, m2, mo) = path.muls;
            let [d1, d2, d3] = path.coupling.shape();
            t.resize(d3, 0.0);
            for u in 0..m1 {
                let a = &x1[self.offsets_in1[path.in1] + u * d1..][..d1];
                for v in 0..m2 {
                    let b = &x2[self.offsets_in2[path.in2] + v * d2..][..d2];
                    contract(&path.coupling, a, b, &mut t);
                    for w in 0..mo {
                        let weight = weights[path.weight_offset + (u * m2 + v) * mo + w];
                        let base = self.offsets_out[path.out] + w * d3;
                        for k in 0..d3 {
                            out[base + k] += path.alpha * weight * t[k];
                        }
                    }
                }
            }
        }
        out
    }

    pub fn backward(
        &self,
        x1: &[f64],
        x2: &[f64],
        weights: &[f64],
        grad_out: &[f64],
    ) -> TensorProductGradients {
        let mut g1 = DVector::zeros(x1.len());
        let mut g2 = DVector::zeros(x2.len());
        let mut gw = DVector::zeros(self.weight_numel);
        let mut t = Vec::new();
        let mut s = Vec::new();
        for path in &self.paths {
            let (m1, m2, mo) = path.muls;
            let [d1, d2, d3] = path.coupling.shape();
            t.resize(d3, 0.0);
            s.resize(d3, 0.0);
            for u in 0..m1 {
                let o1 = self.offsets_in1[path.in1] + u * d1;
                let a = &x1[o1..o1 + d1];
                for v in 0..m2 {
                    let o2 = self.offsets_in2[path.in2] + v * d2;
                    let b = &x2[o2..o2 + d2];
                    contract(&path.coupling, a, b, &mut t);
                    s.iter_mut().for_each(|x| *x = 0.0);
                    for w in 0..mo {
                        let widx = path.weight_offset + (u * m2 + v) * mo + w;
                        let g = &grad_out[self.offsets_out[path.out] + w * d3..][..d3];
                        gw[widx] += path.alpha * g.iter().zip(&t).map(|(g, t)| g * t).sum::<f64>();
                        for k in 0..d3 {
                            s[k] += path.alpha * weights[widx] * g[k];
                        }
                    }
                    for i in 0..d1 {
                        for j in 0..d2 {
                            let cs: f64 = (0..d3).map(|k| path.coupling.get(i, j, k) * s[k]).sum();
                            g1[o1 + i] += cs * b[j];
                            g2[o2 + j] += cs * a[i];
                        }
                    }
                }
            }
        }
        TensorProductGradients {
            in1: g1,
            in2: g2,
            weights: gw,
        }
    }
}

/// `t[k] = sum_ij C[i, j, k] a[i] b[j]`
fn contract(coupling: &Tensor3, a: &[f64], b: &[f64], t: &mut [f64]) {
    let [_, _, d3] = coupling.shape();
    t.iter_mut().for_each(|x| *x = 0.0);
    let data = coupling.data();
    for (i, ai) in a.iter().enumerate() {
        for (j, bj) in b.iter().enumerate() {
            let ab = ai * bj;
            if ab == 0.0 {
                continue;
            }
            let base = (i * b.len() + j) * d3;
            for k in 0..d3 {
                t[k] += data[base + k] * ab;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{DMatrix, Matrix3, Rotation3, Vector3};

    fn sample(n: usize, shift: usize) -> Vec<f64> {
        (0..n).map(|i| (((i + shift) * 29 % 13) as f64 - 6.0) / 4.0).collect()
    }

    #[test]
    fn counts_paths_and_weights() {
        let species = Irreps::scalars(2);
        let sh = Irreps::spherical_harmonics(2);
        let mid = Irreps::uniform(5, 2);
        let tp = TensorProduct::fully_connected(&species, &sh, &mid);
        // 0e x l -> l only
        assert_eq!(tp.num_paths(), 3);
        assert_eq!(tp.weight_numel(), 3 * 2 * 5);
    }

    #[test]
    fn equivariant_under_rotation() {
        let mid = Irreps::uniform(2, 2);
        let out: Irreps = "2x0e + 1x1o + 2x2e + 1x3o + 1x4e".parse().unwrap();
        let tp = TensorProduct::fully_connected(&mid, &mid, &out);
        let x = sample(mid.dim(), 1);
        let w = sample(tp.weight_numel(), 5);

        let r: Matrix3<f64> = Rotation3::from_scaled_axis(Vector3::new(0.3, -1.1, 0.7)).into_inner();
        let d_in = mid.d_from_matrix(&r);
        let d_out = out.d_from_matrix(&r);
        let rx = &d_in * DVector::from_vec(x.clone());

        let lhs = tp.forward(rx.as_slice(), rx.as_slice(), &w);
        let rhs: DVector<f64> = &d_out * tp.forward(&x, &x, &w);
        assert!((lhs - rhs).amax() < 1e-10);
    }

    #[test]
    fn backward_matches_finite_differences() {
        let in1: Irreps = "2x0e + 1x1o".parse().unwrap();
        let in2 = Irreps::spherical_harmonics(2);
        let out: Irreps = "1x0e + 2x1o + 1x2e".parse().unwrap();
        let tp = TensorProduct::fully_connected(&in1, &in2, &out);
        let x1 = sample(in1.dim(), 0);
        let x2 = sample(in2.dim(), 3);
        let w = sample(tp.weight_numel(), 7);
        let seed = DMatrix::from_vec(out.dim(), 1, sample(out.dim(), 11));
        let objective = |x1: &[f64], x2: &[f64], w: &[f64]| tp.forward(x1, x2, w).dot(&seed.column(0));

        let grads = tp.backward(&x1, &x2, &w, seed.as_slice());
        let h = 1e-6;
        let fd = |f: &dyn Fn(f64) -> f64| (f(h) - f(-h)) / (2.0 * h);
        for i in 0..x1.len() {
            let d = fd(&|e| {
                let mut x = x1.clone();
                x[i] += e;
                objective(&x, &x2, &w)
            });
            assert!((d - grads.in1[i]).abs() < 1e-7);
        }
        for j in 0..x2.len() {
            let d = fd(&|e| {
                let mut x = x2.clone();
                x[j] += e;
                objective(&x1, &x, &w)
            });
            assert!((d - grads.in2[j]).abs() < 1e-7);
        }
        for k in (0..w.len()).step_by(3) {
            let d = fd(&|e| {
                let mut ww = w.clone();
                ww[k] += e;
                objective(&x1, &x2, &ww)
            });
            assert!((d - grads.weights[k]).abs() < 1e-7);
        }
    }
}
