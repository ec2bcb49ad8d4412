//! Auxiliary-matrix assembly from a model output vector, and its adjoint.

use crate::coupling::CouplingTable;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

/// Scatter `vector` into a symmetric `n x n` matrix following the table
/// enumeration. Every value is written to both `(r, c)` and `(c, r)`, so the
/// result is symmetric bit for bit.
pub fn assemble(table: &CouplingTable, vector: &DVector<f64>) -> DMatrix<f64> {
    debug_assert_eq!(vector.len(), table.vector_dim());
    let n = table.matrix_dim();
    let mut matrix = DMatrix::zeros(n, n);
    for entry in table.entries() {
        let Some(coefficients) = table.coefficients(&entry.key) else {
            continue;
        };
        let block = coefficients.contract_last(&vector.as_slice()[entry.vector.clone()]);
        let (r0, c0) = (entry.rows.start, entry.cols.start);
        if entry.is_diagonal() {
            for a in 0..block.nrows() {
                for b in a..block.ncols() {
                    let v = block[(a, b)];
                    matrix[(r0 + a, c0 + b)] += v;
                    if a != b {
                        matrix[(r0 + b, c0 + a)] += v;
                    }
                }
            }
        } else {
            for a in 0..block.nrows() {
                for b in 0..block.ncols() {
                    let v = block[(a, b)];
                    matrix[(r0 + a, c0 + b)] += v;
                    matrix[(c0 + b, r0 + a)] += v;
                }
            }
        }
    }
    matrix
}

pub fn assemble_batch(table: &CouplingTable, vectors: &[DVector<f64>]) -> Vec<DMatrix<f64>> {
    vectors.par_iter().map(|v| assemble(table, v)).collect()
}

/// Gradient with respect to the output vector given the gradient `grad`
/// with respect to the assembled matrix.
pub fn assemble_adjoint(table: &CouplingTable, grad: &DMatrix<f64>) -> DVector<f64> {
    let mut out = DVector::zeros(table.vector_dim());
    for entry in table.entries() {
        let Some(coefficients) = table.coefficients(&entry.key) else {
            continue;
        };
        let [d1, d2, d3] = coefficients.shape();
        let (r0, c0) = (entry.rows.start, entry.cols.start);
        let diagonal = entry.is_diagonal();
        for a in 0..d1 {
            let b_start = if diagonal { a } else { 0 };
            for b in b_start..d2 {
                let g = if diagonal && a == b {
                    grad[(r0 + a, c0 + b)]
                } else if diagonal {
                    grad[(r0 + a, c0 + b)] + grad[(r0 + b, c0 + a)]
                } else {
                    grad[(r0 + a, c0 + b)] + grad[(c0 + b, r0 + a)]
                };
                for k in 0..d3 {
                    out[entry.vector.start + k] += coefficients.get(a, b, k) * g;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use angular::Irreps;

    fn table() -> CouplingTable {
        CouplingTable::build(&"2x0e + 2x1o + 1x2e".parse::<Irreps>().unwrap()).unwrap()
    }

    fn vector(n: usize) -> DVector<f64> {
        DVector::from_fn(n, |i, _| ((i * 7 + 3) % 11) as f64 / 5.0 - 1.0)
    }

    #[test]
    fn symmetric_bit_for_bit() {
        let table = table();
        let a = assemble(&table, &vector(table.vector_dim()));
        assert_eq!(a.nrows(), 13);
        for i in 0..13 {
            for j in 0..13 {
                assert_eq!(a[(i, j)].to_bits(), a[(j, i)].to_bits());
            }
        }
    }

    #[test]
    fn scalar_entry_fills_its_block() {
        let spec: Irreps = "1x0e + 1x1o".parse().unwrap();
        let table = CouplingTable::build(&spec).unwrap();
        let mut v = DVector::zeros(table.vector_dim());
        // (0,0)->0 occupies index 0
        v[0] = 2.5;
        let a = assemble(&table, &v);
        assert!((a[(0, 0)] - 2.5).abs() < 1e-14);
        assert!(a.iter().skip(1).all(|x| x.abs() < 1e-14));
    }

    #[test]
    fn adjoint_matches_inner_product() {
        let table = table();
        let n = table.matrix_dim();
        let v = vector(table.vector_dim());
        let g = DMatrix::from_fn(n, n, |i, j| ((i * 5 + j * 3) % 7) as f64 - 3.0);
        // <A(v), G> = <v, A*(G)> because assembly is linear
        let lhs = assemble(&table, &v).component_mul(&g).sum();
        let rhs = v.dot(&assemble_adjoint(&table, &g));
        assert!((lhs - rhs).abs() < 1e-10);
    }

    #[test]
    fn batch_matches_single() {
        let table = table();
        let vs = vec![vector(table.vector_dim()), vector(table.vector_dim()) * 2.0];
        let batch = assemble_batch(&table, &vs);
        assert_eq!(batch[1], assemble(&table, &vs[1]));
    }
}
