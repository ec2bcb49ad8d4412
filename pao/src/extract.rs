//! Basis extraction: dominant eigenvectors of the auxiliary matrix.
//!
//! The backward pass uses the first-order perturbation formula
//! `dq_j = sum_{i != j} q_i (q_i^T dA q_j) / (λ_j - λ_i)`, valid only while the
//! selected eigenvalues are separated from the rest. When the gap at the
//! selection boundary closes, the basis is not unique and its gradient blows up;
//! that case is logged, not patched.

use crate::error::{PaoError, Result};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::warn;

/// Relative boundary gap below which the selection is reported as degenerate.
pub const DEGENERACY_TOLERANCE: f64 = 1e-8;

#[derive(Debug, Clone)]
pub struct Eigenbasis {
    /// All eigenvalues, descending.
    pub eigenvalues: DVector<f64>,
    /// Matching eigenvectors as columns, signs aligned.
    pub eigenvectors: DMatrix<f64>,
    pub basis_size: usize,
}

impl Eigenbasis {
    /// Predicted basis, `basis_size` orthonormal rows.
    pub fn basis(&self) -> DMatrix<f64> {
        self.eigenvectors.columns(0, self.basis_size).transpose()
    }

    /// `λ_{m-1} - λ_m`, `None` when every eigenvector is selected.
    pub fn boundary_gap(&self) -> Option<f64> {
        let m = self.basis_size;
        (m < self.eigenvalues.len()).then(|| self.eigenvalues[m - 1] - self.eigenvalues[m])
    }
}

/// Flip every column so that its largest-magnitude entry is positive.
pub fn align_eigenvectors(vectors: &mut DMatrix<f64>) {
    for mut column in vectors.column_iter_mut() {
        let pivot = column
            .iter()
            .copied()
            .fold(0.0_f64, |acc, x| if x.abs() > acc.abs() { x } else { acc });
        if pivot < 0.0 {
            column.neg_mut();
        }
    }
}

pub fn extract_basis(matrix: &DMatrix<f64>, basis_size: usize) -> Result<Eigenbasis> {
    let n = matrix.nrows();
    if matrix.ncols() != n || basis_size == 0 || basis_size > n {
        return Err(PaoError::DimensionMismatch(format!(
            "cannot select {} eigenvectors of a {}x{} matrix",
            basis_size,
            n,
            matrix.ncols()
        )));
    }
    if matrix.iter().any(|x| !x.is_finite()) {
        return Err(PaoError::NonFiniteMatrix);
    }

    let eigen = matrix
        .clone()
        .try_symmetric_eigen(f64::EPSILON, 10_000)
        .ok_or(PaoError::EigenNonConvergence { dim: n })?;

    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
    let eigenvalues = DVector::from_iterator(n, indices.iter().map(|&i| eigen.eigenvalues[i]));
    let mut eigenvectors = eigen.eigenvectors.select_columns(&indices);
    align_eigenvectors(&mut eigenvectors);

    let result = Eigenbasis {
        eigenvalues,
        eigenvectors,
        basis_size,
    };
    if let Some(gap) = result.boundary_gap() {
        let scale = result.eigenvalues[basis_size - 1].abs().max(1.0);
        if gap < DEGENERACY_TOLERANCE * scale {
            warn!(
                "eigenvalue gap {:.3e} at basis size {}: predicted basis is not unique",
                gap, basis_size
            );
        }
    }
    Ok(result)
}

pub fn extract_batch(matrices: &[DMatrix<f64>], basis_size: usize) -> Vec<Result<Eigenbasis>> {
    matrices
        .par_iter()
        .map(|m| extract_basis(m, basis_size))
        .collect()
}

/// Gradient with respect to the (symmetric) input matrix, given the gradient
/// with respect to the predicted basis rows.
pub fn eigenbasis_adjoint(eigen: &Eigenbasis, grad_basis: &DMatrix<f64>) -> DMatrix<f64> {
    let n = eigen.eigenvalues.len();
    let m = eigen.basis_size;
    let q = &eigen.eigenvectors;
    let lambda = &eigen.eigenvalues;

    // K_ij = (q_i . gbar_j) / (λ_j - λ_i), nonzero only for selected j
    let mut k = DMatrix::zeros(n, n);
    for j in 0..m {
        let gbar = grad_basis.row(j).transpose();
        for i in 0..n {
            if i == j {
                continue;
            }
            let gap = lambda[j] - lambda[i];
            k[(i, j)] = q.column(i).dot(&gbar) / gap;
        }
    }
    let a = q * k * q.transpose();
    (&a + a.transpose()) * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_matrix() -> DMatrix<f64> {
        let b = DMatrix::from_fn(6, 6, |i, j| ((i * 3 + j * 5) % 7) as f64 * 0.3 - 0.8);
        let sym = &b + b.transpose();
        sym + DMatrix::from_diagonal(&DVector::from_fn(6, |i, _| i as f64))
    }

    #[test]
    fn selects_largest_eigenvalues() {
        let a = test_matrix();
        let eig = extract_basis(&a, 3).unwrap();
        assert!(eig.eigenvalues.as_slice().windows(2).all(|w| w[0] >= w[1]));
        let basis = eig.basis();
        assert_eq!(basis.shape(), (3, 6));
        let gram = &basis * basis.transpose();
        assert!((gram - DMatrix::identity(3, 3)).amax() < 1e-10);
        for j in 0..3 {
            let q = eig.eigenvectors.column(j);
            assert!((&a * q - q * eig.eigenvalues[j]).amax() < 1e-9);
        }
    }

    #[test]
    fn signs_are_aligned() {
        let eig = extract_basis(&test_matrix(), 2).unwrap();
        for column in eig.eigenvectors.column_iter() {
            let pivot = column.iter().copied().fold(0.0_f64, |a, x| if x.abs() > a.abs() { x } else { a });
            assert!(pivot > 0.0);
        }
    }

    #[test]
    fn rejects_bad_requests() {
        let a = test_matrix();
        assert!(matches!(extract_basis(&a, 0), Err(PaoError::DimensionMismatch(_))));
        assert!(matches!(extract_basis(&a, 7), Err(PaoError::DimensionMismatch(_))));
        let mut bad = a.clone();
        bad[(1, 2)] = f64::NAN;
        bad[(2, 1)] = f64::NAN;
        assert!(matches!(extract_basis(&bad, 2), Err(PaoError::NonFiniteMatrix)));
    }

    #[test]
    fn adjoint_matches_finite_differences() {
        let a = test_matrix();
        let m = 2;
        let seed = DMatrix::from_fn(m, 6, |i, j| ((i + 2 * j) % 5) as f64 - 2.0);
        let objective = |mat: &DMatrix<f64>| extract_basis(mat, m).unwrap().basis().component_mul(&seed).sum();
        let eig = extract_basis(&a, m).unwrap();
        let grad = eigenbasis_adjoint(&eig, &seed);

        let h = 1e-6;
        // symmetric perturbation E_ij + E_ji
        for (i, j) in [(0, 0), (1, 3), (2, 5), (4, 4)] {
            let mut plus = a.clone();
            let mut minus = a.clone();
            plus[(i, j)] += h;
            minus[(i, j)] -= h;
            if i != j {
                plus[(j, i)] += h;
                minus[(j, i)] -= h;
            }
            let fd = (objective(&plus) - objective(&minus)) / (2.0 * h);
            let analytic = if i == j { grad[(i, i)] } else { grad[(i, j)] + grad[(j, i)] };
            assert!((fd - analytic).abs() < 1e-6, "({i}, {j}): {fd} vs {analytic}");
        }
    }

    #[test]
    fn batch_reports_failures_per_sample() {
        let good = test_matrix();
        let mut bad = good.clone();
        bad[(0, 0)] = f64::INFINITY;
        let results = extract_batch(&[good, bad], 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
