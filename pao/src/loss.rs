//! Projector-matching loss between predicted and reference subspaces.

use crate::error::{PaoError, Result};
use nalgebra::DMatrix;

fn check_shapes(prediction: &DMatrix<f64>, label: &DMatrix<f64>) -> Result<()> {
    if prediction.shape() != label.shape() {
        return Err(PaoError::DimensionMismatch(format!(
            "prediction {:?} vs label {:?}",
            prediction.shape(),
            label.shape()
        )));
    }
    Ok(())
}

/// Mean squared difference of `PᵀP` and `LᵀL`.
pub fn ortho_projector_loss(prediction: &DMatrix<f64>, label: &DMatrix<f64>) -> Result<f64> {
    check_shapes(prediction, label)?;
    let n = prediction.ncols() as f64;
    let diff = prediction.tr_mul(prediction) - label.tr_mul(label);
    Ok(diff.norm_squared() / (n * n))
}

/// Mean over samples of equally shaped pairs.
pub fn ortho_projector_loss_batch(predictions: &[DMatrix<f64>], labels: &[&DMatrix<f64>]) -> Result<f64> {
    if predictions.len() != labels.len() || predictions.is_empty() {
        return Err(PaoError::DimensionMismatch(format!(
            "{} predictions for {} labels",
            predictions.len(),
            labels.len()
        )));
    }
    let mut total = 0.0;
    for (p, l) in predictions.iter().zip(labels) {
        total += ortho_projector_loss(p, l)?;
    }
    Ok(total / predictions.len() as f64)
}

/// Gradient of [`ortho_projector_loss`] with respect to the prediction,
/// `(4 / n²) P (PᵀP - LᵀL)`.
pub fn ortho_projector_loss_gradient(prediction: &DMatrix<f64>, label: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    check_shapes(prediction, label)?;
    let n = prediction.ncols() as f64;
    let diff = prediction.tr_mul(prediction) - label.tr_mul(label);
    Ok(prediction * diff * (4.0 / (n * n)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basis() -> DMatrix<f64> {
        let s = 0.5f64.sqrt();
        DMatrix::from_row_slice(2, 4, &[s, s, 0.0, 0.0, 0.0, 0.0, 0.6, 0.8])
    }

    #[test]
    fn zero_for_identical_subspaces() {
        let p = basis();
        assert_eq!(ortho_projector_loss(&p, &p).unwrap(), 0.0);

        // rotate within the row space
        let (c, s) = (0.3f64.cos(), 0.3f64.sin());
        let rotation = DMatrix::from_row_slice(2, 2, &[c, -s, s, c]);
        let q = &rotation * &p;
        assert!(ortho_projector_loss(&p, &q).unwrap() < 1e-30);
        // sign flips too
        assert!(ortho_projector_loss(&p, &(-&p)).unwrap() < 1e-30);
    }

    #[test]
    fn positive_for_different_subspaces() {
        let p = basis();
        let l = DMatrix::from_row_slice(2, 4, &[1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        assert!(ortho_projector_loss(&p, &l).unwrap() > 0.01);
        assert!(ortho_projector_loss(&p, &DMatrix::zeros(3, 4)).is_err());
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let p = basis();
        let l = DMatrix::from_row_slice(2, 4, &[0.0, 0.6, 0.8, 0.0, 1.0, 0.0, 0.0, 0.0]);
        let g = ortho_projector_loss_gradient(&p, &l).unwrap();
        let h = 1e-6;
        for i in 0..2 {
            for j in 0..4 {
                let mut plus = p.clone();
                let mut minus = p.clone();
                plus[(i, j)] += h;
                minus[(i, j)] -= h;
                let fd = (ortho_projector_loss(&plus, &l).unwrap() - ortho_projector_loss(&minus, &l).unwrap()) / (2.0 * h);
                assert!((fd - g[(i, j)]).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn batch_is_the_mean() {
        let p = basis();
        let l = DMatrix::from_row_slice(2, 4, &[1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        let single = ortho_projector_loss(&p, &l).unwrap();
        let batch = ortho_projector_loss_batch(&[p.clone(), l.clone()], &[&l, &l]).unwrap();
        assert!((batch - single / 2.0).abs() < 1e-15);
    }
}
