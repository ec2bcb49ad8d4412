//! Whole-structure prediction: one model per kind fills every Xblock of a
//! `.pao` file.

use crate::dataset::{label_from_xblock, AtomEnvironment};
use crate::error::{PaoError, Result};
use crate::io::PaoFile;
use crate::loss::ortho_projector_loss;
use crate::model::PaoModel;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Check that every kind of `file` has a model with the same species list
/// and basis sizes.
fn check_models(file: &PaoFile, models: &BTreeMap<String, PaoModel>) -> Result<()> {
    let mut species = None;
    for record in &file.kinds {
        let model = models
            .get(&record.name)
            .ok_or_else(|| PaoError::UnknownKind(record.name.clone()))?;
        if !model.kind().matches(record) {
            return Err(PaoError::InvalidKind {
                kind: record.name.clone(),
                message: format!(
                    "model basis {} -> {} does not match the file ({} -> {})",
                    model.kind().prim_basis_size,
                    model.kind().pao_basis_size,
                    record.prim_basis_size,
                    record.pao_basis_size
                ),
            });
        }
        match species {
            None => species = Some(model.species()),
            Some(known) if known != model.species() => {
                return Err(PaoError::Config(format!(
                    "model for kind {} was trained on different species",
                    record.name
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Copy of `file` whose Xblocks are the predicted bases.
pub fn predict_pao_file(file: &PaoFile, models: &BTreeMap<String, PaoModel>) -> Result<PaoFile> {
    check_models(file, models)?;
    let xblocks = (0..file.atoms.len())
        .into_par_iter()
        .map(|i| {
            let model = models
                .get(&file.atoms[i].kind)
                .ok_or_else(|| PaoError::UnknownKind(file.atoms[i].kind.clone()))?;
            let env = AtomEnvironment::from_file(file, i, model.species())?;
            model.predict(&env)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(PaoFile {
        xblocks,
        ..file.clone()
    })
}

/// Mean projector loss per kind between the Xblocks of `predicted` and the
/// reference blocks of `reference`.
pub fn prediction_losses(predicted: &PaoFile, reference: &PaoFile) -> Result<BTreeMap<String, f64>> {
    if predicted.xblocks.len() != reference.xblocks.len() || predicted.atoms.len() != reference.atoms.len() {
        return Err(PaoError::DimensionMismatch(format!(
            "{} predicted blocks for {} reference blocks",
            predicted.xblocks.len(),
            reference.xblocks.len()
        )));
    }
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for ((atom, p), x) in predicted.atoms.iter().zip(&predicted.xblocks).zip(&reference.xblocks) {
        let loss = ortho_projector_loss(p, &label_from_xblock(x)?)?;
        let entry = sums.entry(atom.kind.clone()).or_insert((0.0, 0));
        entry.0 += loss;
        entry.1 += 1;
    }
    Ok(sums
        .into_iter()
        .map(|(kind, (total, n))| (kind, total / n as f64))
        .collect())
}
