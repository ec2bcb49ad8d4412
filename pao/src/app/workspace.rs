use color_eyre::eyre::{eyre, Result, WrapErr};
use pao::config::Config;
use pao::dataset::{collect_training_paths, samples_from_paths, Dataset, SpeciesEncoder};
use pao::AtomicKind;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Everything loaded from disk before training starts.
pub struct TrainingWorkspace {
    pub species: SpeciesEncoder,
    pub kinds: BTreeMap<String, AtomicKind>,
    pub dataset: Dataset,
}

impl TrainingWorkspace {
    pub fn load(config: &Config) -> Result<Self> {
        let paths = training_paths(config)?;
        let species = SpeciesEncoder::new(config.kinds.keys().cloned());
        info!("Species: {}", species.names().join(", "));

        let dataset = samples_from_paths(&paths, &species).wrap_err("Failed to load training data")?;

        let mut kinds = BTreeMap::new();
        for (name, record) in &dataset.kinds {
            let kind_config = config
                .kinds
                .get(name)
                .ok_or_else(|| eyre!("kind {} appears in the data but not in the configuration", name))?;
            let kind = AtomicKind::from_spec_str(record, &kind_config.prim_basis)
                .wrap_err_with(|| format!("Invalid primitive basis for kind {}", name))?;
            info!(
                "Kind {}: primitive basis {} ({}), PAO basis size {}",
                name, kind.prim_basis_spec, kind.prim_basis_size, kind.pao_basis_size
            );
            kinds.insert(name.clone(), kind);
        }

        Ok(Self {
            species,
            kinds,
            dataset,
        })
    }
}

fn training_paths(config: &Config) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    if let (Some(root), Some(suffix)) = (&config.data.root, &config.data.suffix) {
        if root.is_dir() {
            paths = collect_training_paths(root, suffix)
                .wrap_err_with(|| format!("Unable to scan training directory {}", root.display()))?;
        }
    }
    paths.extend(config.data.files.iter().cloned());
    if paths.is_empty() {
        return Err(eyre!("no training files found"));
    }
    info!("Found {} training files", paths.len());
    Ok(paths)
}

/// Location of the saved model of `kind`.
pub fn model_path(dir: &Path, kind: &str) -> PathBuf {
    dir.join(format!("pao_model_{}.json", kind))
}
