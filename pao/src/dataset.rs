//! Per-atom training examples built from `.pao` files, plus splitting and
//! batching helpers.

use crate::error::{PaoError, Result};
use crate::io::{parse_pao_file, PaoFile};
use crate::kind::KindRecord;
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One-hot encoding over a fixed, sorted list of kind names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeciesEncoder {
    species: Vec<String>,
}

impl SpeciesEncoder {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut species: Vec<String> = names.into_iter().map(Into::into).collect();
        species.sort();
        species.dedup();
        SpeciesEncoder { species }
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.species
    }

    pub fn index(&self, name: &str) -> Result<usize> {
        self.species
            .binary_search_by(|s| s.as_str().cmp(name))
            .map_err(|_| PaoError::UnknownKind(name.to_string()))
    }

    pub fn one_hot(&self, name: &str) -> Result<DVector<f64>> {
        let idx = self.index(name)?;
        Ok(DVector::from_fn(self.len(), |i, _| if i == idx { 1.0 } else { 0.0 }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Neighbour {
    pub position: Vector3<f64>,
    pub species: DVector<f64>,
}

/// A centre atom and every other atom of its structure.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomEnvironment {
    pub kind: String,
    pub center: Vector3<f64>,
    pub neighbours: Vec<Neighbour>,
}

impl AtomEnvironment {
    /// Environment of atom `index` of `file`.
    pub fn from_file(file: &PaoFile, index: usize, encoder: &SpeciesEncoder) -> Result<Self> {
        let center = file.atoms.get(index).ok_or_else(|| {
            PaoError::DimensionMismatch(format!("atom {} of {}", index, file.atoms.len()))
        })?;
        let neighbours = file
            .atoms
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != index)
            .map(|(_, atom)| {
                Ok(Neighbour {
                    position: atom.position,
                    species: encoder.one_hot(&atom.kind)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(AtomEnvironment {
            kind: center.kind.clone(),
            center: center.position,
            neighbours,
        })
    }

    pub fn relative_positions(&self) -> Vec<Vector3<f64>> {
        self.neighbours
            .iter()
            .map(|n| n.position - self.center)
            .collect()
    }

    /// Rotate every position about the origin.
    pub fn rotated(&self, rotation: &Matrix3<f64>) -> Self {
        AtomEnvironment {
            kind: self.kind.clone(),
            center: rotation * self.center,
            neighbours: self
                .neighbours
                .iter()
                .map(|n| Neighbour {
                    position: rotation * n.position,
                    species: n.species.clone(),
                })
                .collect(),
        }
    }

    pub fn translated(&self, shift: &Vector3<f64>) -> Self {
        AtomEnvironment {
            kind: self.kind.clone(),
            center: self.center + shift,
            neighbours: self
                .neighbours
                .iter()
                .map(|n| Neighbour {
                    position: n.position + shift,
                    species: n.species.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaoSample {
    pub environment: AtomEnvironment,
    /// Orthonormal rows spanning the reference subspace.
    pub label: DMatrix<f64>,
}

/// Right-singular vectors of a reference block; its first `m` rows are
/// orthonormal and span the row space of the `m x n` block.
pub fn label_from_xblock(xblock: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let m = xblock.nrows();
    if m == 0 || m > xblock.ncols() {
        return Err(PaoError::DimensionMismatch(format!(
            "reference block {}x{} is not a basis",
            m,
            xblock.ncols()
        )));
    }
    let svd = xblock
        .clone()
        .try_svd(false, true, 1e-14, 10_000)
        .ok_or(PaoError::SvdNonConvergence)?;
    let v_t = svd.v_t.ok_or(PaoError::SvdNonConvergence)?;
    Ok(v_t.rows(0, m).into_owned())
}

pub fn samples_from_file(path: &Path, encoder: &SpeciesEncoder) -> Result<Vec<PaoSample>> {
    samples_from_pao(&parse_pao_file(path)?, path, encoder)
}

/// Samples of an already parsed file; `path` only labels errors.
pub fn samples_from_pao(file: &PaoFile, path: &Path, encoder: &SpeciesEncoder) -> Result<Vec<PaoSample>> {
    if file.xblocks.is_empty() {
        return Err(PaoError::MissingReference(path.to_path_buf()));
    }
    (0..file.atoms.len())
        .map(|i| {
            let sample = || -> Result<PaoSample> {
                Ok(PaoSample {
                    environment: AtomEnvironment::from_file(file, i, encoder)?,
                    label: label_from_xblock(&file.xblocks[i])?,
                })
            };
            sample().map_err(|e| PaoError::Sample {
                path: path.to_path_buf(),
                atom: i + 1,
                source: Box::new(e),
            })
        })
        .collect()
}

/// Samples of many files grouped by kind, with the kind records they declare.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub kinds: BTreeMap<String, KindRecord>,
    pub samples: BTreeMap<String, Vec<PaoSample>>,
}

impl Dataset {
    pub fn num_samples(&self) -> usize {
        self.samples.values().map(Vec::len).sum()
    }
}

/// Parse `paths` in parallel. Every file must declare the same basis sizes
/// for a given kind.
pub fn samples_from_paths(paths: &[PathBuf], encoder: &SpeciesEncoder) -> Result<Dataset> {
    let parsed: Vec<(PaoFile, Vec<PaoSample>)> = paths
        .par_iter()
        .map(|path| {
            let file = parse_pao_file(path)?;
            let samples = samples_from_pao(&file, path, encoder)?;
            Ok((file, samples))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut dataset = Dataset::default();
    for ((file, samples), path) in parsed.into_iter().zip(paths) {
        for record in &file.kinds {
            match dataset.kinds.get(&record.name) {
                Some(known) if known != record => {
                    return Err(PaoError::InvalidKind {
                        kind: record.name.clone(),
                        message: format!("{} declares a different basis", path.display()),
                    })
                }
                Some(_) => {}
                None => {
                    dataset.kinds.insert(record.name.clone(), record.clone());
                }
            }
        }
        debug!("{}: {} samples", path.display(), samples.len());
        for sample in samples {
            dataset
                .samples
                .entry(sample.environment.kind.clone())
                .or_default()
                .push(sample);
        }
    }
    info!(
        "Loaded {} samples of {} kinds from {} files",
        dataset.num_samples(),
        dataset.samples.len(),
        paths.len()
    );
    Ok(dataset)
}

/// Files ending in `suffix` inside the immediate sub-directories of `root`, sorted.
pub fn collect_training_paths(root: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for dir in fs::read_dir(root)? {
        let dir = dir?.path();
        if !dir.is_dir() {
            continue;
        }
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(suffix));
            if path.is_file() && matches {
                paths.push(path);
            }
        }
    }
    paths.sort();
    Ok(paths)
}

/// Shuffle and split into `(train, test)`. With at least two items and a
/// positive ratio both parts are non-empty.
pub fn train_test_split<T: Clone, R: Rng>(items: &[T], test_ratio: f64, rng: &mut R) -> (Vec<T>, Vec<T>) {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.shuffle(rng);
    let n = items.len();
    let mut n_test = (n as f64 * test_ratio).ceil() as usize;
    if test_ratio > 0.0 && n >= 2 {
        n_test = n_test.clamp(1, n - 1);
    }
    let n_test = n_test.min(n);
    let test = order[..n_test].iter().map(|&i| items[i].clone()).collect();
    let train = order[n_test..].iter().map(|&i| items[i].clone()).collect();
    (train, test)
}

/// Consecutive batches of at most `batch_size` items, shuffled when `rng` is given.
pub fn batches<'a, T, R: Rng>(items: &'a [T], batch_size: usize, rng: Option<&mut R>) -> Vec<Vec<&'a T>> {
    let mut refs: Vec<&T> = items.iter().collect();
    if let Some(rng) = rng {
        refs.shuffle(rng);
    }
    refs.chunks(batch_size.max(1)).map(<[&T]>::to_vec).collect()
}
