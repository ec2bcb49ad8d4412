//! Coupling table of one atomic kind.
//!
//! Every unordered pair of primitive channels `(i <= j)` couples to each
//! `lc` in `|l_i - l_j| ..= l_i + l_j` allowed by parity. An admitted triple
//! consumes `2lc + 1` consecutive entries of the model output and writes the
//! `(i, j)` block of the auxiliary matrix, plus its mirror when `i != j`.

use crate::error::{PaoError, Result};
use angular::{wigner_3j, Irreps, IrrepsError, Tensor3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use tracing::{debug, warn};

/// Below this the central-element rescale is reported as unstable.
pub const CENTRAL_ELEMENT_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CouplingKey {
    pub l1: u32,
    pub l2: u32,
    pub lc: u32,
}

impl fmt::Display for CouplingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}) -> {}", self.l1, self.l2, self.lc)
    }
}

/// Parity rule for natural-parity channels: equal parities couple to even
/// `lc`, different parities to odd `lc`.
pub fn parity_allows(l1: u32, l2: u32, lc: u32) -> bool {
    (l1 + l2 + lc) % 2 == 0
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouplingEntry {
    pub key: CouplingKey,
    pub channels: (usize, usize),
    /// Slice of the flat output vector.
    pub vector: Range<usize>,
    pub rows: Range<usize>,
    pub cols: Range<usize>,
}

impl CouplingEntry {
    pub fn is_diagonal(&self) -> bool {
        self.channels.0 == self.channels.1
    }
}

/// Immutable per-kind table; shared by reference between forward passes.
#[derive(Debug, Clone)]
pub struct CouplingTable {
    spec: Irreps,
    entries: Vec<CouplingEntry>,
    coefficients: BTreeMap<CouplingKey, Tensor3>,
    vector_dim: usize,
    matrix_dim: usize,
}

impl CouplingTable {
    pub fn build(spec: &Irreps) -> Result<Self> {
        if spec.is_empty() {
            return Err(PaoError::BasisSpec(IrrepsError::Empty));
        }
        let channels = spec.ls();
        let mut starts = Vec::with_capacity(channels.len());
        let mut matrix_dim = 0;
        for l in &channels {
            starts.push(matrix_dim);
            matrix_dim += 2 * *l as usize + 1;
        }

        let mut entries = Vec::new();
        let mut coefficients = BTreeMap::new();
        let mut vector_dim = 0;
        for (i, &l1) in channels.iter().enumerate() {
            for (j, &l2) in channels.iter().enumerate().skip(i) {
                for lc in l1.abs_diff(l2)..=l1 + l2 {
                    if !parity_allows(l1, l2, lc) {
                        continue;
                    }
                    let key = CouplingKey { l1, l2, lc };
                    if !coefficients.contains_key(&key) {
                        coefficients.insert(key, coupling_coefficients(key)?);
                    }
                    let width = 2 * lc as usize + 1;
                    entries.push(CouplingEntry {
                        key,
                        channels: (i, j),
                        vector: vector_dim..vector_dim + width,
                        rows: starts[i]..starts[i] + 2 * l1 as usize + 1,
                        cols: starts[j]..starts[j] + 2 * l2 as usize + 1,
                    });
                    vector_dim += width;
                }
            }
        }
        debug!(
            "coupling table for {}: {} entries, {} distinct triples, output dimension {}",
            spec,
            entries.len(),
            coefficients.len(),
            vector_dim
        );

        Ok(CouplingTable {
            spec: spec.clone(),
            entries,
            coefficients,
            vector_dim,
            matrix_dim,
        })
    }

    pub fn spec(&self) -> &Irreps {
        &self.spec
    }

    pub fn entries(&self) -> &[CouplingEntry] {
        &self.entries
    }

    pub fn coefficients(&self, key: &CouplingKey) -> Option<&Tensor3> {
        self.coefficients.get(key)
    }

    pub fn num_triples(&self) -> usize {
        self.coefficients.len()
    }

    /// Length of the output vector the table consumes.
    pub fn vector_dim(&self) -> usize {
        self.vector_dim
    }

    /// Side of the auxiliary matrix, the primitive-basis dimension.
    pub fn matrix_dim(&self) -> usize {
        self.matrix_dim
    }

    /// Irreps of the output vector in enumeration order.
    pub fn output_irreps(&self) -> Irreps {
        Irreps::from_degrees(self.entries.iter().map(|e| e.key.lc)).simplify()
    }
}

/// Normalised 3j tensor rescaled by its central element.
fn coupling_coefficients(key: CouplingKey) -> Result<Tensor3> {
    let CouplingKey { l1, l2, lc } = key;
    let tensor = wigner_3j(l1, l2, lc).ok_or(PaoError::Coupling { l1, l2, lc })?;
    let central = tensor.central();
    if central.abs() < CENTRAL_ELEMENT_TOLERANCE {
        warn!("coupling {key} has central element {central:e}, rescale is unstable");
    }
    Ok(tensor.scaled(central))
}
