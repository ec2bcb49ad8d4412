//! Atomic kinds: what a `.pao` file declares about a kind, and the validated
//! form the models are built from.

use crate::error::{PaoError, Result};
use angular::Irreps;
use periodic_table_on_an_enum::Element;
use serde::{Deserialize, Serialize};

/// Kind record as declared in a `.pao` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindRecord {
    pub name: String,
    pub atomic_number: u32,
    pub nparams: usize,
    pub prim_basis_name: String,
    pub prim_basis_size: usize,
    pub pao_basis_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicKind {
    pub name: String,
    pub atomic_number: u32,
    /// Parameter count declared in the file, written back unchanged.
    #[serde(default)]
    pub nparams: usize,
    pub prim_basis_name: String,
    pub prim_basis_spec: Irreps,
    pub prim_basis_size: usize,
    pub pao_basis_size: usize,
}

impl AtomicKind {
    /// Attach the channel structure of the primitive basis to a file record.
    pub fn new(record: &KindRecord, prim_basis_spec: Irreps) -> Result<Self> {
        let invalid = |message: String| PaoError::InvalidKind {
            kind: record.name.clone(),
            message,
        };
        if prim_basis_spec.is_empty() {
            return Err(PaoError::BasisSpec(angular::IrrepsError::Empty));
        }
        if prim_basis_spec.dim() != record.prim_basis_size {
            return Err(invalid(format!(
                "primitive basis `{}` has dimension {} but the file declares {}",
                prim_basis_spec,
                prim_basis_spec.dim(),
                record.prim_basis_size
            )));
        }
        if record.pao_basis_size == 0 || record.pao_basis_size > record.prim_basis_size {
            return Err(invalid(format!(
                "PAO basis size {} outside 1..={}",
                record.pao_basis_size, record.prim_basis_size
            )));
        }
        // kind names are free-form; only check them when they are element symbols
        if let Some(element) = Element::from_symbol(&record.name) {
            let z = element.get_atomic_number() as u32;
            if z != record.atomic_number {
                return Err(invalid(format!(
                    "element {} has atomic number {} but the file declares {}",
                    element.get_symbol(),
                    z,
                    record.atomic_number
                )));
            }
        }

        Ok(AtomicKind {
            name: record.name.clone(),
            atomic_number: record.atomic_number,
            nparams: record.nparams,
            prim_basis_name: record.prim_basis_name.clone(),
            prim_basis_spec,
            prim_basis_size: record.prim_basis_size,
            pao_basis_size: record.pao_basis_size,
        })
    }

    pub fn from_spec_str(record: &KindRecord, spec: &str) -> Result<Self> {
        Self::new(record, spec.parse::<Irreps>()?)
    }

    /// True when `record` describes the same basis sizes as this kind.
    pub fn matches(&self, record: &KindRecord) -> bool {
        self.name == record.name
            && self.atomic_number == record.atomic_number
            && self.prim_basis_size == record.prim_basis_size
            && self.pao_basis_size == record.pao_basis_size
    }
}
