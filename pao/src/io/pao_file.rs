//! Reader and writer for the line-oriented `.pao` basis file.

use crate::error::{PaoError, Result};
use crate::kind::KindRecord;
use nalgebra::{DMatrix, Matrix3, Vector3};
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::fs;
use std::path::Path;
use std::str::FromStr;

pub const PARAMETRIZATION: &str = "EQUIVARIANT";

#[derive(Debug, Clone, PartialEq)]
pub struct AtomRecord {
    pub kind: String,
    pub position: Vector3<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaoFile {
    pub version: u32,
    pub kinds: Vec<KindRecord>,
    pub cell: Matrix3<f64>,
    pub atoms: Vec<AtomRecord>,
    /// One `pao x prim` block per atom, or none at all.
    pub xblocks: Vec<DMatrix<f64>>,
}

impl PaoFile {
    pub fn kind(&self, name: &str) -> Option<&KindRecord> {
        self.kinds.iter().find(|k| k.name == name)
    }

    pub fn coords(&self) -> Vec<Vector3<f64>> {
        self.atoms.iter().map(|a| a.position).collect()
    }
}

#[derive(Default)]
struct KindBuilder {
    name: Option<(String, u32)>,
    nparams: Option<usize>,
    prim: Option<(usize, String)>,
    pao: Option<usize>,
}

struct Line<'a> {
    number: usize,
    tokens: Vec<&'a str>,
}

impl<'a> Line<'a> {
    fn expect_len(&self, n: usize) -> std::result::Result<(), String> {
        if self.tokens.len() != n {
            return Err(format!(
                "`{}` expects {} fields, found {}",
                self.tokens[0],
                n - 1,
                self.tokens.len() - 1
            ));
        }
        Ok(())
    }

    fn field<T: FromStr>(&self, i: usize, what: &str) -> std::result::Result<T, String> {
        let raw = self
            .tokens
            .get(i)
            .ok_or_else(|| format!("missing {what}"))?;
        raw.parse::<T>()
            .map_err(|_| format!("invalid {what} `{raw}`"))
    }

    /// Finite numbers from field `from` onwards; `NaN` and `inf` are rejected.
    fn floats(&self, from: usize) -> std::result::Result<Vec<f64>, String> {
        (from..self.tokens.len())
            .map(|i| {
                let value = self.field::<f64>(i, "number")?;
                if !value.is_finite() {
                    return Err(format!("non-finite number `{}`", self.tokens[i]));
                }
                Ok(value)
            })
            .collect()
    }
}

pub fn parse_pao_file(path: &Path) -> Result<PaoFile> {
    let content = fs::read_to_string(path)?;
    parse_pao_str(&content, path)
}

/// Records collected so far, keyed by their 1-based indices.
#[derive(Default)]
struct ParseState {
    version: Option<u32>,
    parametrization: bool,
    nkinds: Option<usize>,
    kinds: BTreeMap<usize, KindBuilder>,
    cell: Option<Matrix3<f64>>,
    natoms: Option<usize>,
    atoms: BTreeMap<usize, AtomRecord>,
    // atom index -> (line, values)
    blocks: BTreeMap<usize, (usize, Vec<f64>)>,
    finished: bool,
}

impl ParseState {
    fn apply(&mut self, line: &Line) -> std::result::Result<(), String> {
        match line.tokens[0] {
            "Version" => {
                line.expect_len(2)?;
                self.version = Some(line.field(1, "version")?);
            }
            "Parametrization" => {
                line.expect_len(2)?;
                if line.tokens[1] != PARAMETRIZATION {
                    return Err(format!("unsupported parametrization `{}`", line.tokens[1]));
                }
                self.parametrization = true;
            }
            "Nkinds" => {
                line.expect_len(2)?;
                self.nkinds = Some(line.field(1, "kind count")?);
            }
            "Kind" => {
                line.expect_len(4)?;
                let idx: usize = line.field(1, "kind index")?;
                let z: u32 = line.field(3, "atomic number")?;
                self.kinds.entry(idx).or_default().name = Some((line.tokens[2].to_string(), z));
            }
            "NParams" => {
                line.expect_len(3)?;
                let idx: usize = line.field(1, "kind index")?;
                self.kinds.entry(idx).or_default().nparams = Some(line.field(2, "parameter count")?);
            }
            "PrimBasis" => {
                line.expect_len(4)?;
                let idx: usize = line.field(1, "kind index")?;
                let size: usize = line.field(2, "basis size")?;
                self.kinds.entry(idx).or_default().prim = Some((size, line.tokens[3].to_string()));
            }
            "PaoBasis" => {
                line.expect_len(3)?;
                let idx: usize = line.field(1, "kind index")?;
                self.kinds.entry(idx).or_default().pao = Some(line.field(2, "basis size")?);
            }
            "NPaoPotentials" => {
                line.expect_len(3)?;
                line.field::<usize>(1, "kind index")?;
                if line.field::<usize>(2, "potential count")? != 0 {
                    return Err("PAO potentials are not supported".to_string());
                }
            }
            "Cell" => {
                line.expect_len(10)?;
                self.cell = Some(Matrix3::from_row_slice(&line.floats(1)?));
            }
            "Natoms" => {
                line.expect_len(2)?;
                self.natoms = Some(line.field(1, "atom count")?);
            }
            "Atom" => {
                line.expect_len(6)?;
                let idx: usize = line.field(1, "atom index")?;
                let xyz = line.floats(3)?;
                let record = AtomRecord {
                    kind: line.tokens[2].to_string(),
                    position: Vector3::new(xyz[0], xyz[1], xyz[2]),
                };
                if self.atoms.insert(idx, record).is_some() {
                    return Err(format!("atom {idx} declared twice"));
                }
            }
            "Xblock" => {
                let idx: usize = line.field(1, "atom index")?;
                if self.blocks.insert(idx, (line.number, line.floats(2)?)).is_some() {
                    return Err(format!("Xblock {idx} declared twice"));
                }
            }
            "THE_END" => self.finished = true,
            other => return Err(format!("unexpected keyword `{other}`")),
        }
        Ok(())
    }
}

/// Parse `content`; `path` is only used in error messages.
pub fn parse_pao_str(content: &str, path: &Path) -> Result<PaoFile> {
    let error = |line: usize, message: String| PaoError::Parse {
        path: path.to_path_buf(),
        line,
        message,
    };

    let mut state = ParseState::default();
    let mut end = 0;
    for (number, text) in content.lines().enumerate() {
        end = number + 1;
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        let line = Line { number: end, tokens };
        state.apply(&line).map_err(|message| error(end, message))?;
        if state.finished {
            break;
        }
    }

    if !state.finished {
        return Err(error(end, "missing THE_END".to_string()));
    }
    let version = state.version.ok_or_else(|| error(end, "missing Version".to_string()))?;
    if !state.parametrization {
        return Err(error(end, "missing Parametrization".to_string()));
    }
    let cell = state.cell.ok_or_else(|| error(end, "missing Cell".to_string()))?;

    let nkinds = state.nkinds.ok_or_else(|| error(end, "missing Nkinds".to_string()))?;
    if state.kinds.keys().copied().ne(1..=nkinds) {
        return Err(error(end, format!("expected kinds 1..={nkinds}")));
    }
    let kinds = state
        .kinds
        .into_iter()
        .map(|(idx, b)| {
            let incomplete = || error(end, format!("kind {idx} is incomplete"));
            let (name, atomic_number) = b.name.ok_or_else(incomplete)?;
            let (prim_basis_size, prim_basis_name) = b.prim.ok_or_else(incomplete)?;
            Ok(KindRecord {
                name,
                atomic_number,
                nparams: b.nparams.ok_or_else(incomplete)?,
                prim_basis_name,
                prim_basis_size,
                pao_basis_size: b.pao.ok_or_else(incomplete)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let natoms = state.natoms.ok_or_else(|| error(end, "missing Natoms".to_string()))?;
    if state.atoms.keys().copied().ne(1..=natoms) {
        return Err(error(end, format!("expected atoms 1..={natoms}")));
    }
    let atoms: Vec<AtomRecord> = state.atoms.into_values().collect();
    let mut atom_kinds = Vec::with_capacity(atoms.len());
    for (i, atom) in atoms.iter().enumerate() {
        let kind = kinds
            .iter()
            .find(|k| k.name == atom.kind)
            .ok_or_else(|| error(end, format!("atom {} has unknown kind `{}`", i + 1, atom.kind)))?;
        atom_kinds.push(kind);
    }

    let mut blocks = state.blocks;
    let mut xblocks = Vec::with_capacity(blocks.len());
    if !blocks.is_empty() {
        for (i, kind) in atom_kinds.iter().enumerate() {
            let (line, values) = blocks
                .remove(&(i + 1))
                .ok_or_else(|| error(end, format!("missing Xblock for atom {}", i + 1)))?;
            let (rows, cols) = (kind.pao_basis_size, kind.prim_basis_size);
            if values.len() != rows * cols {
                return Err(error(
                    line,
                    format!("Xblock {} has {} values, expected {}x{}", i + 1, values.len(), rows, cols),
                ));
            }
            xblocks.push(DMatrix::from_row_slice(rows, cols, &values));
        }
        if let Some((idx, (line, _))) = blocks.into_iter().next() {
            return Err(error(line, format!("Xblock {idx} refers to no atom")));
        }
    }

    Ok(PaoFile {
        version,
        kinds,
        cell,
        atoms,
        xblocks,
    })
}

/// Render `file`; floats use the shortest representation that parses back exactly.
pub fn format_pao(file: &PaoFile) -> String {
    let mut out = String::new();
    // writing into a String cannot fail
    let _ = render_pao(&mut out, file);
    out
}

fn render_pao(out: &mut String, file: &PaoFile) -> fmt::Result {
    writeln!(out, "Version {}", file.version)?;
    writeln!(out, "Parametrization {}", PARAMETRIZATION)?;
    writeln!(out, "Nkinds {}", file.kinds.len())?;
    for (i, kind) in file.kinds.iter().enumerate() {
        let idx = i + 1;
        writeln!(out, "Kind {} {} {}", idx, kind.name, kind.atomic_number)?;
        writeln!(out, "NParams {} {}", idx, kind.nparams)?;
        writeln!(out, "PrimBasis {} {} {}", idx, kind.prim_basis_size, kind.prim_basis_name)?;
        writeln!(out, "PaoBasis {} {}", idx, kind.pao_basis_size)?;
        writeln!(out, "NPaoPotentials {} 0", idx)?;
    }
    write!(out, "Cell")?;
    for i in 0..3 {
        for j in 0..3 {
            write!(out, " {}", file.cell[(i, j)])?;
        }
    }
    writeln!(out)?;
    writeln!(out, "Natoms {}", file.atoms.len())?;
    for (i, atom) in file.atoms.iter().enumerate() {
        let p = atom.position;
        writeln!(out, "Atom {} {} {} {} {}", i + 1, atom.kind, p.x, p.y, p.z)?;
    }
    for (i, block) in file.xblocks.iter().enumerate() {
        write!(out, "Xblock {}", i + 1)?;
        for r in 0..block.nrows() {
            for c in 0..block.ncols() {
                write!(out, " {}", block[(r, c)])?;
            }
        }
        writeln!(out)?;
    }
    writeln!(out, "THE_END")
}

pub fn write_pao_file(path: &Path, file: &PaoFile) -> Result<()> {
    fs::write(path, format_pao(file))?;
    Ok(())
}
