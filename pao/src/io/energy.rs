//! Total energies from CP2K output files.

use crate::error::{PaoError, Result};
use std::fs;
use std::path::Path;

/// Last token of the first `ENERGY|` line.
pub fn read_cp2k_energy(path: &Path) -> Result<f64> {
    let content = fs::read_to_string(path)?;
    parse_cp2k_energy(&content, path)
}

pub fn parse_cp2k_energy(content: &str, path: &Path) -> Result<f64> {
    let (number, line) = content
        .lines()
        .enumerate()
        .find(|(_, l)| l.trim_start().starts_with("ENERGY|"))
        .ok_or_else(|| PaoError::EnergyNotFound(path.to_path_buf()))?;
    let token = line.split_whitespace().last().unwrap_or_default();
    token.parse::<f64>().map_err(|_| PaoError::Parse {
        path: path.to_path_buf(),
        line: number + 1,
        message: format!("invalid energy `{token}`"),
    })
}
