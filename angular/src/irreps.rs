//! Irreducible representations of O(3) with natural parity and their direct sums.
//!
//! Specification strings follow the usual `"2x0e + 2x1o + 1x2e"` form. Only
//! natural parity, `(-1)^l`, is accepted since every feature in this workspace
//! is built from spherical harmonics.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IrrepsError {
    #[error("empty irreps specification")]
    Empty,

    #[error("malformed irrep `{0}`, expected `<mul>x<l><e|o>`")]
    Malformed(String),

    #[error("irrep `{0}` has zero multiplicity")]
    ZeroMultiplicity(String),

    #[error("irrep `{token}` has parity `{found}` but degree {l} requires `{expected}`")]
    NonNaturalParity {
        token: String,
        l: u32,
        found: char,
        expected: char,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Parity {
    Even,
    Odd,
}

impl Parity {
    pub fn of_degree(l: u32) -> Self {
        if l % 2 == 0 {
            Parity::Even
        } else {
            Parity::Odd
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Parity::Even => 'e',
            Parity::Odd => 'o',
        }
    }

    pub fn product(self, other: Parity) -> Parity {
        if self == other {
            Parity::Even
        } else {
            Parity::Odd
        }
    }
}

/// Irrep of degree `l`, dimension `2l + 1`, parity `(-1)^l`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Irrep {
    pub l: u32,
}

impl Irrep {
    pub fn new(l: u32) -> Self {
        Irrep { l }
    }

    pub fn dim(&self) -> usize {
        2 * self.l as usize + 1
    }

    pub fn parity(&self) -> Parity {
        Parity::of_degree(self.l)
    }
}

impl fmt::Display for Irrep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.l, self.parity().symbol())
    }
}

/// `mul` copies of one irrep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MulIr {
    pub mul: usize,
    pub ir: Irrep,
}

impl MulIr {
    pub fn new(mul: usize, l: u32) -> Self {
        MulIr {
            mul,
            ir: Irrep::new(l),
        }
    }

    pub fn dim(&self) -> usize {
        self.mul * self.ir.dim()
    }
}

impl fmt::Display for MulIr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.mul, self.ir)
    }
}

/// Ordered direct sum of irreps. Feature vectors are laid out entry by entry,
/// copy-major inside an entry: copy `u` of `mul x l` occupies
/// `offset + u * (2l + 1) .. offset + (u + 1) * (2l + 1)`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Irreps(Vec<MulIr>);

impl Irreps {
    pub fn new(items: Vec<MulIr>) -> Self {
        Irreps(items)
    }

    /// `1x0e + 1x1o + ... + 1x{lmax}`.
    pub fn spherical_harmonics(lmax: u32) -> Self {
        Irreps((0..=lmax).map(|l| MulIr::new(1, l)).collect())
    }

    /// `mul x l` for every degree up to `lmax`.
    pub fn uniform(mul: usize, lmax: u32) -> Self {
        Irreps((0..=lmax).map(|l| MulIr::new(mul, l)).collect())
    }

    pub fn scalars(mul: usize) -> Self {
        Irreps(vec![MulIr::new(mul, 0)])
    }

    /// One copy per listed degree, in order.
    pub fn from_degrees<I: IntoIterator<Item = u32>>(degrees: I) -> Self {
        Irreps(degrees.into_iter().map(|l| MulIr::new(1, l)).collect())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MulIr> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.0.iter().map(MulIr::dim).sum()
    }

    /// Total number of irrep copies.
    pub fn num_irreps(&self) -> usize {
        self.0.iter().map(|m| m.mul).sum()
    }

    pub fn lmax(&self) -> u32 {
        self.0.iter().map(|m| m.ir.l).max().unwrap_or(0)
    }

    /// Degree of every copy, multiplicities expanded in order.
    pub fn ls(&self) -> Vec<u32> {
        self.0
            .iter()
            .flat_map(|m| std::iter::repeat(m.ir.l).take(m.mul))
            .collect()
    }

    /// Start index of every entry within a feature vector.
    pub fn offsets(&self) -> Vec<usize> {
        let mut offset = 0;
        self.0
            .iter()
            .map(|m| {
                let start = offset;
                offset += m.dim();
                start
            })
            .collect()
    }

    /// Merge adjacent entries carrying the same irrep.
    pub fn simplify(&self) -> Self {
        let mut out: Vec<MulIr> = Vec::with_capacity(self.0.len());
        for item in &self.0 {
            match out.last_mut() {
                Some(last) if last.ir == item.ir => last.mul += item.mul,
                _ => out.push(*item),
            }
        }
        Irreps(out)
    }
}

impl<'a> IntoIterator for &'a Irreps {
    type Item = &'a MulIr;
    type IntoIter = std::slice::Iter<'a, MulIr>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn parse_token(token: &str) -> Result<MulIr, IrrepsError> {
    let malformed = || IrrepsError::Malformed(token.to_string());
    let (mul, ir) = match token.split_once('x') {
        Some((mul, ir)) => (mul.trim().parse::<usize>().map_err(|_| malformed())?, ir.trim()),
        None => (1, token),
    };
    let found = ir.chars().last().ok_or_else(malformed)?;
    let l = ir[..ir.len() - found.len_utf8()]
        .parse::<u32>()
        .map_err(|_| malformed())?;
    if found != 'e' && found != 'o' {
        return Err(malformed());
    }
    let expected = Parity::of_degree(l).symbol();
    if found != expected {
        return Err(IrrepsError::NonNaturalParity {
            token: token.to_string(),
            l,
            found,
            expected,
        });
    }
    if mul == 0 {
        return Err(IrrepsError::ZeroMultiplicity(token.to_string()));
    }
    Ok(MulIr::new(mul, l))
}

impl FromStr for Irreps {
    type Err = IrrepsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(IrrepsError::Empty);
        }
        s.split('+')
            .map(|token| parse_token(token.trim()))
            .collect::<Result<Vec<_>, _>>()
            .map(Irreps)
    }
}

impl fmt::Display for Irreps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{}", item)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_oxygen_basis() {
        let irreps: Irreps = "2x0e + 2x1o + 1x2e".parse().unwrap();
        assert_eq!(irreps.len(), 3);
        assert_eq!(irreps.dim(), 13);
        assert_eq!(irreps.num_irreps(), 5);
        assert_eq!(irreps.ls(), vec![0, 0, 1, 1, 2]);
        assert_eq!(irreps.offsets(), vec![0, 2, 8]);
        assert_eq!(irreps.lmax(), 2);
        assert_eq!(irreps.to_string(), "2x0e + 2x1o + 1x2e");
    }

    #[test]
    fn multiplicity_defaults_to_one() {
        let irreps: Irreps = "0e+1o".parse().unwrap();
        assert_eq!(irreps, Irreps::spherical_harmonics(1));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!("".parse::<Irreps>(), Err(IrrepsError::Empty));
        assert!(matches!(
            "2x1e".parse::<Irreps>(),
            Err(IrrepsError::NonNaturalParity { l: 1, .. })
        ));
        assert!(matches!(
            "0x0e".parse::<Irreps>(),
            Err(IrrepsError::ZeroMultiplicity(_))
        ));
        assert!(matches!("2x1q".parse::<Irreps>(), Err(IrrepsError::Malformed(_))));
        assert!(matches!("ax0e".parse::<Irreps>(), Err(IrrepsError::Malformed(_))));
        assert!(matches!("2x0e + ".parse::<Irreps>(), Err(IrrepsError::Malformed(_))));
    }

    #[test]
    fn simplify_merges_neighbours_only() {
        let irreps = Irreps::from_degrees([0, 0, 2, 1, 1, 0]);
        assert_eq!(irreps.simplify().to_string(), "2x0e + 1x2e + 2x1o + 1x0e");
        assert_eq!(irreps.simplify().dim(), irreps.dim());
    }

    #[test]
    fn parity_product() {
        assert_eq!(Parity::Odd.product(Parity::Odd), Parity::Even);
        assert_eq!(Parity::Even.product(Parity::Odd), Parity::Odd);
        assert_eq!(Irrep::new(3).parity(), Parity::Odd);
    }
}
