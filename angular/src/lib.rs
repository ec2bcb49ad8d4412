//! Rotation-group toolkit used by the PAO models.
//!
//! The crate provides the O(3) bookkeeping (irreps with natural parity), real
//! spherical harmonics with analytic gradients, real coupling (Wigner-3j)
//! tensors and real Wigner D-matrices. Everything is evaluated numerically on
//! exact sphere quadratures, so all objects share one basis convention.

pub mod coupling;
pub mod harmonics;
pub mod irreps;
pub mod quadrature;
pub mod wigner;

pub use coupling::{wigner_3j, Tensor3};
pub use harmonics::{spherical_harmonics, SphericalHarmonics};
pub use irreps::{Irrep, Irreps, IrrepsError, MulIr, Parity};
pub use quadrature::SphereQuadrature;
pub use wigner::wigner_d;
