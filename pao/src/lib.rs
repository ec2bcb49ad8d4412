//! Equivariant prediction of polarized atomic orbital (PAO) bases.
//!
//! A per-kind model maps the neighbourhood of an atom to a symmetric
//! auxiliary matrix whose dominant eigenvectors are the predicted basis.

pub mod assemble;
pub mod config;
pub mod coupling;
pub mod dataset;
pub mod error;
pub mod extract;
pub mod io;
pub mod kind;
pub mod loss;
pub mod model;
pub mod network;
pub mod optim_impl;
pub mod predict;
pub mod train;

pub use error::{PaoError, Result};
pub use kind::{AtomicKind, KindRecord};
pub use model::{Hyperparameters, PaoModel, Prediction};
