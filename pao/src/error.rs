//! Error type shared by the PAO library.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaoError {
    #[error("invalid primitive basis specification: {0}")]
    BasisSpec(#[from] angular::IrrepsError),

    #[error("kind `{kind}`: {message}")]
    InvalidKind { kind: String, message: String },

    #[error("unknown kind `{0}`")]
    UnknownKind(String),

    #[error("{}:{}: {}", .path.display(), .line, .message)]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("{}: atom {}: {}", .path.display(), .atom, .source)]
    Sample {
        path: PathBuf,
        atom: usize,
        #[source]
        source: Box<PaoError>,
    },

    #[error("{}: no Xblock records, a reference basis is required", .0.display())]
    MissingReference(PathBuf),

    #[error("no ENERGY| record in {}", .0.display())]
    EnergyNotFound(PathBuf),

    #[error("neighbour {index} coincides with the centre atom")]
    CoincidentAtoms { index: usize },

    #[error("eigendecomposition of a {dim}x{dim} auxiliary matrix did not converge")]
    EigenNonConvergence { dim: usize },

    #[error("auxiliary matrix contains non-finite entries")]
    NonFiniteMatrix,

    #[error("loss or gradient is not finite")]
    NonFiniteLoss,

    #[error("singular value decomposition of a reference block did not converge")]
    SvdNonConvergence,

    #[error("no admissible coupling for degrees ({l1}, {l2}, {lc})")]
    Coupling { l1: u32, l2: u32, lc: u32 },

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PaoError>;
