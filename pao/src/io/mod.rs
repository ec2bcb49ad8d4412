//! File formats and logging setup.

pub mod energy;
pub mod output;
pub mod pao_file;

pub use energy::read_cp2k_energy;
pub use output::{setup_output, write_loss_history};
pub use pao_file::{format_pao, parse_pao_file, parse_pao_str, write_pao_file, AtomRecord, PaoFile};
