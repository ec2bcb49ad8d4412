//! PAO model command-line interface
//!
//! Trains one equivariant model per atomic kind from a YAML configuration,
//! or predicts the PAO basis of a `.pao` file with previously trained models.

use color_eyre::eyre::Result;

mod app;

use app::PaoApplication;

fn main() -> Result<()> {
    color_eyre::install()?;
    PaoApplication::from_cli()?.run()
}
