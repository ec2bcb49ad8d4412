//! Command-line argument parsing

use clap::Parser;
use std::path::PathBuf;

/// Train equivariant PAO basis models, or predict PAO bases with trained ones
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config_file: String,

    /// Override output file: (default stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Override number of training epochs
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Override batch size
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Override learning rate
    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Override the random seed used for initialisation and shuffling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Optimizer (adam or sd)
    #[arg(long)]
    pub optimizer: Option<String>,

    /// Only train these kinds (default: all configured kinds)
    #[arg(long, value_delimiter = ',')]
    pub kinds: Vec<String>,

    /// Predict the PAO basis of every atom of this `.pao` file instead of training
    #[arg(long)]
    pub predict: Option<PathBuf>,

    /// Destination of the predicted `.pao` file
    #[arg(long, requires = "predict")]
    pub write: Option<PathBuf>,
}
