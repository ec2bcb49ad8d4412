mod report;
mod runner;
mod workspace;

use self::report::report_configuration;
use self::runner::{run_prediction, run_training};
use self::workspace::TrainingWorkspace;
use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use pao::config::{Args, Config};
use pao::io::setup_output;
use std::fs;
use tracing::info;

pub struct PaoApplication {
    args: Args,
    config: Config,
}

impl PaoApplication {
    pub fn from_cli() -> Result<Self> {
        let args = Args::parse();
        let mut config = load_config(&args)?;
        apply_overrides(&mut config, &args);
        config.validate().wrap_err("Invalid configuration")?;
        Ok(Self { args, config })
    }

    pub fn run(self) -> Result<()> {
        setup_output(self.args.output.as_ref())?;
        info!("Configuration read from: {}", self.args.config_file);
        report_configuration(&self.config);

        match &self.args.predict {
            Some(input) => {
                let output = self
                    .args
                    .write
                    .clone()
                    .unwrap_or_else(|| input.with_extension("predicted.pao"));
                run_prediction(input, &output, &self.config)
            }
            None => {
                let workspace = TrainingWorkspace::load(&self.config)?;
                run_training(&workspace, &self.args, &self.config)?;
                Ok(())
            }
        }
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let config_content = fs::read_to_string(&args.config_file)
        .wrap_err_with(|| format!("Unable to read configuration file: {}", args.config_file))?;

    let config = Config::from_yaml(&config_content).wrap_err("Failed to parse configuration file")?;

    Ok(config)
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(epochs) = args.epochs {
        config.training.epochs = Some(epochs);
    }
    if let Some(batch_size) = args.batch_size {
        config.training.batch_size = Some(batch_size);
    }
    if let Some(lr) = args.learning_rate {
        config.training.learning_rate = Some(lr);
    }
    if let Some(optimizer) = &args.optimizer {
        config.training.optimizer = Some(optimizer.clone());
    }
    if let Some(seed) = args.seed {
        config.model.seed = Some(seed);
    }
}
