//! Configuration management for PAO training and prediction
//!
//! This module handles the YAML configuration structures, their defaults
//! and validation.

mod args;

pub use args::Args;

use crate::error::{PaoError, Result};
use crate::model::Hyperparameters;
use crate::train::TrainingSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Primitive basis channel list per kind name, e.g. `2x0e + 1x1o`
    pub kinds: BTreeMap<String, KindConfig>,
    #[serde(default)]
    pub data: DataParams,
    #[serde(default)]
    pub model: ModelParams,
    #[serde(default)]
    pub training: TrainingParams,
    #[serde(default)]
    pub output: OutputParams,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KindConfig {
    pub prim_basis: String,
}

/// Where the training `.pao` files live
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DataParams {
    pub root: Option<PathBuf>,
    pub suffix: Option<String>,
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl Default for DataParams {
    fn default() -> Self {
        DataParams {
            root: Some(PathBuf::from("training_data")),
            suffix: Some("-1_0.pao".to_string()),
            files: Vec::new(),
        }
    }
}

impl DataParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.root.is_none() {
            self.root = defaults.root;
        }
        if self.suffix.is_none() {
            self.suffix = defaults.suffix;
        }
        self
    }
}

/// Network hyper-parameters
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelParams {
    pub max_radius: Option<f64>,
    pub num_neighbours: Option<f64>,
    pub radial_basis: Option<usize>,
    pub hidden_layers: Option<Vec<usize>>,
    pub mid_multiplicity: Option<usize>,
    pub seed: Option<u64>,
}

impl Default for ModelParams {
    fn default() -> Self {
        let h = Hyperparameters::default();
        ModelParams {
            max_radius: Some(h.max_radius),
            num_neighbours: Some(h.num_neighbours),
            radial_basis: Some(h.radial_basis),
            hidden_layers: Some(h.hidden_layers),
            mid_multiplicity: Some(h.mid_multiplicity),
            seed: Some(h.seed),
        }
    }
}

impl ModelParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.max_radius.is_none() {
            self.max_radius = defaults.max_radius;
        }
        if self.num_neighbours.is_none() {
            self.num_neighbours = defaults.num_neighbours;
        }
        if self.radial_basis.is_none() {
            self.radial_basis = defaults.radial_basis;
        }
        if self.hidden_layers.is_none() {
            self.hidden_layers = defaults.hidden_layers;
        }
        if self.mid_multiplicity.is_none() {
            self.mid_multiplicity = defaults.mid_multiplicity;
        }
        if self.seed.is_none() {
            self.seed = defaults.seed;
        }
        self
    }

    pub fn hyperparameters(&self) -> Hyperparameters {
        let d = Hyperparameters::default();
        Hyperparameters {
            max_radius: self.max_radius.unwrap_or(d.max_radius),
            num_neighbours: self.num_neighbours.unwrap_or(d.num_neighbours),
            radial_basis: self.radial_basis.unwrap_or(d.radial_basis),
            hidden_layers: self.hidden_layers.clone().unwrap_or(d.hidden_layers),
            mid_multiplicity: self.mid_multiplicity.unwrap_or(d.mid_multiplicity),
            seed: self.seed.unwrap_or(d.seed),
        }
    }
}

/// Training loop parameters
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TrainingParams {
    pub epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub learning_rate: Option<f64>,
    pub test_ratio: Option<f64>,
    pub batch_loss_average: Option<usize>,
    pub optimizer: Option<String>, // "adam" or "sd"
}

impl Default for TrainingParams {
    fn default() -> Self {
        TrainingParams {
            epochs: Some(300),
            batch_size: Some(4),
            learning_rate: Some(1e-3),
            test_ratio: Some(0.2),
            batch_loss_average: Some(10),
            optimizer: Some("adam".to_string()),
        }
    }
}

impl TrainingParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.epochs.is_none() {
            self.epochs = defaults.epochs;
        }
        if self.batch_size.is_none() {
            self.batch_size = defaults.batch_size;
        }
        if self.learning_rate.is_none() {
            self.learning_rate = defaults.learning_rate;
        }
        if self.test_ratio.is_none() {
            self.test_ratio = defaults.test_ratio;
        }
        if self.batch_loss_average.is_none() {
            self.batch_loss_average = defaults.batch_loss_average;
        }
        if self.optimizer.is_none() {
            self.optimizer = defaults.optimizer;
        }
        self
    }

    pub fn settings(&self) -> TrainingSettings {
        let d = TrainingSettings::default();
        TrainingSettings {
            epochs: self.epochs.unwrap_or(d.epochs),
            batch_size: self.batch_size.unwrap_or(d.batch_size),
            batch_loss_average: self.batch_loss_average.unwrap_or(d.batch_loss_average),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OutputParams {
    pub model_dir: Option<PathBuf>,
    pub write_history: Option<bool>,
}

impl Default for OutputParams {
    fn default() -> Self {
        OutputParams {
            model_dir: Some(PathBuf::from(".")),
            write_history: Some(true),
        }
    }
}

impl OutputParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.model_dir.is_none() {
            self.model_dir = defaults.model_dir;
        }
        if self.write_history.is_none() {
            self.write_history = defaults.write_history;
        }
        self
    }
}

impl Config {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config =
            serde_yml::from_str(content).map_err(|e| PaoError::Config(format!("invalid YAML: {e}")))?;
        Ok(config.with_defaults())
    }

    /// Apply default values to every section
    pub fn with_defaults(mut self) -> Self {
        self.data = self.data.with_defaults();
        self.model = self.model.with_defaults();
        self.training = self.training.with_defaults();
        self.output = self.output.with_defaults();
        self
    }

    pub fn hyperparameters(&self) -> Hyperparameters {
        self.model.hyperparameters()
    }

    pub fn validate(&self) -> Result<()> {
        if self.kinds.is_empty() {
            return Err(PaoError::Config("no kinds configured".into()));
        }
        self.hyperparameters().validate()?;
        let t = &self.training;
        if t.batch_size == Some(0) {
            return Err(PaoError::Config("batch_size must be positive".into()));
        }
        if t.batch_loss_average == Some(0) {
            return Err(PaoError::Config("batch_loss_average must be positive".into()));
        }
        if let Some(ratio) = t.test_ratio {
            if !(ratio > 0.0 && ratio < 1.0) {
                return Err(PaoError::Config(format!("test_ratio {ratio} outside (0, 1)")));
            }
        }
        if let Some(lr) = t.learning_rate {
            if !(lr > 0.0 && lr.is_finite()) {
                return Err(PaoError::Config(format!("learning_rate {lr} must be positive")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
kinds:
  O:
    prim_basis: "2x0e + 2x1o + 1x2e"
  H:
    prim_basis: "2x0e + 1x1o"
model:
  max_radius: 3.5
  hidden_layers: [16, 16]
training:
  epochs: 20
"#;

    #[test]
    fn missing_values_take_defaults() {
        let config = Config::from_yaml(CONFIG).unwrap();
        assert_eq!(config.kinds.len(), 2);
        assert_eq!(config.kinds["H"].prim_basis, "2x0e + 1x1o");
        let hyper = config.hyperparameters();
        assert_eq!(hyper.max_radius, 3.5);
        assert_eq!(hyper.hidden_layers, vec![16, 16]);
        assert_eq!(hyper.radial_basis, 10);
        assert_eq!(config.training.epochs, Some(20));
        assert_eq!(config.training.batch_size, Some(4));
        assert_eq!(config.data.suffix.as_deref(), Some("-1_0.pao"));
        assert_eq!(config.output.write_history, Some(true));
        config.validate().unwrap();
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = Config::from_yaml(CONFIG).unwrap();
        config.training.test_ratio = Some(1.0);
        assert!(config.validate().is_err());

        let mut config = Config::from_yaml(CONFIG).unwrap();
        config.model.max_radius = Some(-1.0);
        assert!(config.validate().is_err());

        assert!(Config::from_yaml("kinds: [").is_err());
    }
}
