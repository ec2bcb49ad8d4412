use super::report::{report_prediction_losses, report_training_summary};
use super::workspace::{model_path, TrainingWorkspace};
use color_eyre::eyre::{eyre, Result, WrapErr};
use pao::config::{Args, Config};
use pao::dataset::train_test_split;
use pao::io::{parse_pao_file, write_loss_history, write_pao_file};
use pao::optim_impl::create_optimizer;
use pao::predict::{predict_pao_file, prediction_losses};
use pao::train::{train_model, TrainingHistory};
use pao::PaoModel;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Train one model per kind, in sorted kind order.
pub fn run_training(
    workspace: &TrainingWorkspace,
    args: &Args,
    config: &Config,
) -> Result<BTreeMap<String, TrainingHistory>> {
    let hyper = config.hyperparameters();
    let settings = config.training.settings();
    let learning_rate = config.training.learning_rate.unwrap_or(1e-3);
    let algorithm = config.training.optimizer.clone().unwrap_or_else(|| "adam".to_string());
    let test_ratio = config.training.test_ratio.unwrap_or(0.2);
    let model_dir = resolve_model_dir(config)?;

    let mut histories = BTreeMap::new();
    for (name, kind) in &workspace.kinds {
        if !args.kinds.is_empty() && !args.kinds.contains(name) {
            info!("Skipping kind {}", name);
            continue;
        }
        let samples = workspace
            .dataset
            .samples
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if samples.len() < 2 {
            return Err(eyre!(
                "kind {} has {} samples, at least two are needed for a train/validation split",
                name,
                samples.len()
            ));
        }

        let mut rng = StdRng::seed_from_u64(hyper.seed);
        let (train, validation) = train_test_split(samples, test_ratio, &mut rng);
        let mut model = PaoModel::new(kind.clone(), workspace.species.clone(), hyper.clone())
            .wrap_err_with(|| format!("Unable to build the model for kind {}", name))?;
        let mut optimizer = create_optimizer(&algorithm, learning_rate, model.num_params())?;

        let history = train_model(
            &mut model,
            optimizer.as_mut(),
            &train,
            &validation,
            &settings,
            &mut rng,
        )
        .wrap_err_with(|| format!("Training failed for kind {}", name))?;
        report_training_summary(name, &history);

        model.save(&model_path(&model_dir, name))?;
        if config.output.write_history.unwrap_or(true) {
            write_loss_history(&model_dir.join(format!("loss_history_{}.dat", name)), &history)?;
        }
        histories.insert(name.clone(), history);
    }
    Ok(histories)
}

/// Predict every Xblock of `input` and write the result to `output`.
pub fn run_prediction(input: &Path, output: &Path, config: &Config) -> Result<()> {
    let model_dir = resolve_model_dir(config)?;
    let file = parse_pao_file(input).wrap_err_with(|| format!("Unable to read {}", input.display()))?;

    let mut models = BTreeMap::new();
    for record in &file.kinds {
        let path = model_path(&model_dir, &record.name);
        let model = PaoModel::load(&path)
            .wrap_err_with(|| format!("Unable to load the model for kind {} from {}", record.name, path.display()))?;
        models.insert(record.name.clone(), model);
    }

    info!("Predicting {} atoms of {}", file.atoms.len(), input.display());
    let predicted = predict_pao_file(&file, &models)?;
    if !file.xblocks.is_empty() {
        report_prediction_losses(&prediction_losses(&predicted, &file)?);
    }
    write_pao_file(output, &predicted)?;
    info!("Predicted basis written to {}", output.display());
    Ok(())
}

fn resolve_model_dir(config: &Config) -> Result<PathBuf> {
    let dir = config.output.model_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&dir).wrap_err_with(|| format!("Unable to create {}", dir.display()))?;
    Ok(dir)
}
