//! Training loop: shuffled mini-batches, one optimiser step per batch,
//! validation after every epoch.

use crate::dataset::{batches, PaoSample};
use crate::error::{PaoError, Result};
use crate::model::PaoModel;
use crate::optim_impl::ParameterOptimizer;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingHistory {
    pub train_loss: Vec<f64>,
    pub validation_loss: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSettings {
    pub epochs: usize,
    pub batch_size: usize,
    /// Number of batches in one reported running average.
    pub batch_loss_average: usize,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        TrainingSettings {
            epochs: 300,
            batch_size: 4,
            batch_loss_average: 10,
        }
    }
}

/// One pass over `samples`. Returns the mean loss of the last complete window
/// of `batch_loss_average` batches, or of all batches when no window completed.
pub fn train_model_epoch<R: Rng>(
    model: &mut PaoModel,
    optimizer: &mut dyn ParameterOptimizer,
    samples: &[PaoSample],
    settings: &TrainingSettings,
    rng: &mut R,
) -> Result<f64> {
    if samples.is_empty() {
        return Err(PaoError::Config(format!(
            "no training samples for kind {}",
            model.kind().name
        )));
    }
    let window = settings.batch_loss_average.max(1);
    let mut running = 0.0;
    let mut in_window = 0;
    let mut last = None;

    for (i, batch) in batches(samples, settings.batch_size, Some(rng)).iter().enumerate() {
        let step = model.loss_gradient(batch)?;
        if step.failed > 0 {
            debug!("batch {}: {} of {} samples skipped", i, step.failed, batch.len());
        }
        optimizer.step(model.params_mut(), &step.gradient);
        running += step.loss;
        in_window += 1;
        if in_window == window {
            last = Some(running / window as f64);
            running = 0.0;
            in_window = 0;
        }
    }
    Ok(last.unwrap_or(running / in_window.max(1) as f64))
}

/// Mean over batches of the batch loss.
pub fn validate_model(model: &PaoModel, samples: &[PaoSample], batch_size: usize) -> Result<f64> {
    if samples.is_empty() {
        return Err(PaoError::Config(format!(
            "no validation samples for kind {}",
            model.kind().name
        )));
    }
    let batches = batches::<_, rand::rngs::StdRng>(samples, batch_size, None);
    let mut total = 0.0;
    for batch in &batches {
        total += model.loss(batch)?;
    }
    Ok(total / batches.len() as f64)
}

pub fn train_model<R: Rng>(
    model: &mut PaoModel,
    optimizer: &mut dyn ParameterOptimizer,
    train: &[PaoSample],
    validation: &[PaoSample],
    settings: &TrainingSettings,
    rng: &mut R,
) -> Result<TrainingHistory> {
    info!(
        "Training kind {} on {} samples, validating on {} ({} epochs, {} optimizer, learning rate {:e})",
        model.kind().name,
        train.len(),
        validation.len(),
        settings.epochs,
        optimizer.name(),
        optimizer.learning_rate()
    );
    let mut history = TrainingHistory::default();
    for epoch in 0..settings.epochs {
        let loss = train_model_epoch(model, optimizer, train, settings, rng)?;
        let validation_loss = validate_model(model, validation, settings.batch_size)?;
        info!(
            "training epoch {:3} | loss {:.8e} | validation loss {:.8e}",
            epoch, loss, validation_loss
        );
        history.train_loss.push(loss);
        history.validation_loss.push(validation_loss);
    }
    Ok(history)
}
