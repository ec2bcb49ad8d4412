use pao::config::Config;
use pao::train::TrainingHistory;
use std::collections::BTreeMap;
use tracing::info;

pub fn report_configuration(config: &Config) {
    let hyper = config.hyperparameters();
    info!("\nModel parameters:");
    info!("  Cutoff radius: {:.3}", hyper.max_radius);
    info!("  Neighbour normalisation: {}", hyper.num_neighbours);
    info!("  Radial basis functions: {}", hyper.radial_basis);
    info!("  Hidden layers: {:?}", hyper.hidden_layers);
    info!("  Middle multiplicity: {}", hyper.mid_multiplicity);
    for (name, kind) in &config.kinds {
        info!("  Kind {}: {}", name, kind.prim_basis);
    }
}

pub fn report_training_summary(kind: &str, history: &TrainingHistory) {
    let (Some(train), Some(validation)) = (history.train_loss.last(), history.validation_loss.last()) else {
        return;
    };
    let best = history
        .validation_loss
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1));
    info!("\nKind {} finished after {} epochs", kind, history.train_loss.len());
    info!("  Final training loss:   {:.8e}", train);
    info!("  Final validation loss: {:.8e}", validation);
    if let Some((epoch, loss)) = best {
        info!("  Best validation loss:  {:.8e} (epoch {})", loss, epoch);
    }
}

pub fn report_prediction_losses(losses: &BTreeMap<String, f64>) {
    info!("\nProjector loss against the reference blocks:");
    for (kind, loss) in losses {
        info!("  {}: {:.8e}", kind, loss);
    }
}
