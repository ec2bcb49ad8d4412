//! Logging setup and training reports.

use crate::error::{PaoError, Result};
use crate::train::TrainingHistory;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;
use tracing::info;
use tracing_subscriber::{
    fmt::format::Writer, fmt::layer, fmt::time::FormatTime, layer::SubscriberExt,
    util::SubscriberInitExt, Registry,
};

/// Wall-clock time of day, whole seconds.
struct SecondPrecisionTimer;

impl FormatTime for SecondPrecisionTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let total_seconds = SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let hours = (total_seconds / 3600) % 24;
        let minutes = (total_seconds / 60) % 60;
        let seconds = total_seconds % 60;
        write!(w, "{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Route log output to `output_path`, or to stdout when none is given.
pub fn setup_output(output_path: Option<&String>) -> Result<()> {
    let installed = match output_path {
        Some(path) => {
            let log = File::create(path)?;
            let file_layer = layer()
                .with_writer(log)
                .with_timer(SecondPrecisionTimer)
                .with_ansi(false);
            Registry::default().with(file_layer).try_init()
        }
        None => {
            let stdout_layer = layer()
                .with_writer(std::io::stdout)
                .with_timer(SecondPrecisionTimer)
                .with_ansi(true);
            Registry::default().with(stdout_layer).try_init()
        }
    };
    installed.map_err(|e| PaoError::Config(format!("cannot install logger: {e}")))?;
    match output_path {
        Some(path) => info!("Output will be written to: {}", path),
        None => info!("Output will be printed to stdout"),
    }
    Ok(())
}

/// Two-column table of per-epoch losses.
pub fn format_loss_history<W: Write>(writer: &mut W, history: &TrainingHistory) -> std::io::Result<()> {
    writeln!(writer, "# epoch  training_loss  validation_loss")?;
    for (epoch, (train, validation)) in history
        .train_loss
        .iter()
        .zip(&history.validation_loss)
        .enumerate()
    {
        writeln!(writer, "{:6}  {:.10e}  {:.10e}", epoch + 1, train, validation)?;
    }
    Ok(())
}

pub fn write_loss_history(path: &Path, history: &TrainingHistory) -> Result<()> {
    let mut file = File::create(path)?;
    format_loss_history(&mut file, history)?;
    info!("Loss history written to {}", path.display());
    Ok(())
}
