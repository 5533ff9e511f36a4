//! Training entry point. Everything here is delegation: the external trainer
//! owns checkpointing, plotting, and early stopping; this module only
//! assembles the fixed run configuration and blocks on the child process.

use std::process::Command;

use tracing::info;

use crate::error::{Error, Result};

/// Name of the external trainer executable, resolved through `PATH`.
const TRAINER: &str = "yolo";

/// Fixed configuration of the training run. The defaults are the values the
/// shipped label weights were produced with.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Dataset configuration yaml.
    pub data: String,
    /// Base checkpoint to fine-tune from.
    pub weights: String,
    /// Device passed through to the trainer.
    pub device: String,
    pub epochs: u32,
    pub image_size: u32,
    pub batch: u32,
    /// Checkpoint every N epochs.
    pub save_period: u32,
    /// Early-stop patience in epochs.
    pub patience: u32,
    pub workers: u32,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data: "data.yaml".into(),
            weights: "yolov8s.pt".into(),
            device: "0".into(),
            epochs: 25,
            image_size: 800,
            batch: 16,
            save_period: 5,
            patience: 10,
            workers: 8,
        }
    }
}

/// Single blocking trainer invocation, stdio inherited. A nonzero exit status
/// surfaces as an error; there are no retries.
pub fn run(config: &TrainConfig) -> Result<()> {
    let mut command = Command::new(TRAINER);
    command
        .arg("detect")
        .arg("train")
        .arg(format!("data={}", config.data))
        .arg(format!("model={}", config.weights))
        .arg(format!("device={}", config.device))
        .arg(format!("epochs={}", config.epochs))
        .arg(format!("imgsz={}", config.image_size))
        .arg(format!("batch={}", config.batch))
        .arg(format!("save_period={}", config.save_period))
        .arg(format!("patience={}", config.patience))
        .arg(format!("workers={}", config.workers))
        .arg("save=True")
        .arg("plots=True");

    info!("launching trainer: {command:?}");
    let status = command.status().map_err(|source| Error::TrainerSpawn {
        command: TRAINER.to_string(),
        source,
    })?;

    if status.success() {
        info!("training finished");
        Ok(())
    } else {
        Err(Error::Trainer { status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_shipped_run() {
        let config = TrainConfig::default();
        assert_eq!(config.epochs, 25);
        assert_eq!(config.image_size, 800);
        assert_eq!(config.batch, 16);
        assert_eq!(config.save_period, 5);
        assert_eq!(config.patience, 10);
    }
}
