use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure classes of the pipeline. Everything here is fatal for the current
/// invocation; per-span recognition failures never reach this type and degrade
/// to an empty text line inside the recognition loop instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read image from {path}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to load model from {path}")]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: ort::Error,
    },
    #[error("failed to read recognition keys from {path}")]
    Keys {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("inference failed")]
    Inference(#[from] ort::Error),
    #[error("failed to write annotated output")]
    Annotate(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to launch trainer `{command}`")]
    TrainerSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("trainer exited with {status}")]
    Trainer { status: ExitStatus },
}
