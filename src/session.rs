use std::path::PathBuf;

use ort::{ExecutionProviderDispatch, GraphOptimizationLevel, Session};
use tracing::instrument;

use crate::error::{Error, Result};
use crate::ExecutionProvider;

/// TensorRT builds an engine per input-shape profile, so every net hands in
/// the shape range its inputs can take.
#[derive(Debug, Clone)]
pub(crate) struct ShapeProfile {
    pub min: String,
    pub opt: String,
    pub max: String,
}

#[cfg(feature = "tensorrt")]
fn setup_tensorrt(cache_path: PathBuf, profile: &ShapeProfile) -> ort::ExecutionProviderDispatch {
    use ort::TensorRTExecutionProvider;

    TensorRTExecutionProvider::default()
        .with_profile_min_shapes(&profile.min)
        .with_profile_max_shapes(&profile.max)
        .with_profile_opt_shapes(&profile.opt)
        .with_engine_cache(true)
        .with_engine_cache_path(cache_path.to_string_lossy())
        .with_timing_cache(true)
        .with_builder_optimization_level(5)
        .with_detailed_build_log(true)
        .build()
}

#[cfg(feature = "cuda")]
fn setup_cuda() -> ort::ExecutionProviderDispatch {
    use ort::CUDAExecutionProvider;

    CUDAExecutionProvider::default().build()
}

#[cfg(feature = "directml")]
fn setup_directml() -> ort::ExecutionProviderDispatch {
    use ort::DirectMLExecutionProvider;

    DirectMLExecutionProvider::default().build()
}

#[cfg(feature = "coreml")]
fn setup_coreml() -> ort::ExecutionProviderDispatch {
    use ort::CoreMLExecutionProvider;

    CoreMLExecutionProvider::default().build()
}

/// One session-construction path for every net in the pipeline.
#[cfg_attr(not(feature = "tensorrt"), allow(unused_variables))]
#[instrument(level = "debug", skip(execution_providers, profile))]
pub(crate) fn build_session(
    model_path: PathBuf,
    num_threads: usize,
    execution_providers: &[ExecutionProvider],
    cache_path: Option<PathBuf>,
    profile: &ShapeProfile,
) -> Result<Session> {
    // DirectML cannot run with parallel execution or memory patterns enabled.
    #[cfg(feature = "directml")]
    let parallel = !execution_providers.contains(&ExecutionProvider::DirectML);
    #[cfg(not(feature = "directml"))]
    let parallel = true;

    let dispatches = execution_providers
        .iter()
        .filter_map(|provider| -> Option<ExecutionProviderDispatch> {
            match provider {
                ExecutionProvider::Default => None,
                #[cfg(feature = "tensorrt")]
                ExecutionProvider::TensorRT => Some(setup_tensorrt(
                    cache_path.clone().unwrap_or_else(|| {
                        model_path
                            .parent()
                            .map(PathBuf::from)
                            .unwrap_or_default()
                            .join(".cache")
                    }),
                    profile,
                )),
                #[cfg(feature = "cuda")]
                ExecutionProvider::Cuda => Some(setup_cuda()),
                #[cfg(feature = "directml")]
                ExecutionProvider::DirectML => Some(setup_directml()),
                #[cfg(feature = "coreml")]
                ExecutionProvider::CoreML => Some(setup_coreml()),
            }
        })
        .collect::<Vec<_>>();

    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_memory_pattern(parallel)?
        .with_parallel_execution(parallel)?
        .with_inter_threads(num_threads)?
        .with_intra_threads(num_threads)?
        .with_execution_providers(dispatches)?
        .commit_from_file(&model_path)
        .map_err(|source| Error::ModelLoad {
            path: model_path,
            source,
        })?;

    Ok(session)
}
