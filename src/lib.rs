use std::path::PathBuf;

use image::DynamicImage;
use label_net::LabelNet;
use recog_net::RecogNet;
use text_net::TextNet;

mod error;
pub mod label_net;
pub mod matching;
mod recog_net;
pub mod report;
mod result;
mod session;
mod text_net;
pub mod train;
pub mod util;

pub use error::{Error, Result};
pub use result::*;
use tracing::instrument;
use util::{crop_region, scale_normalized};

pub use ort as runtime;

pub struct WeightReaderBuilder {
    threads: usize,
    label_path: Option<PathBuf>,
    label_input_size: u32,
    text_det_path: Option<PathBuf>,
    rec_paths: Option<(PathBuf, PathBuf)>,
    max_side_len: u32,
    cache_path: Option<PathBuf>,
    execution_providers: Vec<ExecutionProvider>,
}

impl WeightReaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Weights of the label detector.
    pub fn label_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.label_path = Some(path.into());
        self
    }

    /// Square input size of the label detector.
    pub fn label_input_size(mut self, size: u32) -> Self {
        self.label_input_size = size;
        self
    }

    pub fn text_det_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.text_det_path = Some(path.into());
        self
    }

    pub fn rec_model(
        mut self,
        model_path: impl Into<PathBuf>,
        keys_path: impl Into<PathBuf>,
    ) -> Self {
        self.rec_paths = Some((model_path.into(), keys_path.into()));
        self
    }

    pub fn max_side_len(mut self, max_side_len: u32) -> Self {
        self.max_side_len = max_side_len;
        self
    }

    pub fn with_engine_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn with_execution_providers(
        mut self,
        providers: impl IntoIterator<Item = ExecutionProvider>,
    ) -> Self {
        self.execution_providers = providers.into_iter().collect();
        self
    }

    #[instrument(skip(self), level = "debug")]
    fn init_models(&mut self) -> Result<(LabelNet, TextNet, RecogNet)> {
        let label_path = self
            .label_path
            .take()
            .unwrap_or_else(|| "models/label_det.onnx".into());
        let text_det_path = self
            .text_det_path
            .take()
            .unwrap_or_else(|| "models/PP-OCRv4_det_infer.onnx".into());
        let (rec_path, keys_path) = self.rec_paths.take().unwrap_or_else(|| {
            (
                "models/latin_PP-OCRv3_rec_infer.onnx".into(),
                "models/latin_dict.txt".into(),
            )
        });
        Ok((
            LabelNet::init(
                label_path,
                self.label_input_size,
                self.threads,
                &self.execution_providers,
                self.cache_path.clone(),
            )?,
            TextNet::init(
                text_det_path,
                self.threads,
                self.max_side_len,
                &self.execution_providers,
                self.cache_path.clone(),
            )?,
            RecogNet::init(
                rec_path,
                keys_path,
                self.threads,
                &self.execution_providers,
                self.cache_path.clone(),
            )?,
        ))
    }

    #[instrument(skip(self))]
    pub fn build(mut self) -> Result<WeightReader> {
        let (label_net, text_net, recog_net) = self.init_models()?;
        Ok(WeightReader {
            label_net,
            text_net,
            recog_net,
            max_side_len: self.max_side_len,
        })
    }
}

impl Default for WeightReaderBuilder {
    fn default() -> Self {
        Self {
            threads: 4,
            label_path: None,
            label_input_size: 640,
            text_det_path: None,
            rec_paths: None,
            max_side_len: 1024,
            cache_path: None,
            execution_providers: DEFAULT_PROVIDERS.to_vec(),
        }
    }
}

/// The whole pipeline: label detector plus the two-stage text recognizer.
/// Built once, owned by the caller, reused across invocations.
pub struct WeightReader {
    label_net: LabelNet,
    text_net: TextNet,
    recog_net: RecogNet,
    max_side_len: u32,
}

impl WeightReader {
    /// Full pass over one image: detect label boxes, recognize text once for
    /// the whole image, then pick the best validated reading per box.
    #[instrument(skip(self, image))]
    pub fn read(&self, image: &DynamicImage, options: ScanOptions) -> Result<Vec<LabelReading>> {
        let detections = self.label_net.detect_labels(
            image,
            options.confidence_threshold,
            options.iou_threshold,
            options.max_detections,
        )?;
        if detections.is_empty() {
            log::debug!("no labels detected");
            return Ok(Vec::new());
        }
        log::debug!("{} labels detected", detections.len());

        let spans = self.recognize_spans(image, &options)?;

        Ok(detections
            .into_iter()
            .map(|detection| {
                let digits = matching::best_reading(&detection.rect, &spans);
                LabelReading { detection, digits }
            })
            .collect())
    }

    /// One OCR pass over the full image. Spans are shared by every detection
    /// during association.
    #[instrument(skip(self, image))]
    pub fn recognize_spans(
        &self,
        image: &DynamicImage,
        options: &ScanOptions,
    ) -> Result<Vec<TextSpan>> {
        let max_side_len = if options.max_side_len != 0 {
            options.max_side_len
        } else {
            self.max_side_len
        };
        let scale = scale_normalized(image, max_side_len);
        let boxes = self.text_net.find_spans(
            image,
            scale,
            options.box_threshold,
            options.box_score_threshold,
            options.unclip_ratio,
        )?;

        let mut kept = Vec::with_capacity(boxes.len());
        let mut crops = Vec::with_capacity(boxes.len());
        for text_box in boxes {
            match crop_region(image, &text_box.quad) {
                Some(crop) => {
                    kept.push(text_box);
                    crops.push(crop);
                }
                None => log::warn!("skipping text region with degenerate bounds"),
            }
        }

        let lines = self.recog_net.read_lines(&crops);

        Ok(kept
            .into_iter()
            .zip(lines)
            .map(|(text_box, line)| {
                let confidence = line.mean_score();
                TextSpan {
                    quad: text_box.quad,
                    text: line.text,
                    confidence,
                }
            })
            .collect())
    }
}

/// Reads the input photograph; failures here are fatal for the invocation.
pub fn open_image(path: impl Into<PathBuf>) -> Result<DynamicImage> {
    let path = path.into();
    image::open(&path).map_err(|source| Error::Image { path, source })
}

#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// Minimum label-detection confidence.
    pub confidence_threshold: f32,
    /// IoU above which overlapping label boxes are merged away.
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Long-side cap for the text detector input; 0 uses the engine default.
    pub max_side_len: u32,
    pub box_threshold: f32,
    pub box_score_threshold: f32,
    pub unclip_ratio: f32,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            iou_threshold: 0.3,
            max_detections: 50,
            max_side_len: 0,
            box_threshold: 0.3,
            box_score_threshold: 0.5,
            unclip_ratio: 1.6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    Default,
    #[cfg(feature = "tensorrt")]
    TensorRT,
    #[cfg(feature = "coreml")]
    CoreML,
    #[cfg(feature = "cuda")]
    Cuda,
    #[cfg(feature = "directml")]
    DirectML,
}

const DEFAULT_PROVIDERS: &[ExecutionProvider] = &[
    #[cfg(feature = "tensorrt")]
    ExecutionProvider::TensorRT,
    #[cfg(feature = "coreml")]
    ExecutionProvider::CoreML,
    #[cfg(feature = "directml")]
    ExecutionProvider::DirectML,
    #[cfg(feature = "cuda")]
    ExecutionProvider::Cuda,
    ExecutionProvider::Default,
];
