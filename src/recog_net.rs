use std::path::PathBuf;

use float_ord::FloatOrd;
use image::{imageops::FilterType, DynamicImage};
use ndarray::{ArrayView2, Axis};
use ort::{inputs, Session};
use tracing::instrument;

use crate::error::{Error, Result};
use crate::session::{build_session, ShapeProfile};
use crate::util::normalized_chw;
use crate::{ExecutionProvider, TextLine};

const MEAN_VALUES: [f32; 3] = [0.5, 0.5, 0.5];
const NORM_VALUES: [f32; 3] = [2.0, 2.0, 2.0];

/// Input height the recognition model expects; width scales with the crop.
const DEST_HEIGHT: u32 = 48;

/// Text recognizer: CRNN-style decoding of cropped regions against a keys
/// dictionary.
pub struct RecogNet {
    session: Session,
    keys: Vec<String>,
}

impl RecogNet {
    #[instrument(level = "debug")]
    pub fn init(
        model_path: PathBuf,
        keys_path: PathBuf,
        num_threads: usize,
        execution_providers: &[ExecutionProvider],
        cache_path: Option<PathBuf>,
    ) -> Result<Self> {
        let profile = ShapeProfile {
            min: format!("x:1x3x{DEST_HEIGHT}x1"),
            opt: format!("x:1x3x{DEST_HEIGHT}x256"),
            max: format!("x:1x3x{DEST_HEIGHT}x{}", u16::MAX),
        };
        let session = build_session(
            model_path,
            num_threads,
            execution_providers,
            cache_path,
            &profile,
        )?;

        let keys = std::fs::read_to_string(&keys_path).map_err(|source| Error::Keys {
            path: keys_path,
            source,
        })?;
        let keys = keys.lines().map(|line| line.to_string());
        // index 0 is the CTC blank, the trailing entry is the space character
        let keys = ["#".to_string()]
            .into_iter()
            .chain(keys)
            .chain([" ".to_string()])
            .collect::<Vec<_>>();

        log::debug!("recognition session inputs: {:?}", session.inputs);
        log::debug!("recognition session outputs: {:?}", session.outputs);
        log::debug!("{} recognition keys", keys.len());

        Ok(Self { session, keys })
    }

    /// One line per crop, in order. A crop whose inference fails decodes to an
    /// empty line instead of aborting the batch; the failure is logged and the
    /// span simply reads as "no text".
    #[instrument(level = "debug", skip(self, crops))]
    pub fn read_lines(&self, crops: &[DynamicImage]) -> Vec<TextLine> {
        crops
            .iter()
            .map(|crop| match self.read_line(crop) {
                Ok(line) => line,
                Err(err) => {
                    log::warn!("recognition failed for one span: {err}");
                    TextLine::default()
                }
            })
            .collect()
    }

    #[instrument(level = "trace", skip(self, image))]
    fn read_line(&self, image: &DynamicImage) -> Result<TextLine> {
        let scale = DEST_HEIGHT as f32 / image.height() as f32;
        let dest_width = (image.width() as f32 * scale) as u32;
        let dest_width = dest_width.clamp(1, u16::MAX as u32);
        let image = image.resize_exact(dest_width, DEST_HEIGHT, FilterType::Nearest);

        let tensor_values =
            normalized_chw(&image, &MEAN_VALUES, &NORM_VALUES).insert_axis(Axis(0));
        let outputs = self.session.run(inputs!["x" => tensor_values]?)?;
        let output_tensor = outputs
            .first_key_value()
            .unwrap()
            .1
            .try_extract_tensor::<f32>()?;

        log::trace!("recognition output size: {:?}", output_tensor.dim());
        let steps = output_tensor.len_of(Axis(1));
        let classes = output_tensor.len_of(Axis(2));

        let output_tensor = output_tensor.to_owned().remove_axis(Axis(0));
        let output = output_tensor.to_shape((steps, classes)).unwrap();

        Ok(self.decode_scores(output.view()))
    }

    /// Argmax per timestep, blanks and out-of-dictionary indices dropped.
    fn decode_scores(&self, data: ArrayView2<f32>) -> TextLine {
        let keys_size = self.keys.len();

        let max_scores = data
            .outer_iter()
            .map(|step| {
                let (index, value) = step
                    .indexed_iter()
                    .max_by_key(|(_, value)| FloatOrd(**value))
                    .unwrap();
                (index, *value)
            })
            .filter(|(index, _)| *index > 0 && *index < keys_size)
            .map(|(index, score)| (self.keys[index].as_str(), score))
            .collect::<Vec<_>>();

        let text = max_scores.iter().map(|(text, _)| *text).collect::<String>();
        let character_scores = max_scores.iter().map(|(_, score)| *score).collect();

        TextLine {
            text,
            character_scores,
        }
    }
}
